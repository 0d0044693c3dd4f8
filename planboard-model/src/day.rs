//! Calendar day keys (`YYYY-MM-DD`).

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Days, NaiveDate, TimeZone};
use serde::{Deserialize, Serialize};

/// Error returned when a string is not a valid `YYYY-MM-DD` day key.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid day key: {0:?} (expected YYYY-MM-DD)")]
pub struct ParseDayKeyError(String);

/// Earliest year a day key can hold.
pub const MIN_YEAR: i32 = 0;

/// Latest year a day key can hold; the string form has four year digits.
pub const MAX_YEAR: i32 = 9999;

/// A calendar date used as a grouping key.
///
/// Ordering is chronological, so a `BTreeMap<DayKey, _>` iterates days in
/// order. The string form is always zero-padded `YYYY-MM-DD`, so years are
/// limited to [`MIN_YEAR`]..=[`MAX_YEAR`] and every key parses back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DayKey(NaiveDate);

impl Default for DayKey {
    /// 1970-01-01.
    fn default() -> Self {
        Self(NaiveDate::default())
    }
}

impl DayKey {
    /// Wrap a calendar date. Returns `None` outside the four-digit years.
    #[must_use]
    pub fn from_date(date: NaiveDate) -> Option<Self> {
        (MIN_YEAR..=MAX_YEAR).contains(&date.year()).then_some(Self(date))
    }

    /// Build a key from year, month (1-12) and day (1-31).
    #[must_use]
    pub fn from_ymd(year: i32, month: u32, day: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, day).and_then(Self::from_date)
    }

    /// The calendar day that `millis` falls on in time zone `tz`.
    ///
    /// Returns `None` if `millis` is outside the representable range or
    /// lands outside the four-digit years.
    #[must_use]
    pub fn from_epoch_millis<Tz: TimeZone>(millis: i64, tz: &Tz) -> Option<Self> {
        tz.timestamp_millis_opt(millis)
            .earliest()
            .and_then(|dt| Self::from_date(dt.date_naive()))
    }

    /// The underlying date.
    #[must_use]
    pub const fn date(&self) -> NaiveDate {
        self.0
    }

    /// Shift by a whole number of days, rolling over months and years.
    #[must_use]
    pub fn offset_days(self, days: i64) -> Option<Self> {
        let magnitude = Days::new(days.unsigned_abs());
        let shifted = if days >= 0 {
            self.0.checked_add_days(magnitude)
        } else {
            self.0.checked_sub_days(magnitude)
        };
        shifted.and_then(Self::from_date)
    }
}

impl fmt::Display for DayKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02}",
            self.0.year(),
            self.0.month(),
            self.0.day()
        )
    }
}

impl FromStr for DayKey {
    type Err = ParseDayKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = s.as_bytes();
        let shaped = bytes.len() == 10
            && bytes[4] == b'-'
            && bytes[7] == b'-'
            && bytes
                .iter()
                .enumerate()
                .all(|(i, b)| i == 4 || i == 7 || b.is_ascii_digit());
        if !shaped {
            return Err(ParseDayKeyError(s.to_string()));
        }
        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .ok()
            .and_then(Self::from_date)
            .ok_or_else(|| ParseDayKeyError(s.to_string()))
    }
}

impl TryFrom<String> for DayKey {
    type Error = ParseDayKeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DayKey> for String {
    fn from(value: DayKey) -> Self {
        value.to_string()
    }
}
