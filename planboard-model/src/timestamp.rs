//! Normalization of store timestamp values to epoch milliseconds.
//!
//! Documents written by different clients carry creation times in several
//! shapes: a store-native timestamp, a plain number of milliseconds, or a
//! date string. [`epoch_millis`] tries them in that order and returns `None`
//! when nothing usable is found; [`normalize_epoch_millis`] then substitutes
//! the supplied "now".

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};

use crate::document::FieldValue;

/// Largest magnitude a JavaScript `Date` accepts, in milliseconds.
const MAX_DATE_MILLIS: f64 = 8.64e15;

/// Store-native timestamp: seconds since epoch plus a nanosecond fraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StoreTimestamp {
    /// Whole seconds since the Unix epoch.
    pub seconds: i64,
    /// Nanoseconds within the second.
    pub nanos: u32,
}

impl StoreTimestamp {
    /// Create a timestamp from its parts.
    #[must_use]
    pub const fn new(seconds: i64, nanos: u32) -> Self {
        Self { seconds, nanos }
    }

    /// Create a timestamp from epoch milliseconds.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub const fn from_millis(millis: i64) -> Self {
        Self {
            seconds: millis.div_euclid(1000),
            // rem_euclid keeps this in 0..1000, so the cast is lossless.
            nanos: (millis.rem_euclid(1000) * 1_000_000) as u32,
        }
    }

    /// The store's "to date" conversion.
    ///
    /// Returns `None` when the parts are outside chrono's representable range.
    #[must_use]
    pub fn to_date(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.seconds, self.nanos)
    }
}

/// Current wall-clock time in epoch milliseconds.
#[must_use]
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Extract epoch milliseconds from a field value.
///
/// Order of attempts:
/// 1. [`FieldValue::Timestamp`] via [`StoreTimestamp::to_date`].
/// 2. Numbers are used directly (floats truncate toward zero).
/// 3. Strings are parsed as dates, see [`parse_date_string`].
///
/// Everything else, including out-of-range values, yields `None`.
#[must_use]
pub fn epoch_millis(value: &FieldValue) -> Option<i64> {
    match value {
        FieldValue::Timestamp(ts) => ts.to_date().map(|d| d.timestamp_millis()),
        FieldValue::Integer(n) => Some(*n),
        FieldValue::Float(f) => float_millis(*f),
        FieldValue::String(s) => parse_date_string(s),
        FieldValue::Null | FieldValue::Bool(_) | FieldValue::StringArray(_) => None,
    }
}

/// Like [`epoch_millis`], but falls back to `now_ms` for absent or
/// unusable values.
#[must_use]
pub fn normalize_epoch_millis(value: Option<&FieldValue>, now_ms: i64) -> i64 {
    value.and_then(epoch_millis).unwrap_or(now_ms)
}

#[allow(clippy::cast_possible_truncation)]
fn float_millis(f: f64) -> Option<i64> {
    if f.is_finite() && f.abs() <= MAX_DATE_MILLIS {
        Some(f.trunc() as i64)
    } else {
        None
    }
}

/// Parse a date string using the conventions of `Date.parse`.
///
/// Accepted forms: RFC 3339, RFC 2822, `YYYY-MM-DDTHH:MM[:SS[.fff]]` (and the
/// space-separated variant) in local time, and `YYYY-MM-DD` as UTC midnight.
#[must_use]
pub fn parse_date_string(input: &str) -> Option<i64> {
    let s = input.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.timestamp_millis());
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.timestamp_millis());
    }
    for format in [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
    ] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Local
                .from_local_datetime(&naive)
                .earliest()
                .map(|dt| dt.timestamp_millis());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc().timestamp_millis())
}
