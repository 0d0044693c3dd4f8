//! Calendar helpers: the week strip and the month picker grid.
//!
//! Pure date arithmetic over [`DayKey`]; nothing here looks at tasks.

use chrono::{Datelike, Days, NaiveDate, NaiveTime, TimeZone};
use serde::Serialize;

use planboard_model::day::DayKey;

/// Days shown on each side of the selected day in the week strip.
pub const WEEK_RADIUS: i64 = 3;

/// Number of cells in a month grid (six weeks).
pub const MONTH_GRID_CELLS: usize = 42;

/// The seven days centered on `center`, oldest first.
///
/// Days that would fall outside the representable calendar are omitted.
#[must_use]
pub fn week_window(center: DayKey) -> Vec<DayKey> {
    (-WEEK_RADIUS..=WEEK_RADIUS)
        .filter_map(|offset| center.offset_days(offset))
        .collect()
}

/// Epoch millis of the first instant of `day` in `tz`.
///
/// Returns `None` if midnight does not exist in `tz` on that day.
#[must_use]
pub fn start_of_day<Tz: TimeZone>(day: DayKey, tz: &Tz) -> Option<i64> {
    tz.from_local_datetime(&day.date().and_time(NaiveTime::MIN))
        .earliest()
        .map(|dt| dt.timestamp_millis())
}

/// One cell of a month grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GridDay {
    /// The day shown in the cell.
    pub day: DayKey,
    /// Whether the day belongs to the month the grid was built for.
    pub in_month: bool,
}

/// Six Sunday-first weeks covering `month` of `year`.
///
/// The grid starts on the Sunday on or before the 1st; cells before the 1st
/// and after the last day are flagged `in_month: false`. Returns `None` for
/// an invalid month or a month at the edge of the representable calendar.
#[must_use]
pub fn month_grid(year: i32, month: u32) -> Option<Vec<GridDay>> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let lead = u64::from(first.weekday().num_days_from_sunday());
    let start = first.checked_sub_days(Days::new(lead))?;

    let cells: Vec<GridDay> = start
        .iter_days()
        .take(MONTH_GRID_CELLS)
        .map_while(|date| {
            DayKey::from_date(date).map(|day| GridDay {
                day,
                in_month: date.year() == year && date.month() == month,
            })
        })
        .collect();
    (cells.len() == MONTH_GRID_CELLS).then_some(cells)
}
