//! Property-based tests for `DayKey`.
//!
//! Uses proptest to verify:
//! 1. The string form is canonical: it parses back to the same key and is
//!    always ten zero-padded characters.
//! 2. Day offsets compose and invert across month and year boundaries.
//! 3. Every instant of a day maps to that day, in any fixed offset.
//! 4. A key derived from any instant parses back from its string form.
//! 5. Arbitrary strings never panic the parser.

#![allow(clippy::unwrap_used)]

use chrono::{Datelike, FixedOffset, NaiveTime, TimeZone, Utc};
use proptest::prelude::*;

use planboard_model::day::DayKey;

// --- Strategies ---

fn arb_day() -> impl Strategy<Value = DayKey> {
    (3_i32..9990, 1_u32..=12, 1_u32..=31)
        .prop_filter_map("valid date", |(y, m, d)| DayKey::from_ymd(y, m, d))
}

fn arb_offset() -> impl Strategy<Value = FixedOffset> {
    (-(23 * 60)..=(23 * 60)).prop_filter_map("valid offset", |minutes: i32| {
        FixedOffset::east_opt(minutes * 60)
    })
}

// --- Properties ---

proptest! {
    #[test]
    fn display_parses_back(day in arb_day()) {
        let text = day.to_string();
        prop_assert_eq!(text.len(), 10);
        prop_assert_eq!(text.parse::<DayKey>(), Ok(day));
    }

    #[test]
    fn offsets_compose_and_invert(day in arb_day(), a in -400_i64..400, b in -400_i64..400) {
        let stepwise = day.offset_days(a).and_then(|d| d.offset_days(b));
        prop_assert_eq!(stepwise, day.offset_days(a + b));
        prop_assert_eq!(day.offset_days(a).and_then(|d| d.offset_days(-a)), Some(day));
    }

    #[test]
    fn next_day_rolls_over_month_ends(day in arb_day()) {
        let next = day.offset_days(1).unwrap();
        if next.date().month() == day.date().month() {
            prop_assert_eq!(next.date().day(), day.date().day() + 1);
        } else {
            prop_assert_eq!(next.date().day(), 1);
        }
    }

    #[test]
    fn every_instant_of_a_day_maps_to_it(
        day in arb_day(),
        offset in arb_offset(),
        second in 0_u32..86_400,
    ) {
        let time = NaiveTime::from_num_seconds_from_midnight_opt(second, 0).unwrap();
        let local = offset
            .from_local_datetime(&day.date().and_time(time))
            .single()
            .unwrap();
        let millis = local.timestamp_millis();
        prop_assert_eq!(DayKey::from_epoch_millis(millis, &offset), Some(day));
    }

    #[test]
    fn keys_from_any_instant_parse_back(millis in any::<i64>()) {
        if let Some(day) = DayKey::from_epoch_millis(millis, &Utc) {
            prop_assert_eq!(day.to_string().parse::<DayKey>(), Ok(day));
        }
    }

    #[test]
    fn parser_never_panics(s in "\\PC{0,16}") {
        let _ = s.parse::<DayKey>();
    }
}
