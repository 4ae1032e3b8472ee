use chrono::{Datelike, TimeZone, Timelike, Utc, Weekday};
use ledgerflow::schedule::{EXECUTION_HOUR, days_in_month, next_execution};
use ledgerflow::types::{Frequency, ScheduleAnchor};
use proptest::prelude::*;

#[test]
fn daily_lands_on_next_day_at_execution_hour() {
    let from = Utc.with_ymd_and_hms(2024, 3, 13, 15, 30, 0).unwrap();
    let next = next_execution(Frequency::Daily, None, from);
    assert_eq!(next, Utc.with_ymd_and_hms(2024, 3, 14, EXECUTION_HOUR, 0, 0).unwrap());
}

#[test]
fn daily_early_morning_still_moves_to_next_day() {
    let from = Utc.with_ymd_and_hms(2024, 3, 13, 3, 0, 0).unwrap();
    let next = next_execution(Frequency::Daily, None, from);
    assert_eq!(next.day(), 14);
    assert_eq!(next.hour(), EXECUTION_HOUR);
}

#[test]
fn weekly_created_wednesday_hits_upcoming_monday() {
    // 2024-03-13 is a Wednesday.
    let wednesday = Utc.with_ymd_and_hms(2024, 3, 13, 12, 0, 0).unwrap();
    let anchor = ScheduleAnchor::weekly(Weekday::Mon);
    let next = next_execution(Frequency::Weekly, Some(&anchor), wednesday);
    assert_eq!(next, Utc.with_ymd_and_hms(2024, 3, 18, EXECUTION_HOUR, 0, 0).unwrap());
    assert_eq!(next.weekday(), Weekday::Mon);
}

#[test]
fn weekly_defaults_to_monday_without_anchor() {
    let wednesday = Utc.with_ymd_and_hms(2024, 3, 13, 12, 0, 0).unwrap();
    let next = next_execution(Frequency::Weekly, None, wednesday);
    assert_eq!(next.weekday(), Weekday::Mon);
    assert_eq!(next.day(), 18);
}

#[test]
fn weekly_same_day_before_execution_hour_fires_today() {
    // Anchored to the current weekday, before 09:00: today still counts.
    let wednesday_early = Utc.with_ymd_and_hms(2024, 3, 13, 3, 0, 0).unwrap();
    let anchor = ScheduleAnchor::weekly(Weekday::Wed);
    let next = next_execution(Frequency::Weekly, Some(&anchor), wednesday_early);
    assert_eq!(next, Utc.with_ymd_and_hms(2024, 3, 13, EXECUTION_HOUR, 0, 0).unwrap());
}

#[test]
fn weekly_same_day_after_execution_hour_waits_a_week() {
    let wednesday_noon = Utc.with_ymd_and_hms(2024, 3, 13, 12, 0, 0).unwrap();
    let anchor = ScheduleAnchor::weekly(Weekday::Wed);
    let next = next_execution(Frequency::Weekly, Some(&anchor), wednesday_noon);
    assert_eq!(next, Utc.with_ymd_and_hms(2024, 3, 20, EXECUTION_HOUR, 0, 0).unwrap());
}

#[test]
fn monthly_clamps_anchor_31_to_february() {
    let from = Utc.with_ymd_and_hms(2023, 1, 15, 12, 0, 0).unwrap();
    let anchor = ScheduleAnchor::monthly(31);
    let next = next_execution(Frequency::Monthly, Some(&anchor), from);
    // Never rolls into March.
    assert_eq!((next.year(), next.month(), next.day()), (2023, 2, 28));
}

#[test]
fn monthly_clamps_to_leap_day_in_leap_years() {
    let from = Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap();
    let anchor = ScheduleAnchor::monthly(31);
    let next = next_execution(Frequency::Monthly, Some(&anchor), from);
    assert_eq!((next.month(), next.day()), (2, 29));
}

#[test]
fn monthly_without_anchor_keeps_day_of_from() {
    let from = Utc.with_ymd_and_hms(2024, 3, 7, 12, 0, 0).unwrap();
    let next = next_execution(Frequency::Monthly, None, from);
    assert_eq!((next.month(), next.day(), next.hour()), (4, 7, EXECUTION_HOUR));
}

#[test]
fn monthly_wraps_the_year_boundary() {
    let from = Utc.with_ymd_and_hms(2024, 12, 15, 12, 0, 0).unwrap();
    let next = next_execution(Frequency::Monthly, None, from);
    assert_eq!((next.year(), next.month(), next.day()), (2025, 1, 15));
}

#[test]
fn quarterly_adds_three_months_with_clamping() {
    let from = Utc.with_ymd_and_hms(2024, 1, 31, 12, 0, 0).unwrap();
    let next = next_execution(Frequency::Quarterly, None, from);
    // Anchor defaults to day 31 of `from`; April has 30 days.
    assert_eq!((next.year(), next.month(), next.day()), (2024, 4, 30));
}

#[test]
fn days_in_month_is_leap_aware() {
    assert_eq!(days_in_month(2023, 2), 28);
    assert_eq!(days_in_month(2024, 2), 29);
    assert_eq!(days_in_month(2024, 4), 30);
    assert_eq!(days_in_month(2024, 12), 31);
}

const WEEKDAYS: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

fn arb_frequency() -> impl Strategy<Value = Frequency> {
    prop_oneof![
        Just(Frequency::Daily),
        Just(Frequency::Weekly),
        Just(Frequency::Monthly),
        Just(Frequency::Quarterly),
    ]
}

fn arb_anchor() -> impl Strategy<Value = Option<ScheduleAnchor>> {
    proptest::option::of((0usize..7, 1u32..=31).prop_map(|(dow, dom)| ScheduleAnchor {
        day_of_week: Some(WEEKDAYS[dow]),
        day_of_month: Some(dom),
    }))
}

proptest! {
    /// Applied repeatedly to its own output, the calculator always moves
    /// strictly forward for every frequency and anchor.
    #[test]
    fn next_execution_strictly_increases(
        frequency in arb_frequency(),
        anchor in arb_anchor(),
        offset in 0i64..300_000_000,
    ) {
        // 2020-01-01 plus up to ~9.5 years of seconds.
        let from = Utc.timestamp_opt(1_577_836_800 + offset, 0).unwrap();
        let mut previous = from;
        for _ in 0..8 {
            let next = next_execution(frequency, anchor.as_ref(), previous);
            prop_assert!(next > previous, "{next} not after {previous} ({frequency})");
            prop_assert_eq!(next.hour(), EXECUTION_HOUR);
            previous = next;
        }
    }

    /// Monthly/quarterly results never land outside the target month.
    #[test]
    fn month_arithmetic_never_rolls_over(
        months in prop_oneof![Just(Frequency::Monthly), Just(Frequency::Quarterly)],
        dom in 1u32..=31,
        offset in 0i64..300_000_000,
    ) {
        let from = Utc.timestamp_opt(1_577_836_800 + offset, 0).unwrap();
        let anchor = ScheduleAnchor::monthly(dom);
        let next = next_execution(months, Some(&anchor), from);
        prop_assert!(next.day() <= dom.min(days_in_month(next.year(), next.month())));
        let step = match months {
            Frequency::Quarterly => 3,
            _ => 1,
        };
        let expected_month0 = (from.month0() + step) % 12;
        prop_assert_eq!(next.month0(), expected_month0);
    }
}
