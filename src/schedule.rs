//! Recurring-schedule calculator.
//!
//! [`next_execution`] is a pure function: identical inputs always produce the
//! identical next instant, which keeps scheduling decisions testable and
//! replayable. All instants are UTC and every computed occurrence lands on
//! the fixed execution hour ([`EXECUTION_HOUR`]).

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc, Weekday};

use crate::types::{Frequency, ScheduleAnchor};

/// Hour of day (UTC) at which every recurrence fires.
pub const EXECUTION_HOUR: u32 = 9;

/// Compute the next eligible execution instant strictly after `from`.
///
/// - `Daily`: the day after `from`, at the execution hour.
/// - `Weekly`: the next calendar day matching the anchor's day-of-week
///   (Monday when unanchored) whose execution-hour instant lies strictly
///   after `from`.
/// - `Monthly`: one month ahead, on the anchor's day-of-month (the day of
///   `from` when unanchored), clamped to the target month's last valid day.
/// - `Quarterly`: three months ahead, same clamping.
///
/// Clamping never rolls into a following month: an anchor of 31 lands on
/// Feb 28/29, Apr 30, and so on.
///
/// # Examples
///
/// ```rust
/// use chrono::{TimeZone, Utc, Weekday};
/// use ledgerflow::schedule::next_execution;
/// use ledgerflow::types::{Frequency, ScheduleAnchor};
///
/// // Created on a Wednesday, anchored to Monday: the upcoming Monday.
/// let wednesday = Utc.with_ymd_and_hms(2024, 3, 13, 15, 30, 0).unwrap();
/// let anchor = ScheduleAnchor::weekly(Weekday::Mon);
/// let next = next_execution(Frequency::Weekly, Some(&anchor), wednesday);
/// assert_eq!(next, Utc.with_ymd_and_hms(2024, 3, 18, 9, 0, 0).unwrap());
/// ```
#[must_use]
pub fn next_execution(
    frequency: Frequency,
    anchor: Option<&ScheduleAnchor>,
    from: DateTime<Utc>,
) -> DateTime<Utc> {
    match frequency {
        Frequency::Daily => at_execution_hour((from + Duration::hours(24)).date_naive()),
        Frequency::Weekly => {
            let target = anchor
                .and_then(|a| a.day_of_week)
                .unwrap_or(Weekday::Mon);
            next_weekday_after(target, from)
        }
        Frequency::Monthly => months_ahead(from, 1, anchor),
        Frequency::Quarterly => months_ahead(from, 3, anchor),
    }
}

/// Number of days in the given month, leap-year aware.
#[must_use]
pub fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|d| d.pred_opt())
        .map(|d| d.day())
        // Unreachable for any month chrono can represent.
        .unwrap_or(28)
}

fn at_execution_hour(date: NaiveDate) -> DateTime<Utc> {
    let time = date
        .and_hms_opt(EXECUTION_HOUR, 0, 0)
        .expect("execution hour is a valid time of day");
    Utc.from_utc_datetime(&time)
}

fn next_weekday_after(target: Weekday, from: DateTime<Utc>) -> DateTime<Utc> {
    let mut date = from.date_naive();
    // At most eight candidates: today (if the hour has not passed) plus one
    // full week.
    for _ in 0..=7 {
        if date.weekday() == target {
            let candidate = at_execution_hour(date);
            if candidate > from {
                return candidate;
            }
        }
        date = date.succ_opt().expect("date within supported range");
    }
    unreachable!("a matching weekday exists within seven days")
}

fn months_ahead(from: DateTime<Utc>, months: u32, anchor: Option<&ScheduleAnchor>) -> DateTime<Utc> {
    let anchor_day = anchor.and_then(|a| a.day_of_month).unwrap_or(from.day());
    let total = from.month0() + months;
    let year = from.year() + (total / 12) as i32;
    let month = total % 12 + 1;
    let day = anchor_day.clamp(1, days_in_month(year, month));
    let date = NaiveDate::from_ymd_opt(year, month, day)
        .expect("day clamped to target month length");
    at_execution_hour(date)
}
