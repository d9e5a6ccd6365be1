//! Weekday/weekend stay-window schedule.
//!
//! Pricing is sampled over short stays rather than single nights: a weekday
//! window runs Monday to Friday and a weekend window Friday to Sunday. The
//! schedule starts from the Monday after the given date so every window lies
//! fully in the future.

use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};

/// Which part of the week a stay window covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PeriodType {
    /// Monday check-in, Friday check-out
    #[serde(rename = "weekday")]
    Weekday,
    /// Friday check-in, Sunday check-out
    #[serde(rename = "weekend")]
    Weekend,
}

impl std::fmt::Display for PeriodType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PeriodType::Weekday => write!(f, "weekday"),
            PeriodType::Weekend => write!(f, "weekend"),
        }
    }
}

/// A concrete check-in/check-out date pair used for price quotes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StayWindow {
    /// Check-in date
    pub check_in: NaiveDate,
    /// Check-out date
    pub check_out: NaiveDate,
    /// Whether this is a weekday or weekend stay
    pub period: PeriodType,
}

impl StayWindow {
    /// Number of nights covered by the window.
    pub fn nights(&self) -> i64 {
        (self.check_out - self.check_in).num_days()
    }
}

/// The Monday strictly after `from`.
///
/// A Sunday skips the immediately following Monday so that the first weekday
/// window never starts less than a full day out.
fn next_monday(from: NaiveDate) -> NaiveDate {
    let days_ahead = match from.weekday().num_days_from_monday() {
        0 => 7,
        6 => 8,
        n => 7 - i64::from(n),
    };
    from + Duration::days(days_ahead)
}

/// Build the stay-window schedule: one weekday and one weekend window per
/// week for `weeks` consecutive weeks, starting the Monday after `from`.
pub fn stay_windows(from: NaiveDate, weeks: u32) -> Vec<StayWindow> {
    let mut windows = Vec::with_capacity(weeks as usize * 2);
    let first_monday = next_monday(from);

    for week in 0..i64::from(weeks) {
        let monday = first_monday + Duration::days(week * 7);
        let friday = monday + Duration::days(4);
        let sunday = monday + Duration::days(6);

        windows.push(StayWindow {
            check_in: monday,
            check_out: friday,
            period: PeriodType::Weekday,
        });
        windows.push(StayWindow {
            check_in: friday,
            check_out: sunday,
            period: PeriodType::Weekend,
        });
    }
    windows
}
