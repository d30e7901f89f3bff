use std::collections::VecDeque;

use chrono::{DateTime, Datelike, Months, NaiveDate, Utc};

use crate::error::Result;
use crate::expr::CronExpr;

/// Months scanned past the reference month before giving up.
///
/// An expression with no match inside this window (e.g. `0 0 30 2 *`) yields
/// an empty sequence.
pub const LOOKAHEAD_MONTHS: u32 = 12;

/// Lazy, ascending sequence of instants matching a cron expression, strictly
/// after a reference time.
///
/// Work is done one calendar month at a time. The iterator is `Clone`, so a
/// copy taken before consumption replays the same sequence.
#[derive(Debug, Clone)]
pub struct Occurrences {
    expr: CronExpr,
    after: DateTime<Utc>,
    /// First day of the next month to expand.
    cursor: Option<NaiveDate>,
    /// First day of the last month inside the horizon.
    last: NaiveDate,
    pending: VecDeque<DateTime<Utc>>,
}

impl Occurrences {
    pub fn new(expr: CronExpr, after: DateTime<Utc>) -> Self {
        let first = month_start(after.date_naive());
        let last = first
            .checked_add_months(Months::new(LOOKAHEAD_MONTHS))
            .unwrap_or(first);
        Self {
            expr,
            after,
            cursor: Some(first),
            last,
            pending: VecDeque::new(),
        }
    }

    fn expand_month(&mut self, month: NaiveDate) {
        if !self.expr.month_matches(month.month()) {
            return;
        }
        for day in 1..=31 {
            let Some(date) = NaiveDate::from_ymd_opt(month.year(), month.month(), day) else {
                break;
            };
            if !self.expr.day_matches(date) {
                continue;
            }
            for &hour in self.expr.hours() {
                for &minute in self.expr.minutes() {
                    let Some(at) = date.and_hms_opt(hour, minute, 0) else {
                        continue;
                    };
                    let at = at.and_utc();
                    if at > self.after {
                        self.pending.push_back(at);
                    }
                }
            }
        }
    }
}

impl Iterator for Occurrences {
    type Item = DateTime<Utc>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(at) = self.pending.pop_front() {
                return Some(at);
            }
            let month = self.cursor?;
            self.cursor = month
                .checked_add_months(Months::new(1))
                .filter(|next| *next <= self.last);
            self.expand_month(month);
        }
    }
}

fn month_start(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

impl CronExpr {
    /// Occurrences of this expression strictly after `after`.
    pub fn occurrences_from(&self, after: DateTime<Utc>) -> Occurrences {
        Occurrences::new(self.clone(), after)
    }
}

/// Parse `cron` and enumerate its occurrences strictly after `reference`.
///
/// Only the five-field grammar is evaluated; special forms are a
/// [`CronError::Format`](crate::CronError::Format) here.
pub fn occurrences_from(reference: DateTime<Utc>, cron: &str) -> Result<Occurrences> {
    Ok(CronExpr::parse(cron)?.occurrences_from(reference))
}

/// First occurrence strictly after `from`, if one exists within the horizon.
pub fn next_run_after(cron: &str, from: DateTime<Utc>) -> Result<Option<DateTime<Utc>>> {
    Ok(occurrences_from(from, cron)?.next())
}

/// First occurrence strictly after the current time.
pub fn next_run(cron: &str) -> Result<Option<DateTime<Utc>>> {
    next_run_after(cron, Utc::now())
}

/// Whether a chain scheduled with `cron` is due at `ts`.
///
/// A chain without a schedule (`None`) is only started by notification and
/// counts as always due.
pub fn is_due(cron: Option<&str>, ts: DateTime<Utc>) -> Result<bool> {
    match cron {
        None => Ok(true),
        Some(cron) => Ok(CronExpr::parse(cron)?.is_due_at(ts)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Timelike};

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn next_run_is_in_the_future() {
        let before = Utc::now();
        let next = next_run("* * * * *").unwrap().unwrap();
        assert!(next > before);
        assert_eq!(next.second(), 0);
        assert!(next - before <= Duration::minutes(1));
        assert!(next_run("@reboot").is_err());
    }

    #[test]
    fn next_run_is_exclusive_of_the_reference() {
        assert_eq!(
            next_run_after("0 5 * * *", at(2024, 1, 1, 0, 0)).unwrap(),
            Some(at(2024, 1, 1, 5, 0))
        );
        assert_eq!(
            next_run_after("0 5 * * *", at(2024, 1, 1, 5, 0)).unwrap(),
            Some(at(2024, 1, 2, 5, 0))
        );
    }

    #[test]
    fn sub_minute_reference_skips_the_current_minute() {
        let reference = at(2024, 1, 1, 5, 0) + Duration::seconds(30);
        assert_eq!(
            next_run_after("* * * * *", reference).unwrap(),
            Some(at(2024, 1, 1, 5, 1))
        );
    }

    #[test]
    fn sequence_is_strictly_increasing_and_due() {
        let expr = CronExpr::parse("*/20 8-9 1,15 * *").unwrap();
        let runs: Vec<_> = expr.occurrences_from(at(2024, 1, 1, 8, 20)).take(30).collect();
        assert_eq!(runs.len(), 30);
        assert_eq!(runs[0], at(2024, 1, 1, 8, 40));
        assert!(runs.windows(2).all(|w| w[0] < w[1]));
        assert!(runs.iter().all(|t| expr.is_due_at(*t) && t.second() == 0));
    }

    #[test]
    fn crosses_year_boundary() {
        assert_eq!(
            next_run_after("30 23 31 12 *", at(2024, 12, 31, 23, 30)).unwrap(),
            Some(at(2025, 12, 31, 23, 30))
        );
    }

    #[test]
    fn leap_day_found_within_horizon() {
        assert_eq!(
            next_run_after("0 0 29 2 *", at(2023, 6, 1, 0, 0)).unwrap(),
            Some(at(2024, 2, 29, 0, 0))
        );
    }

    #[test]
    fn nothing_beyond_the_horizon() {
        // The next 29th of February after mid-2024 is in 2028.
        assert_eq!(next_run_after("0 0 29 2 *", at(2024, 6, 1, 0, 0)).unwrap(), None);
        // February never has a 30th.
        assert_eq!(next_run_after("0 0 30 2 *", at(2024, 1, 1, 0, 0)).unwrap(), None);
    }

    #[test]
    fn day_of_month_and_weekday_must_both_match() {
        // Friday the 13th: 2024-09-13 and 2024-12-13.
        let runs: Vec<_> = occurrences_from(at(2024, 1, 1, 0, 0), "0 0 13 * 5")
            .unwrap()
            .collect();
        assert_eq!(runs, vec![at(2024, 9, 13, 0, 0), at(2024, 12, 13, 0, 0)]);
    }

    #[test]
    fn clone_restarts_the_sequence() {
        let runs = occurrences_from(at(2024, 3, 1, 0, 0), "0 12 * * 1").unwrap();
        let replay = runs.clone();
        let first: Vec<_> = runs.take(3).collect();
        let again: Vec<_> = replay.take(3).collect();
        assert_eq!(first, again);
        assert_eq!(first[0], at(2024, 3, 4, 12, 0));
    }

    // Weekday 7 matches Sundays in `is_due` (ISO numbering) but the occurrence
    // filter only knows 0 = Sunday, so the sequence is empty.
    #[test]
    fn weekday_seven_is_due_but_never_enumerated() {
        let sunday = at(2024, 1, 7, 0, 0);
        assert!(is_due(Some("0 0 * * 7"), sunday).unwrap());
        assert_eq!(next_run_after("0 0 * * 7", at(2024, 1, 1, 0, 0)).unwrap(), None);
        assert_eq!(
            next_run_after("0 0 * * 0", at(2024, 1, 1, 0, 0)).unwrap(),
            Some(sunday)
        );
    }

    #[test]
    fn missing_schedule_is_always_due() {
        for t in [at(2024, 1, 1, 0, 0), at(1999, 12, 31, 23, 59), Utc::now()] {
            assert!(is_due(None, t).unwrap());
        }
    }

    #[test]
    fn special_forms_are_not_evaluated_here() {
        assert!(next_run_after("@every 1 hour", Utc::now()).is_err());
        assert!(is_due(Some("@reboot"), Utc::now()).is_err());
    }
}
