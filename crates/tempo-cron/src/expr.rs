use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, NaiveDate, Timelike, Utc};

use crate::error::{CronError, Result};

/// The five positional fields of a cron expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Minute,
    Hour,
    DayOfMonth,
    Month,
    DayOfWeek,
}

impl Field {
    pub const ALL: [Field; 5] = [
        Field::Minute,
        Field::Hour,
        Field::DayOfMonth,
        Field::Month,
        Field::DayOfWeek,
    ];

    /// Inclusive value domain of the field.
    pub fn bounds(self) -> (u32, u32) {
        match self {
            Field::Minute => (0, 59),
            Field::Hour => (0, 23),
            Field::DayOfMonth => (1, 31),
            Field::Month => (1, 12),
            // 0 and 7 are both Sunday.
            Field::DayOfWeek => (0, 7),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Field::Minute => "minutes",
            Field::Hour => "hours",
            Field::DayOfMonth => "days",
            Field::Month => "months",
            Field::DayOfWeek => "days of week",
        }
    }
}

/// A parsed five-field cron expression: one sorted, de-duplicated value set
/// per field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronExpr {
    source: String,
    minutes: Vec<u32>,
    hours: Vec<u32>,
    days: Vec<u32>,
    months: Vec<u32>,
    weekdays: Vec<u32>,
}

impl CronExpr {
    /// Parse `m h dom mon dow`. Fields are separated by any whitespace.
    pub fn parse(cron: &str) -> Result<Self> {
        let parts: Vec<&str> = cron.split_whitespace().collect();
        if parts.len() != 5 {
            return Err(CronError::Format(format!(
                "expected 5 fields (minute hour day-of-month month day-of-week), got {} in {cron:?}",
                parts.len()
            )));
        }

        let sets = Field::ALL
            .iter()
            .zip(&parts)
            .map(|(field, part)| parse_field(*field, part))
            .collect::<Result<Vec<_>>>()?;
        let [minutes, hours, days, months, weekdays]: [Vec<u32>; 5] = sets
            .try_into()
            .map_err(|_| CronError::Format(format!("expected 5 fields in {cron:?}")))?;

        Ok(Self {
            source: parts.join(" "),
            minutes,
            hours,
            days,
            months,
            weekdays,
        })
    }

    pub fn minutes(&self) -> &[u32] {
        &self.minutes
    }

    pub fn hours(&self) -> &[u32] {
        &self.hours
    }

    pub fn days(&self) -> &[u32] {
        &self.days
    }

    pub fn months(&self) -> &[u32] {
        &self.months
    }

    pub fn weekdays(&self) -> &[u32] {
        &self.weekdays
    }

    /// Whether a chain with this schedule is due at `ts`.
    ///
    /// Seconds are ignored. The weekday matches when it is in the set under
    /// either numbering: 0 = Sunday .. 6 = Saturday, or ISO 1 = Monday ..
    /// 7 = Sunday.
    pub fn is_due_at(&self, ts: DateTime<Utc>) -> bool {
        let weekday = ts.weekday();
        self.months.contains(&ts.month())
            && (self.weekdays.contains(&weekday.num_days_from_sunday())
                || self.weekdays.contains(&weekday.number_from_monday()))
            && self.days.contains(&ts.day())
            && self.hours.contains(&ts.hour())
            && self.minutes.contains(&ts.minute())
    }

    /// Calendar-day filter used when enumerating occurrences.
    ///
    /// Unlike [`CronExpr::is_due_at`] the weekday is compared with the
    /// 0 = Sunday numbering only, so a bare `7` never matches here.
    pub(crate) fn day_matches(&self, date: NaiveDate) -> bool {
        self.days.contains(&date.day())
            && self
                .weekdays
                .contains(&date.weekday().num_days_from_sunday())
    }

    pub(crate) fn month_matches(&self, month: u32) -> bool {
        self.months.contains(&month)
    }
}

impl fmt::Display for CronExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl FromStr for CronExpr {
    type Err = CronError;

    fn from_str(s: &str) -> Result<Self> {
        CronExpr::parse(s)
    }
}

/// Resolve one field (a comma list of items) into its value set.
fn parse_field(field: Field, spec: &str) -> Result<Vec<u32>> {
    let (min, max) = field.bounds();
    let mut values = BTreeSet::new();

    for item in spec.split(',') {
        let out_of_range = || CronError::Range {
            field: field.name(),
            token: item.to_string(),
            min,
            max,
        };

        let (start, end, step) = parse_item(field, item)?;
        if start < min || end > max || start > end {
            return Err(out_of_range());
        }
        values.extend((start..=end).step_by(step as usize));
    }

    Ok(values.into_iter().collect())
}

/// Decode a single list item into an inclusive `(start, end, step)` triple.
fn parse_item(field: Field, item: &str) -> Result<(u32, u32, u32)> {
    let (min, max) = field.bounds();
    let unrecognized = || {
        CronError::Format(format!(
            "{} value not recognized: {item:?} (use numbers, lists with ',', \
             '*', ranges with '-' and steps with '/')",
            field.name()
        ))
    };

    let (range, step) = match item.split_once('/') {
        Some((range, step)) => {
            let step = number(step).ok_or_else(unrecognized)?;
            if step == 0 {
                return Err(CronError::Format(format!(
                    "{} step must be positive: {item:?}",
                    field.name()
                )));
            }
            (range, Some(step))
        }
        None => (item, None),
    };

    let (start, end) = if range == "*" {
        (min, max)
    } else if let Some((a, b)) = range.split_once('-') {
        (
            number(a).ok_or_else(unrecognized)?,
            number(b).ok_or_else(unrecognized)?,
        )
    } else {
        let n = number(range).ok_or_else(unrecognized)?;
        match step {
            // `a/step` runs from `a` up to the field maximum.
            Some(_) => (n, max.max(n)),
            None => (n, n),
        }
    };

    Ok((start, end, step.unwrap_or(1)))
}

/// Plain unsigned decimal; rejects signs, blanks and overflow.
fn number(s: &str) -> Option<u32> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}
