use chrono::Duration;

use crate::error::{CronError, Result};

const MINUTE: f64 = 60.0;
const HOUR: f64 = 60.0 * MINUTE;
const DAY: f64 = 24.0 * HOUR;
const WEEK: f64 = 7.0 * DAY;
// Calendar units use the fixed lengths PostgreSQL uses for interval arithmetic.
const MONTH: f64 = 30.0 * DAY;
const YEAR: f64 = 365.25 * DAY;

/// Parse interval text as accepted after `@every` / `@after`.
///
/// Accepts a sequence of `<number> [unit]` terms (`"1 hour 30 minutes"`,
/// `"2d"`, `"1.5 hours"`, `"90"` = seconds) and clock terms
/// (`"01:30"` = 1h30m, `"00:00:45"`). Terms may be separated by whitespace or
/// commas. The total must be positive.
pub fn parse_interval(text: &str) -> Result<Duration> {
    let invalid = |reason: &str| CronError::Format(format!("invalid interval {text:?}: {reason}"));

    let mut seconds = 0.0_f64;
    let mut terms = 0usize;
    let mut rest = text.trim();

    while !rest.is_empty() {
        rest = rest.trim_start_matches(|c: char| c.is_whitespace() || c == ',');
        if rest.is_empty() {
            break;
        }

        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == ':'))
            .unwrap_or(rest.len());
        if number_len == 0 {
            return Err(invalid("expected a number"));
        }
        let (number, tail) = rest.split_at(number_len);

        if number.contains(':') {
            seconds += parse_clock(number).ok_or_else(|| invalid("bad clock term"))?;
            rest = tail;
        } else {
            let value: f64 = number.parse().map_err(|_| invalid("bad number"))?;
            let tail = tail.trim_start();
            let unit_len = tail
                .find(|c: char| !c.is_ascii_alphabetic())
                .unwrap_or(tail.len());
            let (unit, after) = tail.split_at(unit_len);
            let scale = if unit.is_empty() {
                1.0
            } else {
                unit_seconds(unit).ok_or_else(|| invalid("unknown unit"))?
            };
            seconds += value * scale;
            rest = after;
        }
        terms += 1;
    }

    if terms == 0 {
        return Err(invalid("empty"));
    }
    if seconds <= 0.0 || !seconds.is_finite() {
        return Err(invalid("must be positive"));
    }
    Duration::try_milliseconds((seconds * 1000.0).round() as i64)
        .ok_or_else(|| invalid("too large"))
}

fn unit_seconds(unit: &str) -> Option<f64> {
    let scale = match unit.to_ascii_lowercase().as_str() {
        "s" | "sec" | "secs" | "second" | "seconds" => 1.0,
        "m" | "min" | "mins" | "minute" | "minutes" => MINUTE,
        "h" | "hr" | "hrs" | "hour" | "hours" => HOUR,
        "d" | "day" | "days" => DAY,
        "w" | "week" | "weeks" => WEEK,
        "mon" | "mons" | "month" | "months" => MONTH,
        "y" | "yr" | "yrs" | "year" | "years" => YEAR,
        _ => return None,
    };
    Some(scale)
}

/// `HH:MM` or `HH:MM:SS[.fff]`.
fn parse_clock(term: &str) -> Option<f64> {
    let parts: Vec<&str> = term.split(':').collect();
    let (h, m, s) = match parts.as_slice() {
        [h, m] => (*h, *m, "0"),
        [h, m, s] => (*h, *m, *s),
        _ => return None,
    };
    let h: u64 = h.parse().ok()?;
    let m: u64 = m.parse().ok()?;
    let s: f64 = s.parse().ok()?;
    if m >= 60 || !(0.0..60.0).contains(&s) {
        return None;
    }
    Some(h as f64 * HOUR + m as f64 * MINUTE + s)
}
