use std::fmt;
use std::str::FromStr;

use chrono::Duration;

use crate::error::{CronError, Result};
use crate::expr::CronExpr;
use crate::interval::parse_interval;

/// Any string accepted as a chain's `run_at` value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Schedule {
    /// Run once each time a worker starts.
    Reboot,
    /// Run on a fixed cadence regardless of how long each run takes.
    Every(Duration),
    /// Run again this long after the previous run finished.
    After(Duration),
    /// Five-field calendar expression.
    Cron(CronExpr),
}

impl Schedule {
    /// Parse and validate a schedule string.
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if s == "@reboot" {
            return Ok(Schedule::Reboot);
        }
        if let Some(rest) = special_argument(s, "@every") {
            return parse_interval(rest).map(Schedule::Every);
        }
        if let Some(rest) = special_argument(s, "@after") {
            return parse_interval(rest).map(Schedule::After);
        }
        if s.starts_with('@') {
            return Err(CronError::Format(format!(
                "unknown special schedule {s:?} (expected @reboot, @every or @after)"
            )));
        }
        CronExpr::parse(s).map(Schedule::Cron)
    }

    /// True for `@reboot`, `@every` and `@after`.
    pub fn is_special(&self) -> bool {
        !matches!(self, Schedule::Cron(_))
    }

    pub fn as_cron(&self) -> Option<&CronExpr> {
        match self {
            Schedule::Cron(expr) => Some(expr),
            _ => None,
        }
    }
}

/// `@every 5 minutes` → `Some("5 minutes")`; the keyword must be followed by
/// whitespace.
fn special_argument<'a>(s: &'a str, keyword: &str) -> Option<&'a str> {
    let rest = s.strip_prefix(keyword)?;
    if rest.starts_with(char::is_whitespace) {
        Some(rest.trim())
    } else {
        None
    }
}

impl FromStr for Schedule {
    type Err = CronError;

    fn from_str(s: &str) -> Result<Self> {
        Schedule::parse(s)
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Schedule::Reboot => f.write_str("@reboot"),
            Schedule::Every(d) => write!(f, "@every {} seconds", d.num_seconds()),
            Schedule::After(d) => write!(f, "@after {} seconds", d.num_seconds()),
            Schedule::Cron(expr) => write!(f, "{expr}"),
        }
    }
}
