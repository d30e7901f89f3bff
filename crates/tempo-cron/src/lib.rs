//! `tempo-cron`: extended cron parsing and occurrence calculation.
//!
//! # Schedule strings
//!
//! | Form                 | Meaning                                             |
//! |----------------------|-----------------------------------------------------|
//! | `@reboot`            | Run once when the worker starts                     |
//! | `@every <interval>`  | Run repeatedly with a fixed interval                |
//! | `@after <interval>`  | Run again `<interval>` after the previous run ended |
//! | `m h dom mon dow`    | Five-field cron expression, evaluated here          |
//!
//! Only the five-field form has calendar semantics in this crate; the special
//! forms are parsed into a [`Schedule`] and their timing is left to the
//! caller's scheduling loop.
//!
//! Field items: `n`, `*`, `a-b`, `a/step` (from `a` to the field maximum),
//! `a-b/step`, `*/step`, and comma lists of these. Day-of-week accepts `0-7`,
//! where both `0` and `7` are Sunday.

pub mod error;
pub mod expr;
pub mod interval;
pub mod occurrences;
pub mod schedule;

pub use error::{CronError, Result};
pub use expr::{CronExpr, Field};
pub use interval::parse_interval;
pub use occurrences::{is_due, next_run, next_run_after, occurrences_from, Occurrences};
pub use schedule::Schedule;
