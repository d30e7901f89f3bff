//! `tempo-core`: configuration, shared enums and the top-level error type
//! used by every other `tempo-*` crate.

pub mod config;
pub mod error;
pub mod types;

pub use config::TempoConfig;
pub use error::{Result, TempoError};
pub use types::{LogLevel, TaskKind};
