use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::TempoError;

/// How a task's `command` is interpreted by the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskKind {
    /// A SQL statement run against the task's target connection.
    #[default]
    Sql,
    /// An external program; parameters are its argument vector.
    Program,
    /// A routine compiled into the worker (`Sleep`, `Log`, `SendMail`, ...).
    Builtin,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Sql => "SQL",
            TaskKind::Program => "PROGRAM",
            TaskKind::Builtin => "BUILTIN",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskKind {
    type Err = TempoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "SQL" => Ok(TaskKind::Sql),
            "PROGRAM" => Ok(TaskKind::Program),
            "BUILTIN" => Ok(TaskKind::Builtin),
            other => Err(TempoError::InvalidValue {
                field: "kind",
                reason: format!("unknown task kind: {other}"),
            }),
        }
    }
}

/// Severity stored in the append-only `log` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    Notice,
    Info,
    Error,
    Panic,
    /// Messages emitted by user tasks (e.g. the `Log` built-in).
    User,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Notice => "NOTICE",
            LogLevel::Info => "INFO",
            LogLevel::Error => "ERROR",
            LogLevel::Panic => "PANIC",
            LogLevel::User => "USER",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = TempoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "DEBUG" => Ok(LogLevel::Debug),
            "NOTICE" => Ok(LogLevel::Notice),
            "INFO" => Ok(LogLevel::Info),
            "ERROR" => Ok(LogLevel::Error),
            "PANIC" => Ok(LogLevel::Panic),
            "USER" => Ok(LogLevel::User),
            other => Err(TempoError::InvalidValue {
                field: "log_level",
                reason: format!("unknown log level: {other}"),
            }),
        }
    }
}
