use thiserror::Error;

/// Errors raised while loading and checking the worker configuration.
#[derive(Debug, Error)]
pub enum TempoError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

impl TempoError {
    /// Short, stable error code suitable for log fields and exit reports.
    pub fn code(&self) -> &'static str {
        match self {
            TempoError::Config(_) => "CONFIG_ERROR",
            TempoError::InvalidValue { .. } => "INVALID_VALUE",
        }
    }
}

pub type Result<T> = std::result::Result<T, TempoError>;
