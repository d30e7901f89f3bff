use thiserror::Error;

/// Errors produced while parsing schedule strings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CronError {
    /// The string (or one of its fields) matches none of the grammar forms.
    #[error("invalid schedule format: {0}")]
    Format(String),

    /// A value resolved from a field lies outside that field's domain.
    #[error("{field} is out of range: {token:?} (allowed {min}-{max})")]
    Range {
        field: &'static str,
        token: String,
        min: u32,
        max: u32,
    },
}

pub type Result<T> = std::result::Result<T, CronError>;
