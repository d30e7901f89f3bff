use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Well-formed JSON that is not a usable chain signal.
    #[error("invalid chain signal: {0}")]
    InvalidSignal(String),
}

pub type Result<T> = std::result::Result<T, NotifyError>;
