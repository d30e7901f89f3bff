use thiserror::Error;

/// Errors that can occur during lock coordination.
#[derive(Debug, Error)]
pub enum SessionError {
    /// A SQLite operation failed; the transaction has been rolled back.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The client name is empty or otherwise unusable.
    #[error("invalid client identity: {0:?}")]
    InvalidIdentity(String),

    /// Another live worker holds the client name. Callers back off and retry.
    #[error("client name {client_name:?} is held by another worker")]
    LockDenied { client_name: String },
}

pub type Result<T> = std::result::Result<T, SessionError>;
