use tempo_cron::CronError;
use tempo_schema::SchemaError;
use thiserror::Error;

/// Errors that can occur within the chain store.
#[derive(Debug, Error)]
pub enum ChainError {
    /// Underlying SQLite / rusqlite error. The surrounding transaction has
    /// been rolled back.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A referenced chain or task does not exist.
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    /// The chain's `run_at` string is not a valid schedule.
    #[error("Invalid schedule: {0}")]
    Schedule(#[from] CronError),

    /// A parameter schema could not be interpreted.
    #[error("Parameter schema error: {0}")]
    Schema(#[from] SchemaError),

    /// Stored parameters do not satisfy the task's schema.
    #[error("Parameter {order_id} of task {task_id} is not valid for {command}")]
    InvalidParameters {
        task_id: i64,
        order_id: i64,
        command: String,
    },

    /// A BUILTIN task names a routine the worker does not provide.
    #[error("Unknown built-in routine: {0}")]
    UnknownBuiltin(String),

    /// An argument violates a structural rule (e.g. non-positive order id).
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ChainError {
    pub(crate) fn chain_not_found(key: impl ToString) -> Self {
        ChainError::NotFound {
            entity: "chain",
            key: key.to_string(),
        }
    }

    pub(crate) fn task_not_found(task_id: i64) -> Self {
        ChainError::NotFound {
            entity: "task",
            key: task_id.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ChainError>;
