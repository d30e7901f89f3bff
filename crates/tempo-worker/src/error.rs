use tempo_chains::ChainError;
use tempo_sessions::SessionError;
use thiserror::Error;

/// Errors raised while running chains.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error(transparent)]
    Chains(#[from] ChainError),

    #[error(transparent)]
    Sessions(#[from] SessionError),

    /// The executor ran the task and reported a non-zero return code.
    #[error("task exited with code {returncode}: {message}")]
    TaskFailed { returncode: i32, message: String },

    #[error("{what} timed out after {ms} ms")]
    Timeout { what: &'static str, ms: u64 },

    /// The executor cannot run this kind of task.
    #[error("unsupported task: {0}")]
    Unsupported(String),

    /// A STOP signal or shutdown interrupted the chain.
    #[error("chain {0} was stopped")]
    Stopped(i64),
}

pub type Result<T> = std::result::Result<T, WorkerError>;
