use serde::{Deserialize, Serialize};

/// A worker's claim on a client name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveSession {
    /// Process id of the worker on its own host.
    pub worker_pid: i64,
    pub client_name: String,
    /// Store-side connection identifier checked by the liveness oracle.
    pub connection_id: String,
    /// RFC3339.
    pub started_at: String,
}

/// Marker for a chain currently executing under a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveChain {
    pub chain_id: i64,
    pub client_name: String,
    pub exclusive: bool,
    /// RFC3339.
    pub started_at: String,
}

/// Execution limits checked before a chain is marked as started.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChainLimits {
    /// Maximum concurrent runs of the chain; `None` is unlimited.
    pub max_instances: Option<u32>,
    /// Run alone: nothing else may be active under the client meanwhile.
    pub exclusive: bool,
}
