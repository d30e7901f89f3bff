//! `tempo-sessions`: which worker owns which client name, and which chains
//! are running.
//!
//! Workers on different hosts share one SQLite file. A worker claims its
//! client name with [`LockCoordinator::try_acquire`]; claims left behind by
//! crashed workers are pruned using a [`LivenessOracle`], by default a
//! heartbeat lease ([`HeartbeatOracle`]).

pub mod coordinator;
pub mod db;
pub mod error;
pub mod liveness;
pub mod types;

pub use coordinator::LockCoordinator;
pub use error::{Result, SessionError};
pub use liveness::{HeartbeatOracle, LivenessOracle};
pub use types::{ActiveChain, ActiveSession, ChainLimits};
