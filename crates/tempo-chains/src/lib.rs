//! `tempo-chains`: persistent chains, their ordered tasks and task
//! parameters.
//!
//! # Ordering
//!
//! Tasks inside a chain are ordered by a floating-point `task_order` key,
//! unique within the chain. Keys are sparse: [`ChainStore::add_task`]
//! places a task at `parent + delta` without renumbering its neighbours
//! (refusing a key another task of the chain already has), and
//! [`ChainStore::move_task_up`] / [`ChainStore::move_task_down`] swap keys with
//! the nearest neighbour only. Repeatedly inserting between the same two
//! tasks halves the gap each time, so precision runs out after ~50 nested
//! insertions; callers pick deltas that leave room.

pub mod builtin;
pub mod db;
pub mod error;
pub mod plan;
pub mod store;
pub mod types;

pub use builtin::{parameter_schema, Builtin};
pub use error::{ChainError, Result};
pub use plan::{ChainPlan, PlannedTask};
pub use store::ChainStore;
pub use types::{
    Chain, ExecutionRecord, NewJob, Parameter, Task, DEFAULT_ORDER_DELTA,
    FIRST_TASK_ORDER,
};
