use serde::{Deserialize, Serialize};
use tempo_core::TaskKind;

/// Order key given to the single task created by [`NewJob`].
pub const FIRST_TASK_ORDER: f64 = 10.0;
/// Default gap between a parent task and a task added after it.
pub const DEFAULT_ORDER_DELTA: f64 = 10.0;

/// A named, independently schedulable sequence of tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chain {
    pub chain_id: i64,
    /// Globally unique.
    pub chain_name: String,
    /// Schedule string; `None` means the chain only runs when notified.
    pub run_at: Option<String>,
    pub max_instances: Option<u32>,
    /// Milliseconds; 0 = unbounded.
    pub timeout: i64,
    /// False pauses scheduling without deleting the chain.
    pub live: bool,
    /// Delete the chain after its first successful run.
    pub self_destruct: bool,
    /// While running, no other chain may run on the same worker.
    pub exclusive_execution: bool,
    /// Restricts execution to the worker with this client name.
    pub client_name: Option<String>,
}

/// One ordered step of a chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub task_id: i64,
    /// `None` means the task is detached from any chain and never runs.
    pub chain_id: Option<i64>,
    pub task_order: f64,
    pub task_name: Option<String>,
    pub kind: TaskKind,
    pub command: String,
    pub run_as: Option<String>,
    /// Alternate connection string the command runs against.
    pub database_connection: Option<String>,
    /// Continue the chain when this task fails.
    pub ignore_error: bool,
    /// Run outside the chain's enclosing transaction.
    pub autonomous: bool,
    /// Milliseconds; 0 = unbounded.
    pub timeout: i64,
}

/// A positional argument set bound to a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub task_id: i64,
    /// 1-based.
    pub order_id: i64,
    pub value: Option<serde_json::Value>,
}

/// Input for [`ChainStore::create_job`](crate::ChainStore::create_job): a
/// chain with exactly one task.
///
/// Defaults: SQL kind, live, not self-destructing, errors ignored, not
/// exclusive, no instance limit and no client affinity.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub name: String,
    pub schedule: Option<String>,
    pub command: String,
    pub parameters: Option<serde_json::Value>,
    pub kind: TaskKind,
    pub client_name: Option<String>,
    pub max_instances: Option<u32>,
    pub live: bool,
    pub self_destruct: bool,
    pub ignore_errors: bool,
    pub exclusive: bool,
}

impl NewJob {
    pub fn new(
        name: impl Into<String>,
        schedule: Option<&str>,
        command: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            schedule: schedule.map(String::from),
            command: command.into(),
            parameters: None,
            kind: TaskKind::Sql,
            client_name: None,
            max_instances: None,
            live: true,
            self_destruct: false,
            ignore_errors: true,
            exclusive: false,
        }
    }

    pub fn parameters(mut self, value: serde_json::Value) -> Self {
        self.parameters = Some(value);
        self
    }

    pub fn kind(mut self, kind: TaskKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn client_name(mut self, client_name: impl Into<String>) -> Self {
        self.client_name = Some(client_name.into());
        self
    }

    pub fn max_instances(mut self, n: u32) -> Self {
        self.max_instances = Some(n);
        self
    }

    pub fn live(mut self, live: bool) -> Self {
        self.live = live;
        self
    }

    pub fn self_destruct(mut self, self_destruct: bool) -> Self {
        self.self_destruct = self_destruct;
        self
    }

    pub fn ignore_errors(mut self, ignore: bool) -> Self {
        self.ignore_errors = ignore;
        self
    }

    pub fn exclusive(mut self, exclusive: bool) -> Self {
        self.exclusive = exclusive;
        self
    }
}

/// One row of the execution audit log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub chain_id: i64,
    pub task_id: i64,
    pub command: String,
    pub kind: TaskKind,
    /// RFC3339 start time.
    pub last_run: String,
    /// RFC3339 end time.
    pub finished: String,
    pub returncode: i32,
    pub pid: i64,
    pub output: Option<String>,
    pub client_name: String,
    pub ignore_error: bool,
}
