use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tempo_chains::{Builtin, Chain, Task};
use tempo_core::TaskKind;
use tokio::sync::watch;
use tracing::info;

use crate::error::{Result, WorkerError};

/// Result of one task invocation. A non-zero `returncode` is a failure.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TaskOutput {
    pub returncode: i32,
    pub output: Option<String>,
}

impl TaskOutput {
    pub fn ok() -> Self {
        Self::default()
    }
}

/// Runs a single task once with one parameter value (or none).
#[async_trait]
pub trait Executor: Send + Sync + 'static {
    async fn execute(&self, chain: &Chain, task: &Task, param: Option<&Value>)
        -> Result<TaskOutput>;
}

/// Logs what would run and reports success.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunExecutor;

#[async_trait]
impl Executor for DryRunExecutor {
    async fn execute(
        &self,
        chain: &Chain,
        task: &Task,
        param: Option<&Value>,
    ) -> Result<TaskOutput> {
        info!(
            chain = %chain.chain_name,
            task_id = task.task_id,
            kind = %task.kind,
            command = %task.command,
            param = ?param,
            "dry run"
        );
        Ok(TaskOutput {
            returncode: 0,
            output: Some("dry run".to_string()),
        })
    }
}

/// Runs the built-in routines that need nothing outside the worker:
/// `NoOp`, `Log`, `Sleep` and `Shutdown`. Everything else is refused.
pub struct BuiltinExecutor {
    shutdown: watch::Sender<bool>,
}

impl BuiltinExecutor {
    /// `shutdown` is set to `true` by the `Shutdown` routine.
    pub fn new(shutdown: watch::Sender<bool>) -> Self {
        Self { shutdown }
    }
}

#[async_trait]
impl Executor for BuiltinExecutor {
    async fn execute(
        &self,
        chain: &Chain,
        task: &Task,
        param: Option<&Value>,
    ) -> Result<TaskOutput> {
        if task.kind != TaskKind::Builtin {
            return Err(WorkerError::Unsupported(format!(
                "{} task {:?}",
                task.kind, task.command
            )));
        }
        match task.command.parse::<Builtin>()? {
            Builtin::NoOp => Ok(TaskOutput::ok()),
            Builtin::Log => {
                let message = param.map(Value::to_string).unwrap_or_default();
                info!(chain = %chain.chain_name, task_id = task.task_id, %message, "Log");
                Ok(TaskOutput {
                    returncode: 0,
                    output: Some(message),
                })
            }
            Builtin::Sleep => {
                let secs = param.and_then(Value::as_u64).unwrap_or(0);
                tokio::time::sleep(Duration::from_secs(secs)).await;
                Ok(TaskOutput::ok())
            }
            Builtin::Shutdown => {
                info!(chain = %chain.chain_name, "shutdown requested by task");
                self.shutdown.send_replace(true);
                Ok(TaskOutput::ok())
            }
            other => Err(WorkerError::Unsupported(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn chain() -> Chain {
        Chain {
            chain_id: 1,
            chain_name: "c".into(),
            run_at: None,
            max_instances: None,
            timeout: 0,
            live: true,
            self_destruct: false,
            exclusive_execution: false,
            client_name: None,
        }
    }

    fn task(kind: TaskKind, command: &str) -> Task {
        Task {
            task_id: 1,
            chain_id: Some(1),
            task_order: 10.0,
            task_name: None,
            kind,
            command: command.into(),
            run_as: None,
            database_connection: None,
            ignore_error: false,
            autonomous: false,
            timeout: 0,
        }
    }

    #[tokio::test]
    async fn dry_run_always_succeeds() {
        let out = DryRunExecutor
            .execute(&chain(), &task(TaskKind::Sql, "DROP TABLE x"), Some(&json!([1])))
            .await
            .unwrap();
        assert_eq!(out.returncode, 0);
    }

    #[tokio::test]
    async fn builtins_run_in_process() {
        let (tx, rx) = watch::channel(false);
        let exec = BuiltinExecutor::new(tx);

        let out = exec
            .execute(&chain(), &task(TaskKind::Builtin, "Log"), Some(&json!("hi")))
            .await
            .unwrap();
        assert_eq!(out.output.as_deref(), Some("\"hi\""));

        exec.execute(&chain(), &task(TaskKind::Builtin, "Sleep"), Some(&json!(0)))
            .await
            .unwrap();
        assert!(!*rx.borrow());

        exec.execute(&chain(), &task(TaskKind::Builtin, "Shutdown"), None)
            .await
            .unwrap();
        assert!(*rx.borrow());
    }

    #[tokio::test]
    async fn builtin_executor_refuses_external_work() {
        let (tx, _rx) = watch::channel(false);
        let exec = BuiltinExecutor::new(tx);
        for t in [
            task(TaskKind::Sql, "SELECT 1"),
            task(TaskKind::Program, "ls"),
            task(TaskKind::Builtin, "SendMail"),
        ] {
            assert!(matches!(
                exec.execute(&chain(), &t, None).await,
                Err(WorkerError::Unsupported(_))
            ));
        }
        assert!(matches!(
            exec.execute(&chain(), &task(TaskKind::Builtin, "Warp"), None).await,
            Err(WorkerError::Chains(_))
        ));
    }
}
