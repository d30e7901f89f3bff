use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::builtin::parameter_schema;
use crate::error::{ChainError, Result};
use crate::store::ChainStore;
use crate::types::{Chain, Task};

/// A task ready to hand to an executor, with its non-null parameters in
/// `order_id` order. An empty `params` means the task runs once without
/// arguments.
#[derive(Debug, Clone, Serialize)]
pub struct PlannedTask {
    pub task: Task,
    pub params: Vec<Value>,
}

/// Snapshot of a chain and its tasks in execution order, with every
/// parameter validated against its task's schema.
#[derive(Debug, Clone, Serialize)]
pub struct ChainPlan {
    pub chain: Chain,
    pub tasks: Vec<PlannedTask>,
}

impl ChainPlan {
    pub fn build(store: &ChainStore, chain_id: i64) -> Result<Self> {
        let chain = store.get_chain(chain_id)?;
        let tasks = store
            .tasks_for_chain(chain_id)?
            .into_iter()
            .map(|task| plan_task(store, task))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { chain, tasks })
    }
}

fn plan_task(store: &ChainStore, task: Task) -> Result<PlannedTask> {
    let schema = parameter_schema(task.kind, &task.command)?;
    let mut params = Vec::new();
    for param in store.parameters_for_task(task.task_id)? {
        let Some(value) = param.value else {
            continue;
        };
        if !tempo_schema::validate(&schema, &value)? {
            warn!(task_id = task.task_id, order_id = param.order_id, "parameter rejected");
            return Err(ChainError::InvalidParameters {
                task_id: task.task_id,
                order_id: param.order_id,
                command: task.command.clone(),
            });
        }
        params.push(value);
    }
    Ok(PlannedTask { task, params })
}

impl ChainStore {
    /// Shorthand for [`ChainPlan::build`].
    pub fn plan_chain(&self, chain_id: i64) -> Result<ChainPlan> {
        ChainPlan::build(self, chain_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NewJob;
    use rusqlite::Connection;
    use serde_json::json;
    use tempo_core::TaskKind;

    fn store() -> ChainStore {
        ChainStore::new(Connection::open_in_memory().unwrap()).unwrap()
    }

    #[test]
    fn plan_keeps_task_order_and_skips_null_parameters() {
        let store = store();
        let chain_id = store
            .create_job(&NewJob::new("etl", Some("*/5 * * * *"), "SELECT $1").parameters(json!([1])))
            .unwrap();
        let first = store.tasks_for_chain(chain_id).unwrap()[0].task_id;
        let second = store.add_task(TaskKind::Program, "gzip", first).unwrap();
        store.set_parameter(second, 1, None).unwrap();
        store.set_parameter(second, 2, Some(&json!(["-9", "dump.sql"]))).unwrap();
        let between = store
            .add_task_with_delta(TaskKind::Builtin, "NoOp", first, 1.0)
            .unwrap();

        let plan = store.plan_chain(chain_id).unwrap();
        assert_eq!(plan.chain.chain_name, "etl");
        let ids: Vec<_> = plan.tasks.iter().map(|t| t.task.task_id).collect();
        assert_eq!(ids, vec![first, between, second]);
        assert_eq!(plan.tasks[0].params, vec![json!([1])]);
        assert!(plan.tasks[1].params.is_empty());
        assert_eq!(plan.tasks[2].params, vec![json!(["-9", "dump.sql"])]);
    }

    #[test]
    fn invalid_parameter_names_task_and_position() {
        let store = store();
        let chain_id = store
            .create_job(
                &NewJob::new("nap", None, "Sleep")
                    .kind(TaskKind::Builtin)
                    .parameters(json!("ten")),
            )
            .unwrap();
        let task_id = store.tasks_for_chain(chain_id).unwrap()[0].task_id;

        match ChainPlan::build(&store, chain_id) {
            Err(ChainError::InvalidParameters {
                task_id: t,
                order_id,
                command,
            }) => {
                assert_eq!(t, task_id);
                assert_eq!(order_id, 1);
                assert_eq!(command, "Sleep");
            }
            other => panic!("expected InvalidParameters, got {other:?}"),
        }
    }

    #[test]
    fn unknown_builtin_fails_planning() {
        let store = store();
        let chain_id = store
            .create_job(&NewJob::new("x", None, "Teleport").kind(TaskKind::Builtin))
            .unwrap();
        assert!(matches!(
            store.plan_chain(chain_id),
            Err(ChainError::UnknownBuiltin(_))
        ));
    }

    #[test]
    fn missing_chain_is_not_found() {
        assert!(matches!(
            store().plan_chain(77),
            Err(ChainError::NotFound { entity: "chain", .. })
        ));
    }
}
