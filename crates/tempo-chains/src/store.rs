use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use rusqlite::{params, Connection, DatabaseName, OptionalExtension, TransactionBehavior};
use tempo_core::{LogLevel, TaskKind};
use tempo_cron::Schedule;
use tracing::{debug, info, instrument};

use crate::db::init_db;
use crate::error::{ChainError, Result};
use crate::types::{
    Chain, ExecutionRecord, NewJob, Parameter, Task, DEFAULT_ORDER_DELTA, FIRST_TASK_ORDER,
};

const CHAIN_COLUMNS: &str = "chain_id, chain_name, run_at, max_instances, timeout, live,
     self_destruct, exclusive_execution, client_name";

const TASK_COLUMNS: &str = "task_id, chain_id, task_order, task_name, kind, command, run_as,
     database_connection, ignore_error, autonomous, timeout";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Up,
    Down,
}

/// Chains, tasks and parameters over one SQLite connection.
///
/// Every mutating method runs in its own transaction, so other workers see
/// either all of its effects or none.
pub struct ChainStore {
    db: Mutex<Connection>,
}

impl ChainStore {
    /// Wrap `conn`, enabling foreign keys and creating the schema if needed.
    /// A read-only connection is used as is.
    pub fn new(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        if !conn.is_readonly(DatabaseName::Main)? {
            init_db(&conn)?;
        }
        Ok(Self {
            db: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.db.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // --- structural operations ---------------------------------------------

    /// Create a chain with one task (order 10) and its first parameter row,
    /// atomically. Returns the new chain id.
    #[instrument(skip(self, job), fields(name = %job.name))]
    pub fn create_job(&self, job: &NewJob) -> Result<i64> {
        if job.name.trim().is_empty() {
            return Err(ChainError::InvalidValue("chain name must not be empty".into()));
        }
        if let Some(schedule) = &job.schedule {
            Schedule::parse(schedule)?;
        }
        let params_json = job
            .parameters
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let mut db = self.conn();
        let tx = db.transaction_with_behavior(TransactionBehavior::Immediate)?;
        tx.execute(
            "INSERT INTO chain
             (chain_name, run_at, max_instances, timeout, live, self_destruct,
              exclusive_execution, client_name)
             VALUES (?1, ?2, ?3, 0, ?4, ?5, ?6, ?7)",
            params![
                job.name,
                job.schedule,
                job.max_instances,
                job.live,
                job.self_destruct,
                job.exclusive,
                job.client_name
            ],
        )?;
        let chain_id = tx.last_insert_rowid();

        tx.execute(
            "INSERT INTO task (chain_id, task_order, kind, command, ignore_error, autonomous)
             VALUES (?1, ?2, ?3, ?4, ?5, 1)",
            params![
                chain_id,
                FIRST_TASK_ORDER,
                job.kind.as_str(),
                job.command,
                job.ignore_errors
            ],
        )?;
        let task_id = tx.last_insert_rowid();

        tx.execute(
            "INSERT INTO parameter (task_id, order_id, value) VALUES (?1, 1, ?2)",
            params![task_id, params_json],
        )?;
        tx.commit()?;

        info!(chain_id, task_id, "job created");
        Ok(chain_id)
    }

    /// Add a task after `parent_task_id` using the default order gap.
    pub fn add_task(&self, kind: TaskKind, command: &str, parent_task_id: i64) -> Result<i64> {
        self.add_task_with_delta(kind, command, parent_task_id, DEFAULT_ORDER_DELTA)
    }

    /// Add a task to the parent's chain at `parent.task_order + order_delta`.
    ///
    /// Neighbours are never renumbered: if `order_delta` is at least the gap
    /// to the parent's successor, the new task lands after that successor.
    #[instrument(skip(self, command))]
    pub fn add_task_with_delta(
        &self,
        kind: TaskKind,
        command: &str,
        parent_task_id: i64,
        order_delta: f64,
    ) -> Result<i64> {
        if !order_delta.is_finite() {
            return Err(ChainError::InvalidValue(format!(
                "order delta must be finite, got {order_delta}"
            )));
        }
        let mut db = self.conn();
        let tx = db.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let (chain_id, parent_order): (Option<i64>, f64) = tx
            .query_row(
                "SELECT chain_id, task_order FROM task WHERE task_id = ?1",
                [parent_task_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?
            .ok_or_else(|| ChainError::task_not_found(parent_task_id))?;

        let task_order = parent_order + order_delta;
        let taken: bool = tx.query_row(
            "SELECT EXISTS (SELECT 1 FROM task WHERE chain_id = ?1 AND task_order = ?2)",
            params![chain_id, task_order],
            |row| row.get(0),
        )?;
        if taken {
            return Err(ChainError::InvalidValue(format!(
                "order {task_order} is already used in the chain of task {parent_task_id}"
            )));
        }

        tx.execute(
            "INSERT INTO task (chain_id, task_order, kind, command) VALUES (?1, ?2, ?3, ?4)",
            params![chain_id, task_order, kind.as_str(), command],
        )?;
        let task_id = tx.last_insert_rowid();
        tx.commit()?;
        debug!(task_id, "task added");
        Ok(task_id)
    }

    /// Swap order keys with the nearest preceding task of the same chain.
    /// Returns false when the task is already first.
    pub fn move_task_up(&self, task_id: i64) -> Result<bool> {
        self.swap_with_neighbour(task_id, Direction::Up)
    }

    /// Swap order keys with the nearest following task of the same chain.
    /// Returns false when the task is already last.
    pub fn move_task_down(&self, task_id: i64) -> Result<bool> {
        self.swap_with_neighbour(task_id, Direction::Down)
    }

    #[instrument(skip(self))]
    fn swap_with_neighbour(&self, task_id: i64, direction: Direction) -> Result<bool> {
        let mut db = self.conn();
        let tx = db.transaction()?;

        let (chain_id, order): (Option<i64>, f64) = tx
            .query_row(
                "SELECT chain_id, task_order FROM task WHERE task_id = ?1",
                [task_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?
            .ok_or_else(|| ChainError::task_not_found(task_id))?;

        // A detached task has no neighbours.
        let Some(chain_id) = chain_id else {
            return Ok(false);
        };

        let neighbour_sql = match direction {
            Direction::Up => {
                "SELECT task_id, task_order FROM task
                 WHERE chain_id = ?1 AND task_order < ?2
                 ORDER BY task_order DESC, task_id LIMIT 1"
            }
            Direction::Down => {
                "SELECT task_id, task_order FROM task
                 WHERE chain_id = ?1 AND task_order > ?2
                 ORDER BY task_order ASC, task_id LIMIT 1"
            }
        };
        let neighbour: Option<(i64, f64)> = tx
            .query_row(neighbour_sql, params![chain_id, order], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })
            .optional()?;

        let Some((neighbour_id, neighbour_order)) = neighbour else {
            return Ok(false);
        };

        tx.execute(
            "UPDATE task SET task_order = ?1 WHERE task_id = ?2",
            params![neighbour_order, task_id],
        )?;
        tx.execute(
            "UPDATE task SET task_order = ?1 WHERE task_id = ?2",
            params![order, neighbour_id],
        )?;
        tx.commit()?;

        debug!(task_id, neighbour_id, ?direction, "task order swapped");
        Ok(true)
    }

    /// Delete a chain by name together with its tasks and their parameters.
    #[instrument(skip(self))]
    pub fn delete_job(&self, name: &str) -> Result<bool> {
        let deleted = self
            .conn()
            .execute("DELETE FROM chain WHERE chain_name = ?1", [name])?;
        if deleted > 0 {
            info!("job deleted");
        }
        Ok(deleted > 0)
    }

    /// Delete a single task and its parameters.
    #[instrument(skip(self))]
    pub fn delete_task(&self, task_id: i64) -> Result<bool> {
        let deleted = self
            .conn()
            .execute("DELETE FROM task WHERE task_id = ?1", [task_id])?;
        Ok(deleted > 0)
    }

    /// Pause (`false`) or resume (`true`) scheduling of a chain.
    pub fn set_live(&self, name: &str, live: bool) -> Result<bool> {
        let updated = self.conn().execute(
            "UPDATE chain SET live = ?1 WHERE chain_name = ?2",
            params![live, name],
        )?;
        Ok(updated > 0)
    }

    /// Insert or replace the parameter at `order_id` (1-based).
    pub fn set_parameter(
        &self,
        task_id: i64,
        order_id: i64,
        value: Option<&serde_json::Value>,
    ) -> Result<()> {
        if order_id < 1 {
            return Err(ChainError::InvalidValue(format!(
                "parameter order must be positive, got {order_id}"
            )));
        }
        let json = value.map(serde_json::to_string).transpose()?;
        let db = self.conn();
        let exists: bool = db
            .query_row("SELECT 1 FROM task WHERE task_id = ?1", [task_id], |_| Ok(true))
            .optional()?
            .unwrap_or(false);
        if !exists {
            return Err(ChainError::task_not_found(task_id));
        }
        db.execute(
            "INSERT INTO parameter (task_id, order_id, value) VALUES (?1, ?2, ?3)
             ON CONFLICT (task_id, order_id) DO UPDATE SET value = excluded.value",
            params![task_id, order_id, json],
        )?;
        Ok(())
    }

    // --- reads -------------------------------------------------------------

    pub fn get_chain(&self, chain_id: i64) -> Result<Chain> {
        let sql = format!("SELECT {CHAIN_COLUMNS} FROM chain WHERE chain_id = ?1");
        self.conn()
            .query_row(&sql, [chain_id], row_to_chain)
            .optional()?
            .ok_or_else(|| ChainError::chain_not_found(chain_id))
    }

    pub fn chain_by_name(&self, name: &str) -> Result<Option<Chain>> {
        let sql = format!("SELECT {CHAIN_COLUMNS} FROM chain WHERE chain_name = ?1");
        Ok(self.conn().query_row(&sql, [name], row_to_chain).optional()?)
    }

    pub fn list_chains(&self) -> Result<Vec<Chain>> {
        let sql = format!("SELECT {CHAIN_COLUMNS} FROM chain ORDER BY chain_id");
        let db = self.conn();
        let mut stmt = db.prepare(&sql)?;
        let chains = stmt
            .query_map([], row_to_chain)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(chains)
    }

    /// Live chains this worker may run: no client affinity, or affinity to
    /// `client_name`.
    pub fn runnable_chains(&self, client_name: &str) -> Result<Vec<Chain>> {
        let sql = format!(
            "SELECT {CHAIN_COLUMNS} FROM chain
             WHERE live AND (client_name IS NULL OR client_name = ?1)
             ORDER BY chain_id"
        );
        let db = self.conn();
        let mut stmt = db.prepare_cached(&sql)?;
        let chains = stmt
            .query_map([client_name], row_to_chain)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(chains)
    }

    pub fn get_task(&self, task_id: i64) -> Result<Task> {
        let sql = format!("SELECT {TASK_COLUMNS} FROM task WHERE task_id = ?1");
        self.conn()
            .query_row(&sql, [task_id], row_to_task)
            .optional()?
            .ok_or_else(|| ChainError::task_not_found(task_id))
    }

    /// Tasks of a chain in execution order.
    pub fn tasks_for_chain(&self, chain_id: i64) -> Result<Vec<Task>> {
        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM task WHERE chain_id = ?1 ORDER BY task_order, task_id"
        );
        let db = self.conn();
        let mut stmt = db.prepare_cached(&sql)?;
        let tasks = stmt
            .query_map([chain_id], row_to_task)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tasks)
    }

    /// Parameters of a task ordered by `order_id`.
    pub fn parameters_for_task(&self, task_id: i64) -> Result<Vec<Parameter>> {
        let db = self.conn();
        let mut stmt = db.prepare_cached(
            "SELECT task_id, order_id, value FROM parameter
             WHERE task_id = ?1 ORDER BY order_id",
        )?;
        let params = stmt
            .query_map([task_id], row_to_parameter)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(params)
    }

    // --- audit sinks -------------------------------------------------------

    /// Append a row to the `log` table.
    pub fn log_message(
        &self,
        pid: i64,
        client_name: &str,
        level: LogLevel,
        message: &str,
        data: Option<&serde_json::Value>,
    ) -> Result<()> {
        let data = data.map(serde_json::to_string).transpose()?;
        self.conn().execute(
            "INSERT INTO log (ts, pid, client_name, log_level, message, message_data)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                Utc::now().to_rfc3339(),
                pid,
                client_name,
                level.as_str(),
                message,
                data
            ],
        )?;
        Ok(())
    }

    /// Append a row to the `execution_log` table.
    pub fn log_execution(&self, record: &ExecutionRecord) -> Result<()> {
        self.conn().execute(
            "INSERT INTO execution_log
             (chain_id, task_id, command, kind, last_run, finished, returncode, pid,
              output, client_name, ignore_error)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                record.chain_id,
                record.task_id,
                record.command,
                record.kind.as_str(),
                record.last_run,
                record.finished,
                record.returncode,
                record.pid,
                record.output,
                record.client_name,
                record.ignore_error
            ],
        )?;
        Ok(())
    }
}

fn row_to_chain(row: &rusqlite::Row<'_>) -> rusqlite::Result<Chain> {
    Ok(Chain {
        chain_id: row.get(0)?,
        chain_name: row.get(1)?,
        run_at: row.get(2)?,
        max_instances: row.get(3)?,
        timeout: row.get(4)?,
        live: row.get(5)?,
        self_destruct: row.get(6)?,
        exclusive_execution: row.get(7)?,
        client_name: row.get(8)?,
    })
}

fn row_to_task(row: &rusqlite::Row<'_>) -> rusqlite::Result<Task> {
    let kind: String = row.get(4)?;
    let kind = kind.parse::<TaskKind>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(Task {
        task_id: row.get(0)?,
        chain_id: row.get(1)?,
        task_order: row.get(2)?,
        task_name: row.get(3)?,
        kind,
        command: row.get(5)?,
        run_as: row.get(6)?,
        database_connection: row.get(7)?,
        ignore_error: row.get(8)?,
        autonomous: row.get(9)?,
        timeout: row.get(10)?,
    })
}

fn row_to_parameter(row: &rusqlite::Row<'_>) -> rusqlite::Result<Parameter> {
    let raw: Option<String> = row.get(2)?;
    let value = raw
        .map(|s| serde_json::from_str(&s))
        .transpose()
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
        })?;
    Ok(Parameter {
        task_id: row.get(0)?,
        order_id: row.get(1)?,
        value,
    })
}
