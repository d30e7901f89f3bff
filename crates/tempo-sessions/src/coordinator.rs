use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use rusqlite::{params, Connection, DatabaseName, TransactionBehavior};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::db::init_db;
use crate::error::{Result, SessionError};
use crate::liveness::{touch, HeartbeatOracle, LivenessOracle};
use crate::types::{ActiveChain, ActiveSession, ChainLimits};

/// Arbitrates client-name ownership and running-chain markers for one worker
/// connection.
///
/// All state lives in the shared store; every operation is one transaction.
/// The `Mutex` only shares the connection between threads of this process.
pub struct LockCoordinator<O = HeartbeatOracle> {
    db: Mutex<Connection>,
    connection_id: String,
    oracle: O,
}

impl LockCoordinator<HeartbeatOracle> {
    /// Coordinator using heartbeat leases with the given TTL.
    pub fn with_heartbeat(conn: Connection, ttl_secs: u64) -> Result<Self> {
        Self::new(conn, HeartbeatOracle::from_secs(ttl_secs))
    }
}

impl<O: LivenessOracle> LockCoordinator<O> {
    /// Wrap `conn`, creating the coordination tables unless the store is
    /// read-only.
    pub fn new(conn: Connection, oracle: O) -> Result<Self> {
        if !is_read_only(&conn)? {
            init_db(&conn)?;
        }
        let connection_id = Uuid::new_v4().to_string();
        debug!(%connection_id, "coordinator connection registered");
        Ok(Self {
            db: Mutex::new(conn),
            connection_id,
            oracle,
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.db.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Identifier the liveness oracle knows this coordinator by.
    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    /// Refresh this connection's lease while it still holds `client_name`.
    ///
    /// Returns `Ok(false)`, leaving the lease untouched, once the claim is
    /// gone: another worker pruned it after this lease expired, or the store
    /// is read-only. The caller must stop scheduling and re-acquire.
    #[instrument(skip(self), fields(connection_id = %self.connection_id))]
    pub fn heartbeat(&self, client_name: &str) -> Result<bool> {
        let client_name = validate_identity(client_name)?;
        let mut db = self.conn();
        if is_read_only(&db)? {
            return Ok(false);
        }
        let tx = db.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let held: bool = tx.query_row(
            "SELECT EXISTS (SELECT 1 FROM active_session
                            WHERE client_name = ?1 AND connection_id = ?2)",
            params![client_name, self.connection_id],
            |row| row.get(0),
        )?;
        if !held {
            info!(client_name, "client name no longer held by this connection");
            return Ok(false);
        }
        touch(&tx, &self.connection_id)?;
        tx.commit()?;
        Ok(true)
    }

    /// Try to claim `client_name` for the worker process `worker_pid`.
    ///
    /// Returns `Ok(false)` without side effects on a read-only store, and
    /// `Ok(false)` after pruning when another live worker holds the name.
    /// Claims of dead connections and the chain markers of client names left
    /// without a session are removed first.
    #[instrument(skip(self), fields(connection_id = %self.connection_id))]
    pub fn try_acquire(&self, worker_pid: i64, client_name: &str) -> Result<bool> {
        let client_name = validate_identity(client_name)?;
        let mut db = self.conn();
        if is_read_only(&db)? {
            debug!("store is read-only, not acquiring");
            return Ok(false);
        }

        let tx = db.transaction_with_behavior(TransactionBehavior::Immediate)?;
        touch(&tx, &self.connection_id)?;

        let connections: Vec<String> = {
            let mut stmt = tx.prepare("SELECT DISTINCT connection_id FROM active_session")?;
            let rows = stmt.query_map([], |row| row.get(0))?;
            rows.collect::<rusqlite::Result<_>>()?
        };
        for connection_id in connections {
            if self.oracle.is_alive(&tx, &connection_id)? {
                continue;
            }
            let pruned = tx.execute(
                "DELETE FROM active_session WHERE connection_id = ?1",
                [&connection_id],
            )?;
            tx.execute(
                "DELETE FROM connection_heartbeat WHERE connection_id = ?1",
                [&connection_id],
            )?;
            info!(%connection_id, pruned, "removed sessions of dead connection");
        }

        let orphans = tx.execute(
            "DELETE FROM active_chain
             WHERE client_name NOT IN (SELECT client_name FROM active_session)",
            [],
        )?;
        if orphans > 0 {
            info!(orphans, "removed chain markers without a session");
        }

        let held_elsewhere: bool = tx.query_row(
            "SELECT EXISTS (SELECT 1 FROM active_session
                            WHERE client_name = ?1 AND worker_pid <> ?2)",
            params![client_name, worker_pid],
            |row| row.get(0),
        )?;
        if held_elsewhere {
            tx.commit()?;
            debug!(client_name, "client name held by a live worker");
            return Ok(false);
        }

        tx.execute(
            "INSERT OR IGNORE INTO active_session
             (worker_pid, client_name, connection_id, started_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                worker_pid,
                client_name,
                self.connection_id,
                Utc::now().to_rfc3339()
            ],
        )?;
        tx.commit()?;
        info!(client_name, worker_pid, "client name acquired");
        Ok(true)
    }

    /// [`try_acquire`](Self::try_acquire), mapping a refusal to
    /// [`SessionError::LockDenied`].
    pub fn acquire(&self, worker_pid: i64, client_name: &str) -> Result<()> {
        if self.try_acquire(worker_pid, client_name)? {
            Ok(())
        } else {
            Err(SessionError::LockDenied {
                client_name: client_name.to_string(),
            })
        }
    }

    /// Sessions currently recorded, optionally for one client name.
    pub fn sessions(&self, client_name: Option<&str>) -> Result<Vec<ActiveSession>> {
        let db = self.conn();
        let mut stmt = db.prepare(
            "SELECT worker_pid, client_name, connection_id, started_at
             FROM active_session
             WHERE ?1 IS NULL OR client_name = ?1
             ORDER BY started_at, worker_pid",
        )?;
        let rows = stmt.query_map([client_name], |row| {
            Ok(ActiveSession {
                worker_pid: row.get(0)?,
                client_name: row.get(1)?,
                connection_id: row.get(2)?,
                started_at: row.get(3)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    /// Chains marked as running, optionally for one client name.
    pub fn active_chains(&self, client_name: Option<&str>) -> Result<Vec<ActiveChain>> {
        let db = self.conn();
        let mut stmt = db.prepare(
            "SELECT chain_id, client_name, exclusive, started_at
             FROM active_chain
             WHERE ?1 IS NULL OR client_name = ?1
             ORDER BY rowid",
        )?;
        let rows = stmt.query_map([client_name], |row| {
            Ok(ActiveChain {
                chain_id: row.get(0)?,
                client_name: row.get(1)?,
                exclusive: row.get(2)?,
                started_at: row.get(3)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    /// Mark `chain_id` as running under `client_name` if `limits` allow it.
    ///
    /// Refused (`Ok(false)`) while an exclusive chain runs under the client,
    /// when an exclusive chain would start next to running ones, or when the
    /// chain already has `max_instances` runs.
    #[instrument(skip(self))]
    pub fn register_chain_start(
        &self,
        chain_id: i64,
        client_name: &str,
        limits: ChainLimits,
    ) -> Result<bool> {
        let client_name = validate_identity(client_name)?;
        let mut db = self.conn();
        let tx = db.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let (running, exclusive_running, same_chain): (i64, bool, i64) = tx.query_row(
            "SELECT COUNT(*),
                    COALESCE(MAX(exclusive), 0),
                    COALESCE(SUM(chain_id = ?2), 0)
             FROM active_chain WHERE client_name = ?1",
            params![client_name, chain_id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;

        let refused = exclusive_running
            || (limits.exclusive && running > 0)
            || limits
                .max_instances
                .is_some_and(|max| same_chain >= i64::from(max));
        if refused {
            debug!(running, same_chain, exclusive_running, "chain start refused");
            return Ok(false);
        }

        tx.execute(
            "INSERT INTO active_chain (chain_id, client_name, exclusive, started_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                chain_id,
                client_name,
                limits.exclusive,
                Utc::now().to_rfc3339()
            ],
        )?;
        tx.commit()?;
        Ok(true)
    }

    /// Remove one running marker of `chain_id` under `client_name`.
    pub fn register_chain_end(&self, chain_id: i64, client_name: &str) -> Result<bool> {
        let removed = self.conn().execute(
            "DELETE FROM active_chain WHERE rowid = (
                SELECT rowid FROM active_chain
                WHERE chain_id = ?1 AND client_name = ?2
                ORDER BY rowid LIMIT 1)",
            params![chain_id, client_name],
        )?;
        Ok(removed > 0)
    }

    /// Drop this connection's claims, its lease and the chain markers they
    /// leave orphaned. Used on orderly shutdown.
    #[instrument(skip(self), fields(connection_id = %self.connection_id))]
    pub fn release(&self) -> Result<()> {
        let mut db = self.conn();
        if is_read_only(&db)? {
            return Ok(());
        }
        let tx = db.transaction()?;
        tx.execute(
            "DELETE FROM active_session WHERE connection_id = ?1",
            [&self.connection_id],
        )?;
        tx.execute(
            "DELETE FROM connection_heartbeat WHERE connection_id = ?1",
            [&self.connection_id],
        )?;
        tx.execute(
            "DELETE FROM active_chain
             WHERE client_name NOT IN (SELECT client_name FROM active_session)",
            [],
        )?;
        tx.commit()?;
        info!("sessions released");
        Ok(())
    }
}

fn validate_identity(client_name: &str) -> Result<&str> {
    if client_name.trim().is_empty() {
        return Err(SessionError::InvalidIdentity(client_name.to_string()));
    }
    Ok(client_name)
}

/// True for connections opened read-only and for `PRAGMA query_only = ON`.
fn is_read_only(conn: &Connection) -> Result<bool> {
    if conn.is_readonly(DatabaseName::Main)? {
        return Ok(true);
    }
    let query_only: bool = conn.query_row("PRAGMA query_only", [], |row| row.get(0))?;
    Ok(query_only)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::path::Path;
    use std::sync::Arc;

    /// Oracle driven by the test: every connection is alive until killed.
    #[derive(Clone, Default)]
    struct Obituaries(Arc<Mutex<HashSet<String>>>);

    impl Obituaries {
        fn kill(&self, connection_id: &str) {
            self.0.lock().unwrap().insert(connection_id.to_string());
        }
    }

    impl LivenessOracle for Obituaries {
        fn is_alive(&self, _conn: &Connection, connection_id: &str) -> Result<bool> {
            Ok(!self.0.lock().unwrap().contains(connection_id))
        }
    }

    fn open(path: &Path) -> Connection {
        let conn = Connection::open(path).unwrap();
        conn.busy_timeout(std::time::Duration::from_secs(5)).unwrap();
        conn
    }

    #[test]
    fn second_worker_waits_for_first_to_die() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tempo.db");
        let deaths = Obituaries::default();

        let first = LockCoordinator::new(open(&path), deaths.clone()).unwrap();
        let second = LockCoordinator::new(open(&path), deaths.clone()).unwrap();

        assert!(first.try_acquire(1, "w").unwrap());
        assert!(first
            .register_chain_start(7, "w", ChainLimits::default())
            .unwrap());

        assert!(!second.try_acquire(2, "w").unwrap());
        assert!(matches!(
            second.acquire(2, "w"),
            Err(SessionError::LockDenied { .. })
        ));

        deaths.kill(first.connection_id());
        assert!(second.try_acquire(2, "w").unwrap());

        let sessions = second.sessions(Some("w")).unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].worker_pid, 2);
        assert_eq!(sessions[0].connection_id, second.connection_id());
        assert!(second.active_chains(None).unwrap().is_empty());
    }

    #[test]
    fn reacquire_by_same_worker_is_idempotent() {
        let coord = LockCoordinator::new(Connection::open_in_memory().unwrap(), Obituaries::default())
            .unwrap();
        assert!(coord.try_acquire(1, "w").unwrap());
        assert!(coord.try_acquire(1, "w").unwrap());
        assert_eq!(coord.sessions(None).unwrap().len(), 1);
        // A different client name is independent.
        assert!(coord.try_acquire(2, "other").unwrap());
    }

    #[test]
    fn blank_client_name_is_rejected() {
        let coord = LockCoordinator::new(Connection::open_in_memory().unwrap(), Obituaries::default())
            .unwrap();
        for name in ["", "   ", "\t"] {
            assert!(matches!(
                coord.try_acquire(1, name),
                Err(SessionError::InvalidIdentity(_))
            ));
        }
    }

    #[test]
    fn read_only_store_never_acquires() {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        conn.execute_batch("PRAGMA query_only = ON;").unwrap();
        let coord = LockCoordinator::new(conn, Obituaries::default()).unwrap();

        assert!(!coord.try_acquire(1, "w").unwrap());
        assert!(coord.sessions(None).unwrap().is_empty());
        assert!(!coord.heartbeat("w").unwrap());
    }

    #[test]
    fn stale_heartbeat_is_pruned() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tempo.db");

        let first = LockCoordinator::with_heartbeat(open(&path), 30).unwrap();
        let second = LockCoordinator::with_heartbeat(open(&path), 30).unwrap();
        assert!(first.try_acquire(1, "w").unwrap());
        assert!(first.heartbeat("w").unwrap());
        assert!(!second.try_acquire(2, "w").unwrap());

        // The first worker stops beating.
        open(&path)
            .execute(
                "UPDATE connection_heartbeat SET heartbeat_at = heartbeat_at - 120000
                 WHERE connection_id = ?1",
                [first.connection_id()],
            )
            .unwrap();
        assert!(second.try_acquire(2, "w").unwrap());
        assert_eq!(second.sessions(Some("w")).unwrap()[0].worker_pid, 2);

        // The stalled worker wakes up and finds its claim gone.
        assert!(!first.heartbeat("w").unwrap());
        assert!(!first.try_acquire(1, "w").unwrap());
        assert!(second.heartbeat("w").unwrap());
        assert_eq!(second.sessions(Some("w")).unwrap().len(), 1);
    }

    #[test]
    fn heartbeat_requires_a_claim() {
        let coord = LockCoordinator::new(Connection::open_in_memory().unwrap(), Obituaries::default())
            .unwrap();
        assert!(!coord.heartbeat("w").unwrap());
        coord.try_acquire(1, "w").unwrap();
        assert!(coord.heartbeat("w").unwrap());
        assert!(!coord.heartbeat("other").unwrap());
    }

    #[test]
    fn chain_limits_are_enforced() {
        let coord = LockCoordinator::new(Connection::open_in_memory().unwrap(), Obituaries::default())
            .unwrap();
        coord.try_acquire(1, "w").unwrap();
        let twice = ChainLimits {
            max_instances: Some(2),
            exclusive: false,
        };

        assert!(coord.register_chain_start(1, "w", twice).unwrap());
        assert!(coord.register_chain_start(1, "w", twice).unwrap());
        assert!(!coord.register_chain_start(1, "w", twice).unwrap());
        assert!(coord.register_chain_start(2, "w", ChainLimits::default()).unwrap());

        let alone = ChainLimits {
            max_instances: None,
            exclusive: true,
        };
        assert!(!coord.register_chain_start(3, "w", alone).unwrap());

        assert!(coord.register_chain_end(1, "w").unwrap());
        assert!(coord.register_chain_end(1, "w").unwrap());
        assert!(coord.register_chain_end(2, "w").unwrap());
        assert!(!coord.register_chain_end(2, "w").unwrap());

        assert!(coord.register_chain_start(3, "w", alone).unwrap());
        assert!(!coord.register_chain_start(4, "w", ChainLimits::default()).unwrap());
        assert_eq!(coord.active_chains(Some("w")).unwrap().len(), 1);
    }

    #[test]
    fn release_clears_own_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tempo.db");
        let first = LockCoordinator::with_heartbeat(open(&path), 30).unwrap();
        let second = LockCoordinator::with_heartbeat(open(&path), 30).unwrap();

        first.try_acquire(1, "w").unwrap();
        first
            .register_chain_start(9, "w", ChainLimits::default())
            .unwrap();
        first.release().unwrap();

        assert!(first.sessions(None).unwrap().is_empty());
        assert!(first.active_chains(None).unwrap().is_empty());
        assert!(second.try_acquire(2, "w").unwrap());
    }
}
