use chrono::{Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::Result;

/// Answers whether a store-side connection is still open.
///
/// Called inside the coordinator's transaction, so implementations that read
/// the store see the same snapshot as the pruning statements.
pub trait LivenessOracle: Send + Sync {
    fn is_alive(&self, conn: &Connection, connection_id: &str) -> Result<bool>;
}

/// Lease-based liveness: a connection is alive while its row in
/// `connection_heartbeat` is at most `ttl` old.
///
/// Every coordinator refreshes its own row on [`LockCoordinator::heartbeat`]
/// and on each acquisition attempt, so the worker loop's tick interval must
/// stay well below the TTL.
///
/// [`LockCoordinator::heartbeat`]: crate::LockCoordinator::heartbeat
#[derive(Debug, Clone, Copy)]
pub struct HeartbeatOracle {
    ttl: Duration,
}

impl HeartbeatOracle {
    pub const DEFAULT_TTL_SECS: i64 = 30;

    pub fn new(ttl: Duration) -> Self {
        Self { ttl }
    }

    pub fn from_secs(secs: u64) -> Self {
        let ttl = i64::try_from(secs)
            .ok()
            .and_then(Duration::try_seconds)
            .unwrap_or(Duration::MAX);
        Self::new(ttl)
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

impl Default for HeartbeatOracle {
    fn default() -> Self {
        Self::new(Duration::seconds(Self::DEFAULT_TTL_SECS))
    }
}

impl LivenessOracle for HeartbeatOracle {
    fn is_alive(&self, conn: &Connection, connection_id: &str) -> Result<bool> {
        let beat: Option<i64> = conn
            .query_row(
                "SELECT heartbeat_at FROM connection_heartbeat WHERE connection_id = ?1",
                [connection_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(match beat {
            Some(at) => Utc::now().timestamp_millis() - at <= self.ttl.num_milliseconds(),
            None => false,
        })
    }
}

/// Refresh the heartbeat row for `connection_id`.
pub(crate) fn touch(conn: &Connection, connection_id: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO connection_heartbeat (connection_id, heartbeat_at) VALUES (?1, ?2)
         ON CONFLICT (connection_id) DO UPDATE SET heartbeat_at = excluded.heartbeat_at",
        params![connection_id, Utc::now().timestamp_millis()],
    )?;
    Ok(())
}
