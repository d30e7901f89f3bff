use rusqlite::Connection;

use crate::error::Result;

/// Initialise the coordination tables.
///
/// Safe to call on every startup; uses `IF NOT EXISTS` throughout.
/// `active_session` has no uniqueness on `client_name`: stale
/// claims are resolved by liveness, not by overwrite.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS active_session (
            worker_pid    INTEGER NOT NULL,
            client_name   TEXT    NOT NULL,
            connection_id TEXT    NOT NULL,
            started_at    TEXT    NOT NULL,
            UNIQUE (worker_pid, client_name, connection_id)
        );
        CREATE INDEX IF NOT EXISTS idx_active_session_client
            ON active_session(client_name);

        CREATE TABLE IF NOT EXISTS active_chain (
            chain_id    INTEGER NOT NULL,
            client_name TEXT    NOT NULL,
            exclusive   INTEGER NOT NULL DEFAULT 0,
            started_at  TEXT    NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_active_chain_client
            ON active_chain(client_name, chain_id);

        CREATE TABLE IF NOT EXISTS connection_heartbeat (
            connection_id TEXT    PRIMARY KEY,
            heartbeat_at  INTEGER NOT NULL    -- unix epoch milliseconds
        );",
    )?;
    Ok(())
}
