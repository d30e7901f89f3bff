use rusqlite::Connection;

use crate::error::Result;

/// Initialise the chain, task, parameter and log tables.
///
/// Idempotent. Cascading deletes need `PRAGMA foreign_keys = ON` on every
/// connection that deletes rows; [`ChainStore::new`](crate::ChainStore::new)
/// enables it for its own connection.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS chain (
            chain_id            INTEGER PRIMARY KEY AUTOINCREMENT,
            chain_name          TEXT    NOT NULL UNIQUE,
            run_at              TEXT,               -- schedule string or NULL
            max_instances       INTEGER CHECK (max_instances IS NULL OR max_instances > 0),
            timeout             INTEGER NOT NULL DEFAULT 0,   -- ms, 0 = unbounded
            live                INTEGER NOT NULL DEFAULT 0,
            self_destruct       INTEGER NOT NULL DEFAULT 0,
            exclusive_execution INTEGER NOT NULL DEFAULT 0,
            client_name         TEXT
        );

        CREATE TABLE IF NOT EXISTS task (
            task_id             INTEGER PRIMARY KEY AUTOINCREMENT,
            chain_id            INTEGER REFERENCES chain (chain_id)
                                    ON UPDATE CASCADE ON DELETE CASCADE,
            task_order          REAL    NOT NULL,
            task_name           TEXT,
            kind                TEXT    NOT NULL DEFAULT 'SQL'
                                    CHECK (kind IN ('SQL', 'PROGRAM', 'BUILTIN')),
            command             TEXT    NOT NULL,
            run_as              TEXT,
            database_connection TEXT,
            ignore_error        INTEGER NOT NULL DEFAULT 0,
            autonomous          INTEGER NOT NULL DEFAULT 0,
            timeout             INTEGER NOT NULL DEFAULT 0
        );

        -- Neighbour lookups: WHERE chain_id = ? AND task_order < ? ORDER BY task_order
        CREATE INDEX IF NOT EXISTS idx_task_chain_order ON task (chain_id, task_order);

        CREATE TABLE IF NOT EXISTS parameter (
            task_id  INTEGER NOT NULL REFERENCES task (task_id)
                         ON UPDATE CASCADE ON DELETE CASCADE,
            order_id INTEGER NOT NULL CHECK (order_id > 0),
            value    TEXT,                          -- JSON or NULL
            PRIMARY KEY (task_id, order_id)
        );

        CREATE TABLE IF NOT EXISTS log (
            ts           TEXT    NOT NULL,
            pid          INTEGER NOT NULL,
            client_name  TEXT    NOT NULL,
            log_level    TEXT    NOT NULL,
            message      TEXT,
            message_data TEXT                       -- JSON or NULL
        );

        CREATE TABLE IF NOT EXISTS execution_log (
            chain_id     INTEGER,
            task_id      INTEGER,
            command      TEXT,
            kind         TEXT,
            last_run     TEXT,
            finished     TEXT,
            returncode   INTEGER,
            pid          INTEGER,
            output       TEXT,
            client_name  TEXT    NOT NULL,
            ignore_error INTEGER
        );
        ",
    )?;
    Ok(())
}
