use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use rusqlite::{Connection, OpenFlags};
use tempo_chains::ChainStore;
use tempo_core::config::DatabaseConfig;
use tempo_core::TempoConfig;
use tempo_notify::NotificationPublisher;
use tempo_sessions::LockCoordinator;
use tokio::sync::watch;
use tracing::{error, info};

mod engine;
mod error;
mod executor;

use engine::Engine;
use executor::{BuiltinExecutor, DryRunExecutor, Executor};

/// Runs scheduled chains for one client name.
#[derive(Debug, Parser)]
#[command(name = "tempo-worker", version, about)]
struct Args {
    /// Config file (default: $TEMPO_CONFIG, then ~/.tempo/tempo.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Client name to claim; overrides `worker.client_name`
    #[arg(long)]
    client_name: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "tempo_worker=info,tempo_chains=info,tempo_sessions=info".into()
            }),
        )
        .init();

    let args = Args::parse();

    // config: --config > TEMPO_CONFIG env > ~/.tempo/tempo.toml
    let config_path = args.config.or_else(|| std::env::var("TEMPO_CONFIG").ok());
    let mut config = TempoConfig::load(config_path.as_deref())
        .inspect_err(|e| error!(code = e.code(), "{e}"))
        .context("failed to load configuration")?;
    if let Some(name) = args.client_name {
        anyhow::ensure!(!name.trim().is_empty(), "--client-name must not be empty");
        config.worker.client_name = name;
    }

    let db_config = &config.database;
    info!(path = %db_config.path, read_only = db_config.read_only, "opening SQLite database");

    // run all schema migrations (idempotent)
    if !db_config.read_only {
        ensure_parent_dir(&db_config.path);
        let db = open_db(db_config)?;
        tempo_chains::db::init_db(&db)?;
        tempo_sessions::db::init_db(&db)?;
        info!("database migrations complete");
    }

    // each subsystem gets its own connection
    let store = ChainStore::new(open_db(db_config)?)?;
    let coordinator =
        LockCoordinator::with_heartbeat(open_db(db_config)?, config.worker.heartbeat_ttl_secs)?;
    let publisher = Arc::new(NotificationPublisher::with_capacity(
        config.notify.channel_capacity,
    ));
    let tick = Duration::from_millis(config.worker.tick_interval_ms.max(10));
    let client_name = config.worker.client_name.clone();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let engine_task = if config.worker.dry_run {
        info!("dry run: tasks are logged, not executed");
        let engine = Engine::new(store, coordinator, publisher, DryRunExecutor, client_name, tick);
        spawn_engine(engine, shutdown_rx)
    } else {
        let executor = BuiltinExecutor::new(shutdown_tx.clone());
        let engine = Engine::new(store, coordinator, publisher, executor, client_name, tick);
        spawn_engine(engine, shutdown_rx)
    };

    let mut requested = shutdown_tx.subscribe();
    tokio::select! {
        res = tokio::signal::ctrl_c() => {
            res.context("failed to listen for ctrl-c")?;
            info!("interrupt received");
        }
        _ = requested.wait_for(|stop| *stop) => info!("shutdown requested"),
    }

    // signal engine to stop and wait for running chains
    shutdown_tx.send_replace(true);
    engine_task.await?;
    Ok(())
}

fn spawn_engine<E: Executor>(
    engine: Engine<E>,
    shutdown: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(engine.run(shutdown))
}

fn open_db(config: &DatabaseConfig) -> rusqlite::Result<Connection> {
    let conn = if config.read_only {
        Connection::open_with_flags(
            &config.path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?
    } else {
        let conn = Connection::open(&config.path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn
    };
    conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
    conn.execute_batch("PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

fn ensure_parent_dir(path: &str) {
    if let Some(parent) = std::path::Path::new(path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
}
