use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_CLIENT_NAME: &str = "worker";
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 1_000;
pub const DEFAULT_HEARTBEAT_TTL_SECS: u64 = 30;
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Top-level config (tempo.toml + TEMPO_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TempoConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
    /// How long a writer waits on a locked database before giving up.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// Open the store read-only (a replica). Lock acquisition always fails.
    #[serde(default)]
    pub read_only: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            read_only: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Logical identity this worker claims; also its notification channel.
    #[serde(default = "default_client_name")]
    pub client_name: String,
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// A connection whose heartbeat is older than this is treated as dead.
    #[serde(default = "default_heartbeat_ttl_secs")]
    pub heartbeat_ttl_secs: u64,
    /// Only log what would run; never hand tasks to a real executor.
    #[serde(default = "bool_true")]
    pub dry_run: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            client_name: default_client_name(),
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            heartbeat_ttl_secs: DEFAULT_HEARTBEAT_TTL_SECS,
            dry_run: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    /// Per-channel buffer; slow listeners lose the oldest messages.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

fn bool_true() -> bool {
    true
}
fn default_client_name() -> String {
    DEFAULT_CLIENT_NAME.to_string()
}
fn default_tick_interval_ms() -> u64 {
    DEFAULT_TICK_INTERVAL_MS
}
fn default_heartbeat_ttl_secs() -> u64 {
    DEFAULT_HEARTBEAT_TTL_SECS
}
fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}
fn default_channel_capacity() -> usize {
    DEFAULT_CHANNEL_CAPACITY
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.tempo/tempo.db", home)
}

impl TempoConfig {
    /// Load config from a TOML file with TEMPO_* env var overrides.
    ///
    /// Nested keys use a double underscore, e.g.
    /// `TEMPO_WORKER__CLIENT_NAME=etl-1`. A missing file is not an error;
    /// every field has a default.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: TempoConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("TEMPO_").split("__"))
            .extract()
            .map_err(|e| crate::error::TempoError::Config(e.to_string()))?;

        if config.worker.client_name.trim().is_empty() {
            return Err(crate::error::TempoError::InvalidValue {
                field: "worker.client_name",
                reason: "must not be empty".to_string(),
            });
        }
        if config.worker.tick_interval_ms >= config.worker.heartbeat_ttl_secs.saturating_mul(1000) {
            return Err(crate::error::TempoError::InvalidValue {
                field: "worker.tick_interval_ms",
                reason: format!(
                    "must be shorter than worker.heartbeat_ttl_secs ({}s)",
                    config.worker.heartbeat_ttl_secs
                ),
            });
        }
        tracing::debug!(%path, client_name = %config.worker.client_name, "config loaded");
        Ok(config)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.tempo/tempo.toml", home)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let config = TempoConfig::load(path.to_str()).unwrap();
        assert_eq!(config.worker.tick_interval_ms, DEFAULT_TICK_INTERVAL_MS);
        assert_eq!(config.notify.channel_capacity, DEFAULT_CHANNEL_CAPACITY);
        assert!(!config.database.read_only);
    }

    #[test]
    fn file_values_override_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[worker]\nclient_name = \"etl-1\"\nheartbeat_ttl_secs = 5\n\n[database]\npath = \"/tmp/t.db\"\n"
        )
        .unwrap();
        let config = TempoConfig::load(file.path().to_str()).unwrap();
        assert_eq!(config.worker.client_name, "etl-1");
        assert_eq!(config.worker.heartbeat_ttl_secs, 5);
        assert_eq!(config.database.path, "/tmp/t.db");
        assert_eq!(config.database.busy_timeout_ms, DEFAULT_BUSY_TIMEOUT_MS);
    }

    #[test]
    fn tick_must_be_shorter_than_heartbeat_ttl() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[worker]\ntick_interval_ms = 5000\nheartbeat_ttl_secs = 5\n").unwrap();
        let err = TempoConfig::load(file.path().to_str()).unwrap_err();
        assert_eq!(err.code(), "INVALID_VALUE");

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[worker]\ntick_interval_ms = 4999\nheartbeat_ttl_secs = 5\n").unwrap();
        assert!(TempoConfig::load(file.path().to_str()).is_ok());
    }

    #[test]
    fn blank_client_name_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[worker]\nclient_name = \"  \"\n").unwrap();
        assert!(TempoConfig::load(file.path().to_str()).is_err());
    }
}
