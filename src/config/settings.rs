//! Application settings configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Deserializer};

// ============================================================================
// Default Constants
// ============================================================================

const DEFAULT_DB_PATH: &str = "data/app.db";
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_CLEANUP_CRON: &str = "0 2 * * *";
const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 10;
const DEFAULT_TIMEZONE: &str = "UTC";

// ============================================================================
// Application Configuration
// ============================================================================

/// Top-level application configuration loaded from YAML file.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Scheduler configuration.
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// Default timezone for schedules that don't specify one.
    #[serde(default = "default_timezone")]
    pub default_timezone: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            scheduler: SchedulerConfig::default(),
            default_timezone: default_timezone(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: &PathBuf) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: AppConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }
}

fn default_timezone() -> String {
    DEFAULT_TIMEZONE.to_string()
}

// ============================================================================
// Server Configuration
// ============================================================================

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

// ============================================================================
// Database Configuration
// ============================================================================

/// SQLite store configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
    /// Busy timeout applied to every connection (ms).
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// Retention period, in days, for completed/failed job runs.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_DB_PATH),
            busy_timeout_ms: default_busy_timeout_ms(),
            retention_days: default_retention_days(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from(DEFAULT_DB_PATH)
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_retention_days() -> u32 {
    30
}

// ============================================================================
// Scheduler Configuration
// ============================================================================

/// Scheduler lifecycle configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    /// Cron expression for the daily `CleanupOldJobRuns` sweep.
    #[serde(default = "default_cleanup_cron")]
    pub cleanup_cron: String,
    /// Upper bound on how long `Stop()` waits for in-flight runs to abort.
    #[serde(
        default = "default_shutdown_timeout",
        rename = "shutdown_timeout_secs",
        deserialize_with = "deserialize_secs"
    )]
    pub shutdown_timeout: Duration,
}

fn deserialize_secs<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let secs = u64::deserialize(deserializer)?;
    Ok(Duration::from_secs(secs))
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            cleanup_cron: default_cleanup_cron(),
            shutdown_timeout: default_shutdown_timeout(),
        }
    }
}

fn default_cleanup_cron() -> String {
    DEFAULT_CLEANUP_CRON.to_string()
}

fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(DEFAULT_SHUTDOWN_TIMEOUT_SECS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_config_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
    }

    #[test]
    fn test_database_config_defaults() {
        let config = DatabaseConfig::default();
        assert_eq!(config.path, PathBuf::from("data/app.db"));
        assert_eq!(config.retention_days, 30);
    }

    #[test]
    fn test_scheduler_config_defaults() {
        let config = SchedulerConfig::default();
        assert_eq!(config.cleanup_cron, "0 2 * * *");
        assert_eq!(config.shutdown_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_parse_yaml_overrides() {
        let yaml = r#"
server:
  host: "127.0.0.1"
  port: 8080
database:
  path: "custom/app.db"
  retention_days: 7
"#;
        let config: AppConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.database.path, PathBuf::from("custom/app.db"));
        assert_eq!(config.database.retention_days, 7);
        assert_eq!(config.default_timezone, "UTC");
    }
}
