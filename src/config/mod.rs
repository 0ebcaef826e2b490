use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};

use crate::engine::FailMode;
use crate::observability::LogFormat;

/// Where the gate state is persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum StorageBackend {
    /// Process memory; lost on restart
    Memory,
    /// A JSON document on local disk
    #[default]
    File,
    /// A Postgres key/value table
    Postgres,
}

/// Gate service configuration.
#[derive(Debug, Clone, Parser)]
#[command(name = "repgate")]
#[command(about = "Access gate that unblocks distracting sites after an exercise challenge")]
pub struct Config {
    /// HTTP server listen address
    #[arg(long, default_value = "127.0.0.1:8080", env = "REPGATE_LISTEN_ADDR")]
    pub listen_addr: String,

    /// State storage backend
    #[arg(long, value_enum, default_value_t = StorageBackend::File, env = "REPGATE_STORAGE")]
    pub storage: StorageBackend,

    /// Path of the state file (file backend)
    #[arg(long, default_value = "repgate-state.json", env = "REPGATE_STATE_PATH")]
    pub state_path: PathBuf,

    /// Postgres connection URL (postgres backend)
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    /// Minimum pooled database connections
    #[arg(long, default_value = "1", env = "REPGATE_DB_MIN_CONNECTIONS")]
    pub db_min_connections: u32,

    /// Maximum pooled database connections
    #[arg(long, default_value = "5", env = "REPGATE_DB_MAX_CONNECTIONS")]
    pub db_max_connections: u32,

    /// YAML file with first-run block list and rep count (optional)
    #[arg(long, env = "REPGATE_SEED_PATH")]
    pub seed_path: Option<PathBuf>,

    /// Challenge page that blocked navigations are redirected to
    #[arg(
        long,
        default_value = "http://127.0.0.1:8080/challenge",
        env = "REPGATE_CHALLENGE_PAGE_URL"
    )]
    pub challenge_page_url: String,

    /// Base URL of the pose-detection service
    #[arg(long, default_value = "http://localhost:5001", env = "REPGATE_POSE_SERVICE_URL")]
    pub pose_service_url: String,

    /// Timeout for pose service calls in milliseconds
    #[arg(long, default_value = "5000", env = "REPGATE_POSE_TIMEOUT_MS")]
    pub pose_timeout_ms: u64,

    /// Default exemption length in minutes
    #[arg(long, default_value = "30", env = "REPGATE_EXEMPTION_MINUTES")]
    pub exemption_minutes: u64,

    /// Navigation outcome when the state cannot be read
    #[arg(long, value_enum, default_value_t = FailMode::Closed, env = "REPGATE_FAIL_MODE")]
    pub fail_mode: FailMode,

    /// Idle challenge session eviction timeout in seconds
    #[arg(long, default_value = "900", env = "REPGATE_SESSION_IDLE_SECS")]
    pub session_idle_secs: u64,

    /// How often idle sessions are swept, in seconds
    #[arg(long, default_value = "60", env = "REPGATE_SESSION_EVICT_INTERVAL_SECS")]
    pub session_evict_interval_secs: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "RUST_LOG")]
    pub log_level: String,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text, env = "REPGATE_LOG_FORMAT")]
    pub log_format: LogFormat,

    /// Enable graceful shutdown
    #[arg(long, default_value = "true", env = "REPGATE_GRACEFUL_SHUTDOWN")]
    pub graceful_shutdown: bool,
}

impl Config {
    /// Get the pose service timeout as Duration.
    pub fn pose_timeout(&self) -> Duration {
        Duration::from_millis(self.pose_timeout_ms)
    }

    /// Get the default exemption length as Duration.
    pub fn exemption_duration(&self) -> Duration {
        Duration::from_secs(self.exemption_minutes.saturating_mul(60))
    }

    /// Get the session idle timeout as Duration.
    pub fn session_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.session_idle_secs)
    }

    /// Get the session sweep interval as Duration.
    pub fn session_evict_interval(&self) -> Duration {
        Duration::from_secs(self.session_evict_interval_secs.max(1))
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            listen_addr: "127.0.0.1:8080".to_string(),
            storage: StorageBackend::File,
            state_path: PathBuf::from("repgate-state.json"),
            database_url: None,
            db_min_connections: 1,
            db_max_connections: 5,
            seed_path: None,
            challenge_page_url: "http://127.0.0.1:8080/challenge".to_string(),
            pose_service_url: "http://localhost:5001".to_string(),
            pose_timeout_ms: 5000,
            exemption_minutes: 30,
            fail_mode: FailMode::Closed,
            session_idle_secs: 900,
            session_evict_interval_secs: 60,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            graceful_shutdown: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.listen_addr, "127.0.0.1:8080");
        assert_eq!(config.storage, StorageBackend::File);
        assert_eq!(config.fail_mode, FailMode::Closed);
        assert_eq!(config.exemption_minutes, 30);
    }

    #[test]
    fn test_duration_helpers() {
        let config = Config {
            pose_timeout_ms: 2500,
            exemption_minutes: 45,
            session_idle_secs: 120,
            session_evict_interval_secs: 0,
            ..Default::default()
        };

        assert_eq!(config.pose_timeout(), Duration::from_millis(2500));
        assert_eq!(config.exemption_duration(), Duration::from_secs(45 * 60));
        assert_eq!(config.session_idle_timeout(), Duration::from_secs(120));
        assert_eq!(config.session_evict_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_huge_exemption_minutes_saturate() {
        let config = Config {
            exemption_minutes: u64::MAX,
            ..Default::default()
        };

        assert_eq!(config.exemption_duration(), Duration::from_secs(u64::MAX));
    }

    #[test]
    fn test_parse_flags() {
        let config = Config::try_parse_from([
            "repgate",
            "--storage",
            "memory",
            "--fail-mode",
            "open",
            "--log-format",
            "json",
            "--exemption-minutes",
            "10",
        ])
        .unwrap();

        assert_eq!(config.storage, StorageBackend::Memory);
        assert_eq!(config.fail_mode, FailMode::Open);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.exemption_duration(), Duration::from_secs(600));
    }
}
