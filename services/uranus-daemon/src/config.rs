//! Daemon Configuration
//!
//! Settings come from an optional config file, `config/default` and
//! `config/local`, then `URANUS__*` environment variables. CLI flags are
//! applied on top by `main`.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uranus_agent::{AgentConfig, PromotionMode, DEFAULT_PROMOTION_THRESHOLD};

/// Daemon configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Agent behaviour
    #[serde(default)]
    pub agent: AgentSettings,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Agent settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSettings {
    /// SQLite database holding the audit trail and settings
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// hackernel socket
    #[serde(default = "default_socket_path")]
    pub socket_path: PathBuf,

    /// Subscribe to `osinfo::report` and supervise it
    #[serde(default = "default_true")]
    pub heartbeat_enabled: bool,

    /// Heartbeat watchdog interval in seconds
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,

    /// Delay before tearing down the channel on stop, in milliseconds
    #[serde(default = "default_grace_period")]
    pub grace_period_ms: u64,

    /// Reports of an identical command before it is trusted
    #[serde(default = "default_promotion_threshold")]
    pub promotion_threshold: i64,

    /// `status` or `message`
    #[serde(default)]
    pub promotion_mode: PromotionMode,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            socket_path: default_socket_path(),
            heartbeat_enabled: true,
            heartbeat_interval_secs: default_heartbeat_interval(),
            grace_period_ms: default_grace_period(),
            promotion_threshold: default_promotion_threshold(),
            promotion_mode: PromotionMode::default(),
        }
    }
}

impl AgentSettings {
    pub fn agent_config(&self) -> AgentConfig {
        AgentConfig {
            heartbeat_interval: self
                .heartbeat_enabled
                .then(|| Duration::from_secs(self.heartbeat_interval_secs)),
            grace_period: Duration::from_millis(self.grace_period_ms),
            promotion_mode: self.promotion_mode,
            promotion_threshold: self.promotion_threshold,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

// =============================================================================
// Default Functions
// =============================================================================

fn default_database_path() -> PathBuf {
    PathBuf::from("/var/lib/uranus/main.db")
}

fn default_socket_path() -> PathBuf {
    PathBuf::from("/run/hackernel/hackernel.sock")
}

fn default_heartbeat_interval() -> u64 {
    10
}

fn default_grace_period() -> u64 {
    1000
}

fn default_promotion_threshold() -> i64 {
    DEFAULT_PROMOTION_THRESHOLD
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_true() -> bool {
    true
}

// =============================================================================
// Configuration Loading
// =============================================================================

impl DaemonConfig {
    /// Load configuration from environment and optional config file
    pub fn load(config_path: Option<&str>) -> anyhow::Result<Self> {
        let _ = dotenvy::dotenv();

        let mut builder = config::Config::builder();

        if let Some(path) = config_path {
            builder = builder.add_source(config::File::with_name(path).required(true));
        }

        builder = builder
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(
                config::Environment::with_prefix("URANUS")
                    .separator("__")
                    .try_parsing(true),
            );

        Ok(builder.build()?.try_deserialize()?)
    }

    /// Rejects settings the agent cannot run with
    pub fn validate(&self) -> anyhow::Result<()> {
        let agent = &self.agent;

        if agent.heartbeat_enabled && agent.heartbeat_interval_secs == 0 {
            anyhow::bail!("heartbeat_interval_secs must be at least 1 when the heartbeat is enabled");
        }

        if agent.promotion_threshold < 1 {
            anyhow::bail!(
                "promotion_threshold must be at least 1, got {}",
                agent.promotion_threshold
            );
        }

        if agent.grace_period_ms > 60_000 {
            tracing::warn!(
                grace_period_ms = agent.grace_period_ms,
                "Long grace period delays agent shutdown"
            );
        }

        Ok(())
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            agent: AgentSettings::default(),
            logging: LoggingConfig::default(),
        }
    }
}
