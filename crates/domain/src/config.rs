//! Configuration structures
//!
//! Every field has a serde default so partial TOML/JSON files are accepted.
//! Loading from disk and environment lives in `synclane-infra::config`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_CALL_GRACE_MS, DEFAULT_DB_BUSY_TIMEOUT_MS, DEFAULT_DB_PATH, DEFAULT_DB_POOL_SIZE,
    DEFAULT_EXTERNAL_TIMEOUT_SECS, DEFAULT_HISTORY_LIMIT, DEFAULT_LEASE_DURATION_SECS,
    DEFAULT_MAX_BODY_BYTES, DEFAULT_PERSISTENCE_BACKOFF_MS, DEFAULT_PERSISTENCE_RETRIES,
    DEFAULT_RETRY_BASE_DELAY_MS, DEFAULT_RETRY_MAX_ATTEMPTS, DEFAULT_RETRY_MAX_DELAY_MS,
    DEFAULT_RETRY_MAX_ELAPSED_SECS, DEFAULT_RETRY_MULTIPLIER, DEFAULT_RETRY_RESCAN_MS,
};
use crate::{Result, SyncLaneError};

/// Top-level application configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub engine: EngineConfig,
    pub retry: RetryConfig,
    pub gateway: GatewayConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Reject combinations the engine cannot honour.
    pub fn validate(&self) -> Result<()> {
        if self.database.pool_size == 0 {
            return Err(SyncLaneError::Config("database.pool_size must be at least 1".into()));
        }
        if self.engine.lease_duration_secs == 0 {
            return Err(SyncLaneError::Config(
                "engine.lease_duration_secs must be positive".into(),
            ));
        }
        if self.engine.retry_rescan_ms == 0 {
            return Err(SyncLaneError::Config("engine.retry_rescan_ms must be positive".into()));
        }
        self.retry.validate()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
    pub pool_size: u32,
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: DEFAULT_DB_PATH.to_string(),
            pool_size: DEFAULT_DB_POOL_SIZE,
            busy_timeout_ms: DEFAULT_DB_BUSY_TIMEOUT_MS,
        }
    }
}

impl DatabaseConfig {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

/// Orchestrator tunables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Lifetime of a sync-cycle lease before it is considered abandoned.
    pub lease_duration_secs: u64,
    /// Synchronous retries for a failed state-store write.
    pub persistence_retries: u32,
    pub persistence_backoff_ms: u64,
    /// Slack added on top of the per-client timeout for the engine's own hard
    /// deadline around the gateway call.
    pub call_grace_ms: u64,
    /// Maximum number of attempts returned by status queries.
    pub history_limit: usize,
    /// How often the retry worker re-reads the state store for retries
    /// scheduled by other processes.
    pub retry_rescan_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lease_duration_secs: DEFAULT_LEASE_DURATION_SECS,
            persistence_retries: DEFAULT_PERSISTENCE_RETRIES,
            persistence_backoff_ms: DEFAULT_PERSISTENCE_BACKOFF_MS,
            call_grace_ms: DEFAULT_CALL_GRACE_MS,
            history_limit: DEFAULT_HISTORY_LIMIT,
            retry_rescan_ms: DEFAULT_RETRY_RESCAN_MS,
        }
    }
}

impl EngineConfig {
    pub fn lease_duration(&self) -> Duration {
        Duration::from_secs(self.lease_duration_secs)
    }

    pub fn persistence_backoff(&self) -> Duration {
        Duration::from_millis(self.persistence_backoff_ms)
    }

    pub fn call_grace(&self) -> Duration {
        Duration::from_millis(self.call_grace_ms)
    }

    pub fn retry_rescan(&self) -> Duration {
        Duration::from_millis(self.retry_rescan_ms)
    }
}

/// Backoff and abandonment bounds for recoverable failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub base_delay_ms: u64,
    pub multiplier: f64,
    pub max_delay_ms: u64,
    /// Total attempts per cycle, including the first.
    pub max_attempts: u32,
    /// Window measured from the first attempt of the cycle.
    pub max_elapsed_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: DEFAULT_RETRY_BASE_DELAY_MS,
            multiplier: DEFAULT_RETRY_MULTIPLIER,
            max_delay_ms: DEFAULT_RETRY_MAX_DELAY_MS,
            max_attempts: DEFAULT_RETRY_MAX_ATTEMPTS,
            max_elapsed_secs: DEFAULT_RETRY_MAX_ELAPSED_SECS,
        }
    }
}

impl RetryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    pub fn max_elapsed(&self) -> Duration {
        Duration::from_secs(self.max_elapsed_secs)
    }

    /// Reject settings that would make the backoff meaningless.
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(SyncLaneError::Config("retry.max_attempts must be at least 1".into()));
        }
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(SyncLaneError::Config(format!(
                "retry.multiplier must be >= 1.0 (got {})",
                self.multiplier
            )));
        }
        if self.max_delay_ms < self.base_delay_ms {
            return Err(SyncLaneError::Config(
                "retry.max_delay_ms must not be smaller than retry.base_delay_ms".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub default_timeout_secs: u64,
    pub user_agent: String,
    pub max_body_bytes: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            default_timeout_secs: DEFAULT_EXTERNAL_TIMEOUT_SECS,
            user_agent: format!("synclane/{}", env!("CARGO_PKG_VERSION")),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

impl GatewayConfig {
    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing` filter directive, e.g. `info` or `synclane_core=debug`.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), json: false }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        config.validate().expect("defaults validate");
        assert_eq!(config.engine.lease_duration(), Duration::from_secs(30));
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.base_delay(), Duration::from_secs(1));
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            [retry]
            max_attempts = 8

            [logging]
            json = true
            "#,
        )
        .expect("parse toml");

        assert_eq!(config.retry.max_attempts, 8);
        assert_eq!(config.retry.max_delay_ms, DEFAULT_RETRY_MAX_DELAY_MS);
        assert!(config.logging.json);
        assert_eq!(config.database.path, DEFAULT_DB_PATH);
    }

    #[test]
    fn rejects_zero_attempts() {
        let mut config = Config::default();
        config.retry.max_attempts = 0;
        assert!(matches!(config.validate(), Err(SyncLaneError::Config(_))));
    }

    #[test]
    fn rejects_shrinking_multiplier() {
        let mut config = Config::default();
        config.retry.multiplier = 0.5;
        assert!(matches!(
            config.validate(),
            Err(SyncLaneError::Config(msg)) if msg.contains("multiplier")
        ));
    }

    #[test]
    fn rejects_max_delay_below_base() {
        let mut config = Config::default();
        config.retry.base_delay_ms = 10_000;
        config.retry.max_delay_ms = 1_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_lease_and_pool() {
        let mut config = Config::default();
        config.engine.lease_duration_secs = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.database.pool_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_rescan_interval() {
        let mut config = Config::default();
        config.engine.retry_rescan_ms = 0;
        assert!(matches!(
            config.validate(),
            Err(SyncLaneError::Config(msg)) if msg.contains("retry_rescan_ms")
        ));
    }
}
