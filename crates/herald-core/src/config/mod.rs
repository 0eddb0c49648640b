//! Application configuration schemas.
//!
//! All configuration structs are deserialized via the `config` crate from
//! an optional TOML file merged with `HERALD__`-prefixed environment
//! variables (`HERALD__RETRY__MAX_ATTEMPTS=5`). Every section has serde
//! defaults, so an empty configuration is a valid single-node setup with
//! an in-memory store and only the in-app channel enabled.

pub mod channels;
pub mod dispatch;
pub mod logging;
pub mod policy;

use serde::{Deserialize, Serialize};

pub use self::channels::{
    ChannelsConfig, EmailChannelConfig, InAppChannelConfig, PushChannelConfig, SmsChannelConfig,
    WhatsAppChannelConfig,
};
pub use self::dispatch::{
    DispatchConfig, MaintenanceConfig, RateLimitConfig, RetryConfig, WindowLimitConfig,
};
pub use self::logging::{LogFormat, LoggingConfig};
pub use self::policy::PolicyConfig;

use crate::error::AppError;

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Persistence settings. Without a URL the in-memory store is used.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Dispatch orchestration settings.
    #[serde(default)]
    pub dispatch: DispatchConfig,
    /// Retry/backoff policy.
    #[serde(default)]
    pub retry: RetryConfig,
    /// Per-channel sliding-window admission limits.
    #[serde(default)]
    pub rate_limits: RateLimitConfig,
    /// Channel transport settings.
    #[serde(default)]
    pub channels: ChannelsConfig,
    /// Dispatch policies overriding or extending the seeded table.
    #[serde(default)]
    pub policies: Vec<PolicyConfig>,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Background maintenance settings.
    #[serde(default)]
    pub maintenance: MaintenanceConfig,
}

/// Database connection pool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL. `None` selects the in-memory store.
    #[serde(default)]
    pub url: Option<String>,
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    /// Connection timeout in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u64,
    /// Idle connection timeout in seconds.
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_seconds: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connect_timeout_seconds: default_connect_timeout(),
            idle_timeout_seconds: default_idle_timeout(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file (optional) and the environment.
    pub fn load(path: &str) -> Result<Self, AppError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("HERALD")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to build config: {e}")))?;

        config
            .try_deserialize()
            .map_err(|e| AppError::configuration(format!("Failed to deserialize config: {e}")))
    }

    /// Check cross-field constraints that serde defaults cannot express.
    ///
    /// Returns every problem found rather than stopping at the first.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if self.retry.max_attempts == 0 {
            problems.push("retry.max_attempts must be at least 1".to_string());
        }
        if self.retry.base_delay_ms == 0 {
            problems.push("retry.base_delay_ms must be greater than 0".to_string());
        }
        if self.dispatch.submit_buffer == 0 {
            problems.push("dispatch.submit_buffer must be greater than 0".to_string());
        }

        for (channel, limit) in &self.rate_limits.channels {
            if limit.max_requests == 0 || limit.window_seconds == 0 {
                problems.push(format!(
                    "rate_limits.{channel}: max_requests and window_seconds must be positive"
                ));
            }
        }

        problems.extend(self.channels.validate());

        for policy in &self.policies {
            if policy.key.split_once('.').is_none() {
                problems.push(format!(
                    "policies: key '{}' must have the form '<type>.<event>'",
                    policy.key
                ));
            }
        }

        problems
    }
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_idle_timeout() -> u64 {
    300
}

pub(crate) fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.database.url.is_none());
        assert_eq!(config.retry.max_attempts, 3);
        assert!(config.validate().is_empty());
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let config = AppConfig::load("does/not/exist").expect("load");
        assert_eq!(config.retry.base_delay_ms, 5_000);
        assert!(config.channels.in_app.enabled);
        assert!(!config.channels.sms.enabled);
    }

    #[test]
    fn test_validate_reports_every_problem() {
        let mut config = AppConfig::default();
        config.retry.max_attempts = 0;
        config.policies.push(PolicyConfig {
            key: "nodot".to_string(),
            ..PolicyConfig::default()
        });
        let problems = config.validate();
        assert_eq!(problems.len(), 2);
    }
}
