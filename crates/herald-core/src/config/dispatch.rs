//! Dispatch, retry, rate-limit, and maintenance configuration.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::default_true;

/// Dispatch orchestration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Capacity of each channel's submission queue.
    #[serde(default = "default_submit_buffer")]
    pub submit_buffer: usize,
    /// Remove the acting user from audience-resolved recipients.
    #[serde(default = "default_true")]
    pub exclude_actor: bool,
    /// Days a dedup key is remembered before maintenance purges it.
    #[serde(default = "default_dedup_retention")]
    pub dedup_retention_days: u32,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            submit_buffer: default_submit_buffer(),
            exclude_actor: true,
            dedup_retention_days: default_dedup_retention(),
        }
    }
}

/// Exponential backoff policy for retryable delivery failures.
///
/// With the defaults the delay after attempt `n` is `5s * 2^(n-1)`,
/// capped at 20s: 5s, 10s, 20s.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum total attempts per delivery record, the first one included.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before the second attempt, in milliseconds.
    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,
    /// Multiplier applied per subsequent attempt.
    #[serde(default = "default_multiplier")]
    pub multiplier: u32,
    /// Upper bound for a single delay, in milliseconds.
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay(),
            multiplier: default_multiplier(),
            max_delay_ms: default_max_delay(),
        }
    }
}

/// Sliding-window admission limits keyed by channel name
/// (`email`, `push`, `whatsapp`, `in_app`, `sms`).
///
/// Channels without an entry are not rate limited.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Limits by channel name.
    #[serde(flatten)]
    pub channels: HashMap<String, WindowLimitConfig>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        let mut channels = HashMap::new();
        channels.insert(
            "whatsapp".to_string(),
            WindowLimitConfig {
                max_requests: 20,
                window_seconds: 60,
            },
        );
        Self { channels }
    }
}

/// A single sliding-window limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowLimitConfig {
    /// Admissions allowed per rolling window.
    pub max_requests: u32,
    /// Window length in seconds.
    pub window_seconds: u64,
}

/// Background maintenance settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceConfig {
    /// Whether the cron scheduler is started by long-running hosts.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Cron expression (with seconds) for the dedup-history purge.
    #[serde(default = "default_dedup_cleanup_cron")]
    pub dedup_cleanup_cron: String,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dedup_cleanup_cron: default_dedup_cleanup_cron(),
        }
    }
}

fn default_submit_buffer() -> usize {
    1024
}

fn default_dedup_retention() -> u32 {
    30
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay() -> u64 {
    5_000
}

fn default_multiplier() -> u32 {
    2
}

fn default_max_delay() -> u64 {
    20_000
}

fn default_dedup_cleanup_cron() -> String {
    "0 30 3 * * *".to_string()
}
