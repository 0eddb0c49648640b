//! Exponential backoff for retryable delivery failures.

use std::time::Duration;

use herald_core::config::RetryConfig;
use herald_entity::DeliveryError;

/// Attempt cap and backoff schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts allowed, the first one included.
    pub max_attempts: u32,
    /// Delay after the first failed attempt.
    pub base_delay: Duration,
    /// Growth factor per further attempt.
    pub multiplier: u32,
    /// Upper bound for one delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    /// Build from the `retry` config section.
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            multiplier: config.multiplier.max(1),
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }

    /// Backoff after `attempts` attempts have been made:
    /// `base * multiplier^(attempts - 1)`, capped at `max_delay`.
    pub fn backoff(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1);
        let factor = self.multiplier.checked_pow(exponent).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Whether a record that failed with `error` after `attempts` attempts
    /// gets another one.
    pub fn should_retry(&self, attempts: u32, error: &DeliveryError) -> bool {
        error.is_retryable() && attempts < self.max_attempts
    }

    /// Delay before the next attempt. A transport's quota hint is honored
    /// when it asks for longer than the backoff.
    pub fn delay_for(&self, attempts: u32, error: &DeliveryError) -> Duration {
        let backoff = self.backoff(attempts);
        match error.retry_after() {
            Some(hint) => hint.max(backoff),
            None => backoff,
        }
    }
}
