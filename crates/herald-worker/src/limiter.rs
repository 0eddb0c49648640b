//! Sliding-window admission control per channel.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{trace, warn};

use herald_core::config::{RateLimitConfig, WindowLimitConfig};
use herald_entity::Channel;

/// Result of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The send may proceed; one slot was consumed.
    Admitted,
    /// The window is full; the oldest admission expires after `retry_after`.
    Denied {
        /// Time until a slot frees up.
        retry_after: Duration,
    },
}

impl Admission {
    /// Whether the request was admitted.
    pub fn is_admitted(&self) -> bool {
        matches!(self, Self::Admitted)
    }
}

/// Admission timestamps inside one rolling window.
#[derive(Debug, Clone)]
struct Window {
    max_requests: usize,
    length: Duration,
    admitted: VecDeque<Instant>,
}

impl Window {
    fn new(limit: WindowLimitConfig) -> Self {
        Self {
            max_requests: limit.max_requests as usize,
            length: Duration::from_secs(limit.window_seconds),
            admitted: VecDeque::new(),
        }
    }

    fn evict(&mut self, now: Instant) {
        while let Some(&oldest) = self.admitted.front() {
            if now.saturating_duration_since(oldest) >= self.length {
                self.admitted.pop_front();
            } else {
                break;
            }
        }
    }

    fn admit(&mut self, now: Instant) -> Admission {
        self.evict(now);
        if self.admitted.len() < self.max_requests {
            self.admitted.push_back(now);
            return Admission::Admitted;
        }
        let retry_after = match self.admitted.front() {
            Some(&oldest) => self.length.saturating_sub(now.saturating_duration_since(oldest)),
            None => self.length,
        };
        Admission::Denied { retry_after }
    }
}

/// Per-channel sliding-window limiter shared by every delivery task.
///
/// The check and the consume happen under one lock, so two tasks can never
/// both take the last slot. Channels without a configured limit are always
/// admitted.
#[derive(Debug, Clone, Default)]
pub struct RateLimiter {
    windows: Arc<Mutex<HashMap<Channel, Window>>>,
}

impl RateLimiter {
    /// A limiter with no limits.
    pub fn new() -> Self {
        Self::default()
    }

    /// A limiter enforcing the given per-channel limits.
    pub fn with_limits(limits: impl IntoIterator<Item = (Channel, WindowLimitConfig)>) -> Self {
        let windows = limits
            .into_iter()
            .map(|(channel, limit)| (channel, Window::new(limit)))
            .collect();
        Self {
            windows: Arc::new(Mutex::new(windows)),
        }
    }

    /// Build from the `rate_limits` config section. Entries naming an
    /// unknown channel are logged and skipped.
    pub fn from_config(config: &RateLimitConfig) -> Self {
        let limits = config
            .channels
            .iter()
            .filter_map(|(name, limit)| match name.parse::<Channel>() {
                Ok(channel) => Some((channel, *limit)),
                Err(e) => {
                    warn!(channel = %name, error = %e, "Ignoring rate limit");
                    None
                }
            });
        Self::with_limits(limits)
    }

    /// Try to take a slot for `channel` now.
    pub async fn try_acquire(&self, channel: Channel) -> Admission {
        self.try_acquire_at(channel, Instant::now()).await
    }

    /// Try to take a slot for `channel` at instant `now`.
    pub async fn try_acquire_at(&self, channel: Channel, now: Instant) -> Admission {
        let mut windows = self.windows.lock().await;
        let admission = match windows.get_mut(&channel) {
            Some(window) => window.admit(now),
            None => Admission::Admitted,
        };
        trace!(channel = %channel, ?admission, "Rate limit check");
        admission
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn whatsapp_limiter() -> RateLimiter {
        RateLimiter::from_config(&RateLimitConfig::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_whatsapp_limit() {
        let limiter = whatsapp_limiter();
        for _ in 0..20 {
            assert!(limiter.try_acquire(Channel::WhatsApp).await.is_admitted());
        }
        match limiter.try_acquire(Channel::WhatsApp).await {
            Admission::Denied { retry_after } => assert_eq!(retry_after, Duration::from_secs(60)),
            Admission::Admitted => panic!("21st request admitted"),
        }
        for _ in 0..50 {
            assert!(limiter.try_acquire(Channel::Email).await.is_admitted());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_slides() {
        let limiter = RateLimiter::with_limits([(
            Channel::Sms,
            WindowLimitConfig {
                max_requests: 2,
                window_seconds: 10,
            },
        )]);
        assert!(limiter.try_acquire(Channel::Sms).await.is_admitted());
        tokio::time::advance(Duration::from_secs(4)).await;
        assert!(limiter.try_acquire(Channel::Sms).await.is_admitted());

        match limiter.try_acquire(Channel::Sms).await {
            Admission::Denied { retry_after } => assert_eq!(retry_after, Duration::from_secs(6)),
            Admission::Admitted => panic!("window overflowed"),
        }
        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(limiter.try_acquire(Channel::Sms).await.is_admitted());
        assert!(!limiter.try_acquire(Channel::Sms).await.is_admitted());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_admissions_never_exceed_limit() {
        let limiter = whatsapp_limiter();
        let mut handles = Vec::new();
        for _ in 0..100 {
            let limiter = limiter.clone();
            handles.push(tokio::spawn(async move {
                limiter.try_acquire(Channel::WhatsApp).await.is_admitted()
            }));
        }
        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 20);
    }

    proptest! {
        #[test]
        fn prop_no_window_holds_more_than_max(
            max in 1u32..10,
            window_secs in 1u64..30,
            gaps in proptest::collection::vec(0u64..5_000, 1..200),
        ) {
            let mut window = Window::new(WindowLimitConfig {
                max_requests: max,
                window_seconds: window_secs,
            });
            let start = Instant::from_std(std::time::Instant::now());
            let length = Duration::from_secs(window_secs);
            let mut now = start;
            let mut admitted: Vec<Instant> = Vec::new();

            for gap in gaps {
                now += Duration::from_millis(gap);
                if window.admit(now).is_admitted() {
                    admitted.push(now);
                }
                let in_window = admitted
                    .iter()
                    .filter(|at| now.saturating_duration_since(**at) < length)
                    .count();
                prop_assert!(in_window <= max as usize);
            }
        }
    }
}
