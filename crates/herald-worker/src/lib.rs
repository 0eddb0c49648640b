//! # herald-worker
//!
//! Delivery execution for Herald:
//! - [`RateLimiter`]: sliding-window admission per channel
//! - [`RetryPolicy`]: exponential backoff with a hard attempt cap
//! - [`DeliveryProcessor`]: one attempt of one delivery record
//! - [`WorkerPools`]: bounded per-channel worker pools fed by queues
//! - [`MaintenanceScheduler`]: cron jobs such as the dedup-history purge

pub mod limiter;
pub mod maintenance;
pub mod pool;
pub mod processor;
pub mod retry;

pub use limiter::{Admission, RateLimiter};
pub use maintenance::{MaintenanceScheduler, purge_dedup_history};
pub use pool::{DeliveryTask, Submitter, WorkerPools};
pub use processor::{DeliveryProcessor, ProcessOutcome};
pub use retry::RetryPolicy;
