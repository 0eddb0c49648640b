//! Per-channel delivery tracking entities.

pub mod error;
pub mod record;
pub mod status;

pub use error::{DeliveryError, ErrorClass};
pub use record::{DeliveryRecord, IllegalTransition};
pub use status::DeliveryStatus;
