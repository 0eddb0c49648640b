//! # herald-channels
//!
//! One [`ChannelAdapter`] per transport. Adapters own contact validation,
//! payload truncation, their call timeout and the classification of every
//! transport failure as retryable or permanent.

pub mod adapter;
pub mod contact;
pub mod email;
pub mod http;
pub mod in_app;
pub mod push;
pub mod registry;
pub mod sms;
pub mod truncate;
pub mod whatsapp;

pub use adapter::{ChannelAdapter, DeliveryPayload, OutboundMessage};
pub use registry::AdapterRegistry;
