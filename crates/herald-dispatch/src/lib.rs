//! # herald-dispatch
//!
//! The write entry point of Herald. [`NotificationDispatcher`] turns a
//! notification intent into a persisted notification plus one delivery
//! record per `(recipient, channel)` and hands those to the worker pools.
//! [`NotificationEngine`] wires every service together and is what hosts
//! embed.

pub mod dispatcher;
pub mod engine;
pub mod outcome;

pub use dispatcher::NotificationDispatcher;
pub use engine::{EngineBuilder, NotificationEngine};
pub use outcome::{DispatchResult, RecipientOutcome, SkippedChannel};
