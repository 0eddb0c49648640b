//! # herald-database
//!
//! Persistence for notifications, delivery records, seen markers, channel
//! preferences and dispatch (dedup) history. The [`NotificationStore`]
//! trait is the only contract the rest of the engine depends on; an
//! in-memory implementation serves single-node hosts and tests, and the
//! PostgreSQL implementation serves everything else.

pub mod connection;
pub mod migration;
pub mod store;

pub use connection::DatabasePool;
pub use store::memory::MemoryNotificationStore;
pub use store::postgres::PgNotificationStore;
pub use store::{DispatchCreation, InboxEntry, NotificationStore};
