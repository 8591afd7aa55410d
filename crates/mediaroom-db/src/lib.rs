//! Mediaroom Database Layer
//!
//! Durable metadata for media assets, their entity relations and the
//! notification outbox. Postgres implementations live in [`db`]; the
//! in-memory ones in [`memory`] share their semantics.
//!
// Module declarations
pub mod db;
pub mod memory;

// Re-exports: Registry capabilities and Postgres implementations
pub use db::{MediaRegistry, NotificationOutbox, PgMediaRegistry, PgNotificationOutbox};

// Re-exports: Transaction utilities
pub use db::transaction::TransactionGuard;

// Re-exports: In-memory implementations
pub use memory::{InMemoryMediaRegistry, InMemoryNotificationOutbox};
