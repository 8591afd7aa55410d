//! Postgres repositories for the media registry and the notification outbox.
//
// Media assets and relations
pub mod media;
//
// Notification outbox
pub mod notification;
//
// Registry and outbox traits
pub mod traits;
//
// Transaction utilities
pub mod transaction;

pub use media::PgMediaRegistry;
pub use notification::PgNotificationOutbox;
pub use traits::{MediaRegistry, NotificationOutbox};
