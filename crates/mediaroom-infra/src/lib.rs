//! Mediaroom Infrastructure Library
//!
//! Shared infrastructure used by the worker binary and the services layer:
//! - Telemetry initialization
//! - Notification delivery (webhook and log notifiers)

pub mod notify;
pub mod telemetry;

// Re-export commonly used types
pub use notify::{LogNotifier, Notifier};

#[cfg(feature = "webhook")]
pub use notify::WebhookNotifier;

pub use telemetry::{init_telemetry, LogFormat, TelemetryConfig};
