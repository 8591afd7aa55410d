//! Mediaroom Services Layer
//!
//! Orchestration on top of storage, processing and the registry: upload
//! ingestion with derived variants, permanent deletion, notification
//! dispatch and the [`MediaService`] facade callers talk to.

pub mod error;
pub mod ingest;
pub mod media;
pub mod notifications;
pub mod reaper;
#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;

pub use error::IntoAppError;
pub use ingest::{IngestLink, IngestRequest, VariantGenerator};
pub use media::MediaService;
pub use notifications::NotificationDispatcher;
pub use reaper::{AssetReaper, ReapOutcome};
