//! Mediaroom Storage Library
//!
//! Durable byte storage behind one [`Storage`] trait, with a local filesystem
//! implementation and an S3-compatible object store implementation.
//!
//! # Storage key format
//!
//! Every backend stores objects under `media/{stored_name}`. Stored names are
//! either a generated collision-resistant name (`{uuid}.{ext}`) or the
//! sanitised caller filename. Keys must not contain `..` or a leading `/`.
//! Key generation is centralized in the `keys` module so all backends stay
//! consistent.

pub mod factory;
pub mod keys;
#[cfg(feature = "storage-local")]
pub mod local;
#[cfg(feature = "storage-s3")]
pub mod s3;
pub mod traits;

// Re-export commonly used types
pub use factory::create_storage;
#[cfg(feature = "storage-local")]
pub use local::LocalStorage;
pub use mediaroom_core::StorageBackend;
#[cfg(feature = "storage-s3")]
pub use s3::S3Storage;
pub use traits::{FailureKind, Storage, StorageError, StorageResult, UploadReader, UploadResult};
