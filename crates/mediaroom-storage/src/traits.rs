//! Storage abstraction trait
//!
//! This module defines the Storage trait that all storage backends must implement.

use crate::StorageBackend;
use async_trait::async_trait;
use std::pin::Pin;
use thiserror::Error;
use tokio::io::AsyncRead;

/// Boxed upload stream; its length may be unknown up front.
pub type UploadReader = Pin<Box<dyn AsyncRead + Send + Unpin>>;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Whether retrying the failed operation later may succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Network errors, timeouts, throttling, 5xx responses
    Transient,
    /// Credentials, missing bucket, invalid key, misconfiguration
    Permanent,
}

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Upload failed ({kind:?}): {message}")]
    UploadFailed {
        kind: FailureKind,
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("Delete failed ({kind:?}): {message}")]
    DeleteFailed {
        kind: FailureKind,
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl StorageError {
    pub fn upload(
        kind: FailureKind,
        message: impl Into<String>,
        source: impl Into<BoxError>,
    ) -> Self {
        StorageError::UploadFailed {
            kind,
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn delete(
        kind: FailureKind,
        message: impl Into<String>,
        source: impl Into<BoxError>,
    ) -> Self {
        StorageError::DeleteFailed {
            kind,
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            StorageError::UploadFailed { kind, .. } | StorageError::DeleteFailed { kind, .. } => {
                *kind
            }
            StorageError::IoError(e) => classify_io_error(e),
            StorageError::InvalidKey(_) | StorageError::ConfigError(_) => FailureKind::Permanent,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind() == FailureKind::Transient
    }
}

/// Local IO failures that may clear up on their own.
pub fn classify_io_error(err: &std::io::Error) -> FailureKind {
    use std::io::ErrorKind;
    match err.kind() {
        ErrorKind::Interrupted | ErrorKind::TimedOut | ErrorKind::WouldBlock => {
            FailureKind::Transient
        }
        _ => FailureKind::Permanent,
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Outcome of a successful upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadResult {
    /// Final object name (generated or sanitised)
    pub stored_name: String,
    /// Backend key, `media/{stored_name}`
    pub key: String,
    /// Publicly reachable URL
    pub url: String,
    /// Bytes written
    pub size: u64,
    /// Raster dimensions when the content type is an image and the header could be read
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// Storage abstraction trait
///
/// Both backends (local filesystem, S3) implement this trait and are selected
/// once at startup by [`crate::create_storage`]. Nothing else in the pipeline
/// switches on the backend type.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Stream `reader` into the backend.
    ///
    /// With `generate_unique_name` the backend synthesizes a collision-resistant
    /// name so concurrent uploads of identically-named files never overwrite
    /// each other; otherwise the sanitised `filename` is used as-is.
    async fn upload(
        &self,
        reader: UploadReader,
        filename: &str,
        content_type: &str,
        size: Option<u64>,
        generate_unique_name: bool,
    ) -> StorageResult<UploadResult>;

    /// Delete an object. Deleting an unknown key succeeds.
    async fn delete(&self, storage_key: &str) -> StorageResult<()>;

    /// Public URL for a key. Pure string building, no I/O.
    fn url(&self, storage_key: &str) -> String;

    /// Get the storage backend type
    fn backend_type(&self) -> StorageBackend;
}

/// Read raster dimensions from an image header, if the bytes look like one.
pub(crate) fn sniff_dimensions(content_type: &str, head: &[u8]) -> (Option<u32>, Option<u32>) {
    if !content_type.starts_with("image/") {
        return (None, None);
    }
    let reader = match image::ImageReader::new(std::io::Cursor::new(head)).with_guessed_format() {
        Ok(reader) => reader,
        Err(_) => return (None, None),
    };
    match reader.into_dimensions() {
        Ok((w, h)) => (Some(w), Some(h)),
        Err(_) => (None, None),
    }
}
