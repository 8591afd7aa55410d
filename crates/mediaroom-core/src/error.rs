//! Error types module
//!
//! All failures that cross a crate boundary are unified under [`AppError`].
//! Storage and processing errors keep their own enums inside their crates and
//! are folded into `AppError` at the service layer, preserving whether a
//! failure is transient and whether it was a cancellation.
//!
//! The `Database` variant and `From<sqlx::Error>` are gated behind the `sqlx` feature.

use std::io;

#[cfg(feature = "sqlx")]
use sqlx::Error as SqlxError;

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Expected failures such as validation errors
    Debug,
    /// Recoverable issues
    Warn,
    /// Unexpected failures
    Error,
}

/// Describes how an error should be presented to whoever exposes it
/// (an HTTP layer, a CLI, a job log).
pub trait ErrorMetadata {
    /// HTTP status code to return
    fn http_status_code(&self) -> u16;

    /// Machine-readable error code (e.g., "STORAGE_ERROR")
    fn error_code(&self) -> &'static str;

    /// Whether retrying the same operation later may succeed
    fn is_recoverable(&self) -> bool;

    /// Client-facing message (may differ from internal error message)
    fn client_message(&self) -> String;

    /// Log level for this error
    fn log_level(&self) -> LogLevel;
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[cfg(feature = "sqlx")]
    #[error("Database error: {0}")]
    Database(#[source] SqlxError),

    #[cfg(not(feature = "sqlx"))]
    #[error("Database error: {0}")]
    Database(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("File too large: {0}")]
    PayloadTooLarge(String),

    #[error("Unsupported media: {0}")]
    UnsupportedMedia(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Storage error: {message}")]
    Storage { message: String, transient: bool },

    #[error("Media processing error: {0}")]
    Processing(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Internal error with source")]
    InternalWithSource {
        message: String,
        #[source]
        source: anyhow::Error,
    },
}

#[cfg(feature = "sqlx")]
impl From<SqlxError> for AppError {
    fn from(err: SqlxError) -> Self {
        AppError::Database(err)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::InternalWithSource {
            message: err.to_string(),
            source: err,
        }
    }
}

impl From<io::Error> for AppError {
    fn from(err: io::Error) -> Self {
        AppError::Internal(format!("IO error: {}", err))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Internal(format!("JSON error: {}", err))
    }
}

/// Static metadata per variant: (http_status, error_code, recoverable, log_level).
fn app_error_static_metadata(err: &AppError) -> (u16, &'static str, bool, LogLevel) {
    match err {
        AppError::Database(_) => (500, "DATABASE_ERROR", true, LogLevel::Error),
        AppError::Validation(_) => (400, "VALIDATION_ERROR", false, LogLevel::Debug),
        AppError::PayloadTooLarge(_) => (413, "PAYLOAD_TOO_LARGE", false, LogLevel::Debug),
        AppError::UnsupportedMedia(_) => (415, "UNSUPPORTED_MEDIA", false, LogLevel::Debug),
        AppError::NotFound(_) => (404, "NOT_FOUND", false, LogLevel::Debug),
        AppError::Storage { transient, .. } => {
            if *transient {
                (503, "STORAGE_UNAVAILABLE", true, LogLevel::Warn)
            } else {
                (500, "STORAGE_ERROR", false, LogLevel::Error)
            }
        }
        AppError::Processing(_) => (422, "PROCESSING_ERROR", false, LogLevel::Warn),
        AppError::Cancelled => (499, "CANCELLED", true, LogLevel::Debug),
        AppError::Internal(_) | AppError::InternalWithSource { .. } => {
            (500, "INTERNAL_ERROR", true, LogLevel::Error)
        }
    }
}

impl AppError {
    /// Shorthand for a not-found error about a media asset.
    pub fn media_not_found(id: impl std::fmt::Display) -> Self {
        AppError::NotFound(format!("Media {} not found", id))
    }

    /// Get detailed error information including error chain
    pub fn detailed_message(&self) -> String {
        use std::error::Error;

        let mut details = self.to_string();

        let mut source = self.source();
        let mut depth = 0;
        while let Some(err) = source {
            depth += 1;
            if depth > 5 {
                details.push_str("\n  ... (truncated)");
                break;
            }
            details.push_str(&format!("\n  Caused by: {}", err));
            source = err.source();
        }

        details
    }
}

impl ErrorMetadata for AppError {
    fn http_status_code(&self) -> u16 {
        app_error_static_metadata(self).0
    }

    fn error_code(&self) -> &'static str {
        app_error_static_metadata(self).1
    }

    fn is_recoverable(&self) -> bool {
        app_error_static_metadata(self).2
    }

    fn log_level(&self) -> LogLevel {
        app_error_static_metadata(self).3
    }

    fn client_message(&self) -> String {
        match self {
            AppError::Database(_) => "Failed to access database".to_string(),
            AppError::Storage { .. } => "Failed to access storage".to_string(),
            AppError::Internal(_) | AppError::InternalWithSource { .. } => {
                "Internal server error".to_string()
            }
            AppError::Cancelled => "Request was cancelled".to_string(),
            AppError::Validation(ref msg)
            | AppError::PayloadTooLarge(ref msg)
            | AppError::UnsupportedMedia(ref msg)
            | AppError::NotFound(ref msg)
            | AppError::Processing(ref msg) => msg.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_metadata_database() {
        #[cfg(feature = "sqlx")]
        let err = AppError::from(sqlx::Error::PoolClosed);
        #[cfg(not(feature = "sqlx"))]
        let err = AppError::Database("pool closed".to_string());
        assert_eq!(err.http_status_code(), 500);
        assert_eq!(err.error_code(), "DATABASE_ERROR");
        assert!(err.is_recoverable());
        assert_eq!(err.client_message(), "Failed to access database");
    }

    #[test]
    fn test_storage_error_transience_drives_metadata() {
        let transient = AppError::Storage {
            message: "connection reset".to_string(),
            transient: true,
        };
        assert_eq!(transient.http_status_code(), 503);
        assert!(transient.is_recoverable());

        let permanent = AppError::Storage {
            message: "access denied".to_string(),
            transient: false,
        };
        assert_eq!(permanent.http_status_code(), 500);
        assert!(!permanent.is_recoverable());
        assert_eq!(permanent.log_level(), LogLevel::Error);
    }

    #[test]
    fn test_validation_errors_are_client_visible() {
        let err = AppError::PayloadTooLarge("file exceeds 50 MB".to_string());
        assert_eq!(err.http_status_code(), 413);
        assert_eq!(err.client_message(), "file exceeds 50 MB");
        assert_eq!(err.log_level(), LogLevel::Debug);

        let err = AppError::media_not_found("abc");
        assert_eq!(err.http_status_code(), 404);
        assert_eq!(err.to_string(), "Not found: Media abc not found");
    }

    #[test]
    fn test_detailed_message_includes_source_chain() {
        let err = AppError::from(anyhow::anyhow!("disk full").context("writing thumbnail"));
        let details = err.detailed_message();
        assert!(details.contains("Internal error with source"));
        assert!(details.contains("writing thumbnail"));
    }
}
