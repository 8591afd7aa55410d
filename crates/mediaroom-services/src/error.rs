//! Conversion of storage and processing failures into [`AppError`].
//!
//! Transience of storage failures and caller cancellation survive the
//! conversion so upstream code can tell "retry later" from "give up".

use mediaroom_core::AppError;
use mediaroom_processing::ProcessingError;
use mediaroom_storage::StorageError;

pub trait IntoAppError {
    fn into_app_error(self) -> AppError;
}

impl IntoAppError for StorageError {
    fn into_app_error(self) -> AppError {
        match self {
            StorageError::InvalidKey(key) => {
                AppError::Validation(format!("Invalid storage key: {}", key))
            }
            other => AppError::Storage {
                transient: other.is_transient(),
                message: other.to_string(),
            },
        }
    }
}

impl IntoAppError for ProcessingError {
    fn into_app_error(self) -> AppError {
        match self {
            ProcessingError::Cancelled => AppError::Cancelled,
            ProcessingError::TooLarge { limit } => {
                AppError::PayloadTooLarge(format!("Upload exceeds the {} byte limit", limit))
            }
            ProcessingError::Io(e) => AppError::from(e),
            other => AppError::Processing(other.to_string()),
        }
    }
}
