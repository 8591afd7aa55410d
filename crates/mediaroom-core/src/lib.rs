//! Mediaroom Core Library
//!
//! Domain models, the error taxonomy, configuration and the storage backend tag
//! shared by every Mediaroom crate.

pub mod config;
pub mod error;
pub mod models;
pub mod storage_types;

pub use config::{
    BaseConfig, Config, NotificationConfig, ProcessorConfig, StorageConfig, UploadLimits,
    WorkerConfig,
};
pub use error::{AppError, ErrorMetadata, LogLevel};
pub use storage_types::StorageBackend;
