//! Mediaroom Worker – periodic background jobs.
//!
//! This crate provides the interval runner and the two jobs the worker binary
//! schedules: notification redelivery and purging of media whose soft-delete
//! retention has elapsed.

pub mod periodic;
pub mod purge;
pub mod retry;

pub use periodic::{PeriodicJob, PeriodicWorker, RunSummary};
pub use purge::{PurgeConfig, PurgeWorker};
pub use retry::{RetryConfig, RetryWorker};
