//! Redelivery of notifications that failed or were never sent.

use crate::periodic::{PeriodicJob, RunSummary};
use async_trait::async_trait;
use mediaroom_core::config::WorkerConfig;
use mediaroom_services::NotificationDispatcher;
use tokio_util::sync::CancellationToken;

/// Retry worker settings.
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    pub batch_size: i64,
    pub max_attempts: i32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            max_attempts: 5,
        }
    }
}

impl From<&WorkerConfig> for RetryConfig {
    fn from(config: &WorkerConfig) -> Self {
        Self {
            batch_size: config.retry_batch_size,
            max_attempts: config.retry_max_attempts,
        }
    }
}

pub struct RetryWorker {
    dispatcher: NotificationDispatcher,
    config: RetryConfig,
}

impl RetryWorker {
    pub fn new(dispatcher: NotificationDispatcher, config: RetryConfig) -> Self {
        Self { dispatcher, config }
    }
}

#[async_trait]
impl PeriodicJob for RetryWorker {
    fn name(&self) -> &'static str {
        "notification_retry"
    }

    async fn run_once(&self, cancel: &CancellationToken) -> anyhow::Result<RunSummary> {
        let batch = self
            .dispatcher
            .outbox()
            .fetch_retryable(self.config.batch_size, self.config.max_attempts)
            .await?;

        let mut summary = RunSummary::default();
        if batch.is_empty() {
            tracing::debug!("No notifications to retry");
            return Ok(summary);
        }

        tracing::info!(count = batch.len(), "Retrying notifications");

        for notification in &batch {
            if cancel.is_cancelled() {
                tracing::info!(
                    remaining = batch.len() - summary.attempted,
                    "Retry pass interrupted by shutdown"
                );
                break;
            }

            match self.dispatcher.dispatch(notification).await {
                Ok(delivered) => summary.record(delivered),
                Err(e) => {
                    tracing::error!(
                        error = %e,
                        notification_id = %notification.id,
                        "Failed to record delivery outcome"
                    );
                    summary.record(false);
                }
            }
        }

        Ok(summary)
    }
}
