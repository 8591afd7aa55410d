//! Delivery bookkeeping for outbox notifications.

use mediaroom_core::models::Notification;
use mediaroom_core::AppError;
use mediaroom_db::NotificationOutbox;
use mediaroom_infra::Notifier;
use std::sync::Arc;

/// Delivers outbox entries through a [`Notifier`] and records the outcome.
#[derive(Clone)]
pub struct NotificationDispatcher {
    outbox: Arc<dyn NotificationOutbox>,
    notifier: Arc<dyn Notifier>,
}

impl NotificationDispatcher {
    pub fn new(outbox: Arc<dyn NotificationOutbox>, notifier: Arc<dyn Notifier>) -> Self {
        Self { outbox, notifier }
    }

    pub fn outbox(&self) -> &Arc<dyn NotificationOutbox> {
        &self.outbox
    }

    /// Deliver one entry and mark it sent or failed.
    ///
    /// Returns whether delivery succeeded. An error means the outcome could
    /// not be recorded.
    #[tracing::instrument(skip(self, notification), fields(notification_id = %notification.id, attempts = notification.attempts))]
    pub async fn dispatch(&self, notification: &Notification) -> Result<bool, AppError> {
        match self.notifier.deliver(notification).await {
            Ok(()) => {
                self.outbox.mark_sent(notification.id).await?;
                tracing::debug!("Notification delivered");
                Ok(true)
            }
            Err(e) => {
                let message = format!("{:#}", e);
                tracing::warn!(error = %message, "Notification delivery failed");
                self.outbox.mark_failed(notification.id, &message).await?;
                Ok(false)
            }
        }
    }
}
