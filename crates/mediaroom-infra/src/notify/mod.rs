//! Outbound delivery of outbox notifications.

use async_trait::async_trait;
use mediaroom_core::models::Notification;

#[cfg(feature = "webhook")]
mod webhook;

#[cfg(feature = "webhook")]
pub use webhook::{sign_payload, NotificationBody, WebhookNotifier};

/// Delivers a single notification. An error leaves the entry for the retry worker.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver(&self, notification: &Notification) -> anyhow::Result<()>;
}

/// Notifier that only logs. Used when no webhook endpoint is configured.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn deliver(&self, notification: &Notification) -> anyhow::Result<()> {
        tracing::info!(
            notification_id = %notification.id,
            media_id = %notification.media_id,
            event = %notification.event,
            attempts = notification.attempts,
            "Notification delivered to log"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use mediaroom_core::models::NotificationStatus;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_log_notifier_always_succeeds() {
        let notification = Notification {
            id: Uuid::new_v4(),
            media_id: Uuid::new_v4(),
            event: "media.uploaded".to_string(),
            payload: serde_json::json!({}),
            status: NotificationStatus::Pending,
            attempts: 3,
            last_error: Some("timeout".to_string()),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            sent_at: None,
        };
        assert!(LogNotifier.deliver(&notification).await.is_ok());
    }
}
