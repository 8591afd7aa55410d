use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Event emitted once per successfully ingested asset.
pub const MEDIA_UPLOADED_EVENT: &str = "media.uploaded";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationStatus {
    Pending,
    Sent,
    Failed,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationStatus::Pending => "pending",
            NotificationStatus::Sent => "sent",
            NotificationStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for NotificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(NotificationStatus::Pending),
            "sent" => Ok(NotificationStatus::Sent),
            "failed" => Ok(NotificationStatus::Failed),
            _ => Err(anyhow::anyhow!("Invalid notification status: {}", s)),
        }
    }
}

/// Outbox entry for a side effect tied to a media record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub media_id: Uuid,
    pub event: String,
    pub payload: serde_json::Value,
    pub status: NotificationStatus,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
}

impl Notification {
    /// Pending or failed, with attempts left under `max_attempts`.
    pub fn is_retryable(&self, max_attempts: i32) -> bool {
        self.status != NotificationStatus::Sent && self.attempts < max_attempts
    }
}

#[derive(Debug, Clone)]
pub struct NewNotification {
    pub media_id: Uuid,
    pub event: String,
    pub payload: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [
            NotificationStatus::Pending,
            NotificationStatus::Sent,
            NotificationStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<NotificationStatus>().unwrap(), status);
        }
        assert!("queued".parse::<NotificationStatus>().is_err());
    }

    #[test]
    fn test_retryable() {
        let now = Utc::now();
        let mut notification = Notification {
            id: Uuid::new_v4(),
            media_id: Uuid::new_v4(),
            event: MEDIA_UPLOADED_EVENT.to_string(),
            payload: serde_json::json!({}),
            status: NotificationStatus::Failed,
            attempts: 2,
            last_error: Some("timeout".to_string()),
            created_at: now,
            updated_at: now,
            sent_at: None,
        };
        assert!(notification.is_retryable(5));
        assert!(!notification.is_retryable(2));

        notification.status = NotificationStatus::Sent;
        assert!(!notification.is_retryable(5));
    }
}
