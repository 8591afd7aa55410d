use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mediaroom_core::models::{NewNotification, Notification, NotificationStatus};
use mediaroom_core::AppError;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

use super::traits::NotificationOutbox;

#[derive(Debug, sqlx::FromRow)]
struct NotificationRow {
    id: Uuid,
    media_id: Uuid,
    event: String,
    payload: Json<serde_json::Value>,
    status: String,
    attempts: i32,
    last_error: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    sent_at: Option<DateTime<Utc>>,
}

impl TryFrom<NotificationRow> for Notification {
    type Error = AppError;

    fn try_from(row: NotificationRow) -> Result<Self, Self::Error> {
        let status: NotificationStatus = row
            .status
            .parse()
            .map_err(|e: anyhow::Error| AppError::Internal(e.to_string()))?;
        Ok(Notification {
            id: row.id,
            media_id: row.media_id,
            event: row.event,
            payload: row.payload.0,
            status,
            attempts: row.attempts,
            last_error: row.last_error,
            created_at: row.created_at,
            updated_at: row.updated_at,
            sent_at: row.sent_at,
        })
    }
}

/// Postgres-backed [`NotificationOutbox`]
#[derive(Clone)]
pub struct PgNotificationOutbox {
    pool: PgPool,
}

impl PgNotificationOutbox {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationOutbox for PgNotificationOutbox {
    #[tracing::instrument(skip(self, notification), fields(db.table = "media_notifications", db.operation = "insert", media_id = %notification.media_id))]
    async fn enqueue(&self, notification: NewNotification) -> Result<Notification, AppError> {
        let row = sqlx::query_as::<Postgres, NotificationRow>(
            r#"
            INSERT INTO media_notifications (id, media_id, event, payload, status)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(notification.media_id)
        .bind(&notification.event)
        .bind(Json(&notification.payload))
        .bind(NotificationStatus::Pending.as_str())
        .fetch_one(&self.pool)
        .await?;

        row.try_into()
    }

    #[tracing::instrument(skip(self), fields(db.table = "media_notifications", db.operation = "select"))]
    async fn fetch_retryable(
        &self,
        limit: i64,
        max_attempts: i32,
    ) -> Result<Vec<Notification>, AppError> {
        let rows = sqlx::query_as::<Postgres, NotificationRow>(
            r#"
            SELECT * FROM media_notifications
            WHERE status IN ('pending', 'failed') AND attempts < $2
            ORDER BY created_at ASC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .bind(max_attempts)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    #[tracing::instrument(skip(self), fields(db.table = "media_notifications", db.operation = "update", db.record_id = %id))]
    async fn mark_sent(&self, id: Uuid) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            UPDATE media_notifications
            SET status = 'sent', attempts = attempts + 1, last_error = NULL,
                sent_at = NOW(), updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Notification {} not found", id)));
        }
        Ok(())
    }

    #[tracing::instrument(skip(self, error), fields(db.table = "media_notifications", db.operation = "update", db.record_id = %id))]
    async fn mark_failed(&self, id: Uuid, error: &str) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            UPDATE media_notifications
            SET status = 'failed', attempts = attempts + 1, last_error = $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(error)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Notification {} not found", id)));
        }
        Ok(())
    }
}
