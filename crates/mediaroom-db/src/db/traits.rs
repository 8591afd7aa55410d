//! Registry and outbox capabilities.
//!
//! Callers depend on these traits, never on a concrete store, so the
//! Postgres implementations and the in-memory ones are interchangeable.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mediaroom_core::models::{
    LinkedMedia, MediaAsset, MediaQuery, MediaRelation, MediaStats, NewMediaAsset,
    NewMediaRelation, NewNotification, Notification,
};
use mediaroom_core::AppError;
use uuid::Uuid;

/// Durable metadata store for media assets and their entity relations.
#[async_trait]
pub trait MediaRegistry: Send + Sync {
    /// Validate and insert a fully-uploaded asset in one statement.
    async fn create_media(&self, draft: NewMediaAsset) -> Result<MediaAsset, AppError>;

    /// Active asset by id. Soft-deleted assets are reported as not found.
    async fn get_by_id(&self, id: Uuid) -> Result<MediaAsset, AppError>;

    /// Asset by id regardless of its deletion state.
    async fn find_any(&self, id: Uuid) -> Result<Option<MediaAsset>, AppError>;

    /// Active assets, newest first.
    async fn list_paginated(
        &self,
        query: &MediaQuery,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<MediaAsset>, AppError>;

    async fn count_media(&self, query: &MediaQuery) -> Result<i64, AppError>;

    async fn update_alt_text(
        &self,
        id: Uuid,
        alt_text: Option<String>,
    ) -> Result<MediaAsset, AppError>;

    /// Mark an active asset deleted. Unknown or already deleted ids are NotFound.
    async fn soft_delete(&self, id: Uuid) -> Result<(), AppError>;

    /// Clear the deletion mark of a soft-deleted asset.
    async fn restore(&self, id: Uuid) -> Result<MediaAsset, AppError>;

    /// Remove the row. Relations and notifications go with it.
    async fn hard_delete(&self, id: Uuid) -> Result<(), AppError>;

    /// Assets soft-deleted strictly before `cutoff`, oldest deletion first.
    async fn list_soft_deleted_before(
        &self,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<MediaAsset>, AppError>;

    async fn stats(&self) -> Result<MediaStats, AppError>;

    /// Create the link, or update `sort_order` if it already exists.
    async fn link_media(&self, relation: NewMediaRelation) -> Result<MediaRelation, AppError>;

    /// Remove links between a media asset and an entity. With no
    /// `relation_type`, every relation type is removed. Returns the count.
    async fn unlink_media(
        &self,
        media_id: Uuid,
        entity_type: &str,
        entity_id: Uuid,
        relation_type: Option<&str>,
    ) -> Result<u64, AppError>;

    /// Active media linked to an entity, by ascending `sort_order`.
    async fn get_media_for_entity(
        &self,
        entity_type: &str,
        entity_id: Uuid,
        relation_type: Option<&str>,
    ) -> Result<Vec<LinkedMedia>, AppError>;

    /// Make `media_ids` the complete, ordered relation set for one
    /// `(entity_type, entity_id, relation_type)` scope.
    ///
    /// Duplicates keep their first position. If any id does not name an
    /// active asset nothing changes and NotFound is returned.
    async fn replace_relations(
        &self,
        entity_type: &str,
        entity_id: Uuid,
        relation_type: &str,
        media_ids: &[Uuid],
    ) -> Result<Vec<MediaRelation>, AppError>;
}

/// Outbox for side effects tied to a media record.
#[async_trait]
pub trait NotificationOutbox: Send + Sync {
    async fn enqueue(&self, notification: NewNotification) -> Result<Notification, AppError>;

    /// Pending or failed entries with fewer than `max_attempts` attempts, oldest first.
    async fn fetch_retryable(
        &self,
        limit: i64,
        max_attempts: i32,
    ) -> Result<Vec<Notification>, AppError>;

    async fn mark_sent(&self, id: Uuid) -> Result<(), AppError>;

    async fn mark_failed(&self, id: Uuid, error: &str) -> Result<(), AppError>;
}

/// Ids with later duplicates removed, first occurrence kept.
pub(crate) fn dedupe_ids(ids: &[Uuid]) -> Vec<Uuid> {
    let mut seen = std::collections::HashSet::with_capacity(ids.len());
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedupe_keeps_first_occurrence() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        assert_eq!(dedupe_ids(&[b, a, b, c, a]), vec![b, a, c]);
        assert!(dedupe_ids(&[]).is_empty());
    }
}
