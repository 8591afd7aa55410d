//! Media service facade
//!
//! Single entry point for callers: ingestion, reads, lifecycle changes and
//! entity relations, returned in their wire representation.

use mediaroom_core::models::{
    MediaAsset, MediaQuery, MediaRelation, MediaResponse, MediaStats, NewMediaRelation,
    NewNotification, PaginatedMedia, Pagination, MEDIA_UPLOADED_EVENT, RELATION_FEATURED,
    RELATION_GALLERY,
};
use mediaroom_core::AppError;
use mediaroom_db::{MediaRegistry, NotificationOutbox};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::ingest::{IngestRequest, VariantGenerator};
use crate::notifications::NotificationDispatcher;
use crate::reaper::{AssetReaper, ReapOutcome};

pub struct MediaService {
    generator: VariantGenerator,
    registry: Arc<dyn MediaRegistry>,
    reaper: AssetReaper,
    outbox: Arc<dyn NotificationOutbox>,
    dispatcher: Option<NotificationDispatcher>,
}

impl MediaService {
    pub fn new(
        generator: VariantGenerator,
        registry: Arc<dyn MediaRegistry>,
        reaper: AssetReaper,
        outbox: Arc<dyn NotificationOutbox>,
    ) -> Self {
        Self {
            generator,
            registry,
            reaper,
            outbox,
            dispatcher: None,
        }
    }

    /// Attempt delivery right after ingestion instead of waiting for the retry worker.
    pub fn with_dispatcher(mut self, dispatcher: NotificationDispatcher) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    pub fn to_response(&self, asset: &MediaAsset, sort_order: Option<i32>) -> MediaResponse {
        MediaResponse::from_asset(asset, sort_order)
    }

    /// Ingest an upload, then enqueue a `media.uploaded` notification.
    pub async fn ingest(
        &self,
        request: IngestRequest,
        cancel: &CancellationToken,
    ) -> Result<MediaResponse, AppError> {
        let sort_order = request.link.as_ref().map(|l| l.sort_order);
        let asset = self.generator.ingest(request, cancel).await?;
        self.notify_uploaded(&asset).await;
        Ok(self.to_response(&asset, sort_order))
    }

    /// Enqueue failures are logged; the asset is already persisted.
    async fn notify_uploaded(&self, asset: &MediaAsset) {
        let payload = serde_json::json!({
            "filename": asset.original_filename,
            "url": asset.original().map(|v| v.url.as_str()),
            "mime_type": asset.mime_type,
            "size": asset.size_bytes,
            "uploaded_by": asset.uploaded_by,
        });
        let notification = match self
            .outbox
            .enqueue(NewNotification {
                media_id: asset.id,
                event: MEDIA_UPLOADED_EVENT.to_string(),
                payload,
            })
            .await
        {
            Ok(notification) => notification,
            Err(e) => {
                tracing::warn!(error = %e, media_id = %asset.id, "Failed to enqueue upload notification");
                return;
            }
        };

        if let Some(dispatcher) = self.dispatcher.clone() {
            tokio::spawn(async move {
                if let Err(e) = dispatcher.dispatch(&notification).await {
                    tracing::warn!(
                        error = %e,
                        notification_id = %notification.id,
                        "Failed to record notification outcome"
                    );
                }
            });
        }
    }

    pub async fn get(&self, id: Uuid) -> Result<MediaResponse, AppError> {
        let asset = self.registry.get_by_id(id).await?;
        Ok(self.to_response(&asset, None))
    }

    pub async fn list(
        &self,
        page: Option<i64>,
        limit: Option<i64>,
        query: &MediaQuery,
    ) -> Result<PaginatedMedia, AppError> {
        let pagination = Pagination::new(page, limit);
        let assets = self
            .registry
            .list_paginated(query, pagination.limit, pagination.offset())
            .await?;
        let total_count = self.registry.count_media(query).await?;

        Ok(PaginatedMedia {
            items: assets.iter().map(|a| self.to_response(a, None)).collect(),
            total_count,
            total_pages: pagination.total_pages(total_count),
            page: pagination.page,
        })
    }

    pub async fn update_alt_text(
        &self,
        id: Uuid,
        alt_text: Option<String>,
    ) -> Result<MediaResponse, AppError> {
        let alt_text = alt_text
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        let asset = self.registry.update_alt_text(id, alt_text).await?;
        Ok(self.to_response(&asset, None))
    }

    /// Soft delete. The purge worker removes the asset after the retention window.
    pub async fn delete(&self, id: Uuid) -> Result<(), AppError> {
        self.registry.soft_delete(id).await?;
        tracing::info!(media_id = %id, "Media soft-deleted");
        Ok(())
    }

    pub async fn restore(&self, id: Uuid) -> Result<MediaResponse, AppError> {
        let asset = self.registry.restore(id).await?;
        tracing::info!(media_id = %id, "Media restored");
        Ok(self.to_response(&asset, None))
    }

    /// Remove an asset now, active or soft-deleted.
    pub async fn hard_delete(&self, id: Uuid) -> Result<ReapOutcome, AppError> {
        let asset = self
            .registry
            .find_any(id)
            .await?
            .ok_or_else(|| AppError::media_not_found(id))?;
        self.reaper.hard_delete(&asset).await
    }

    pub async fn link(&self, relation: NewMediaRelation) -> Result<MediaRelation, AppError> {
        self.registry.link_media(relation).await
    }

    pub async fn unlink(
        &self,
        media_id: Uuid,
        entity_type: &str,
        entity_id: Uuid,
        relation_type: Option<&str>,
    ) -> Result<u64, AppError> {
        self.registry
            .unlink_media(media_id, entity_type, entity_id, relation_type)
            .await
    }

    pub async fn media_for_entity(
        &self,
        entity_type: &str,
        entity_id: Uuid,
        relation_type: Option<&str>,
    ) -> Result<Vec<MediaResponse>, AppError> {
        let linked = self
            .registry
            .get_media_for_entity(entity_type, entity_id, relation_type)
            .await?;
        Ok(linked
            .iter()
            .map(|l| self.to_response(&l.asset, Some(l.relation.sort_order)))
            .collect())
    }

    pub async fn featured_media(
        &self,
        entity_type: &str,
        entity_id: Uuid,
    ) -> Result<Option<MediaResponse>, AppError> {
        Ok(self
            .media_for_entity(entity_type, entity_id, Some(RELATION_FEATURED))
            .await?
            .into_iter()
            .next())
    }

    pub async fn gallery_media(
        &self,
        entity_type: &str,
        entity_id: Uuid,
    ) -> Result<Vec<MediaResponse>, AppError> {
        self.media_for_entity(entity_type, entity_id, Some(RELATION_GALLERY))
            .await
    }

    /// Replace the whole relation set of one scope; `media_ids` order becomes `sort_order`.
    pub async fn replace_entity_media(
        &self,
        entity_type: &str,
        entity_id: Uuid,
        relation_type: &str,
        media_ids: &[Uuid],
    ) -> Result<Vec<MediaResponse>, AppError> {
        self.registry
            .replace_relations(entity_type, entity_id, relation_type, media_ids)
            .await?;
        self.media_for_entity(entity_type, entity_id, Some(relation_type))
            .await
    }

    pub async fn stats(&self) -> Result<MediaStats, AppError> {
        self.registry.stats().await
    }
}
