//! In-process registry and outbox with the same semantics as the Postgres
//! implementations. Used by tests and for running without a database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mediaroom_core::models::{
    validate_scope, LinkedMedia, MediaAsset, MediaQuery, MediaRelation, MediaStats,
    NewMediaAsset, NewMediaRelation, NewNotification, Notification, NotificationStatus,
};
use mediaroom_core::AppError;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

use crate::db::traits::{dedupe_ids, MediaRegistry, NotificationOutbox};

#[derive(Default)]
struct RegistryState {
    assets: HashMap<Uuid, MediaAsset>,
    relations: Vec<MediaRelation>,
    fail_creates: bool,
}

/// [`MediaRegistry`] backed by a mutex-guarded map.
#[derive(Clone, Default)]
pub struct InMemoryMediaRegistry {
    state: Arc<Mutex<RegistryState>>,
}

impl InMemoryMediaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, RegistryState>, AppError> {
        self.state
            .lock()
            .map_err(|_| AppError::Internal("registry lock poisoned".to_string()))
    }

    /// Make every subsequent `create_media` fail with a database-style error.
    pub fn fail_creates(&self, fail: bool) {
        if let Ok(mut state) = self.state.lock() {
            state.fail_creates = fail;
        }
    }

    /// Overwrite the deletion timestamp of an asset.
    pub fn set_deleted_at(&self, id: Uuid, deleted_at: Option<DateTime<Utc>>) {
        if let Ok(mut state) = self.state.lock() {
            if let Some(asset) = state.assets.get_mut(&id) {
                asset.deleted_at = deleted_at;
            }
        }
    }

    /// Every relation row, including those of soft-deleted media.
    pub fn relations(&self) -> Vec<MediaRelation> {
        self.state
            .lock()
            .map(|s| s.relations.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.state.lock().map(|s| s.assets.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn active<'a>(state: &'a RegistryState, id: &Uuid) -> Option<&'a MediaAsset> {
    state.assets.get(id).filter(|a| a.deleted_at.is_none())
}

fn newest_first(assets: &mut [MediaAsset]) {
    assets.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
}

#[async_trait]
impl MediaRegistry for InMemoryMediaRegistry {
    async fn create_media(&self, draft: NewMediaAsset) -> Result<MediaAsset, AppError> {
        draft.validate()?;
        let mut state = self.lock()?;
        if state.fail_creates {
            return Err(AppError::Internal("injected registry failure".to_string()));
        }

        let now = Utc::now();
        let asset = MediaAsset {
            id: Uuid::new_v4(),
            original_filename: draft.original_filename,
            mime_type: draft.mime_type,
            size_bytes: draft.size_bytes,
            storage_backend: draft.storage_backend,
            width: draft.width,
            height: draft.height,
            duration_seconds: draft.duration_seconds,
            title: draft.title,
            alt_text: draft.alt_text,
            uploaded_by: draft.uploaded_by,
            variants: draft.variants,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        state.assets.insert(asset.id, asset.clone());
        Ok(asset)
    }

    async fn get_by_id(&self, id: Uuid) -> Result<MediaAsset, AppError> {
        let state = self.lock()?;
        active(&state, &id)
            .cloned()
            .ok_or_else(|| AppError::media_not_found(id))
    }

    async fn find_any(&self, id: Uuid) -> Result<Option<MediaAsset>, AppError> {
        Ok(self.lock()?.assets.get(&id).cloned())
    }

    async fn list_paginated(
        &self,
        query: &MediaQuery,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<MediaAsset>, AppError> {
        let state = self.lock()?;
        let mut assets: Vec<MediaAsset> = state
            .assets
            .values()
            .filter(|a| a.deleted_at.is_none() && query.matches(a))
            .cloned()
            .collect();
        newest_first(&mut assets);
        Ok(assets
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn count_media(&self, query: &MediaQuery) -> Result<i64, AppError> {
        let state = self.lock()?;
        Ok(state
            .assets
            .values()
            .filter(|a| a.deleted_at.is_none() && query.matches(a))
            .count() as i64)
    }

    async fn update_alt_text(
        &self,
        id: Uuid,
        alt_text: Option<String>,
    ) -> Result<MediaAsset, AppError> {
        let mut state = self.lock()?;
        let asset = state
            .assets
            .get_mut(&id)
            .filter(|a| a.deleted_at.is_none())
            .ok_or_else(|| AppError::media_not_found(id))?;
        asset.alt_text = alt_text;
        asset.updated_at = Utc::now();
        Ok(asset.clone())
    }

    async fn soft_delete(&self, id: Uuid) -> Result<(), AppError> {
        let mut state = self.lock()?;
        let asset = state
            .assets
            .get_mut(&id)
            .filter(|a| a.deleted_at.is_none())
            .ok_or_else(|| AppError::media_not_found(id))?;
        let now = Utc::now();
        asset.deleted_at = Some(now);
        asset.updated_at = now;
        Ok(())
    }

    async fn restore(&self, id: Uuid) -> Result<MediaAsset, AppError> {
        let mut state = self.lock()?;
        let asset = state
            .assets
            .get_mut(&id)
            .filter(|a| a.deleted_at.is_some())
            .ok_or_else(|| AppError::NotFound(format!("Deleted media {} not found", id)))?;
        asset.deleted_at = None;
        asset.updated_at = Utc::now();
        Ok(asset.clone())
    }

    async fn hard_delete(&self, id: Uuid) -> Result<(), AppError> {
        let mut state = self.lock()?;
        if state.assets.remove(&id).is_none() {
            return Err(AppError::media_not_found(id));
        }
        state.relations.retain(|r| r.media_id != id);
        Ok(())
    }

    async fn list_soft_deleted_before(
        &self,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<MediaAsset>, AppError> {
        let state = self.lock()?;
        let mut assets: Vec<MediaAsset> = state
            .assets
            .values()
            .filter(|a| a.deleted_at.is_some_and(|at| at < cutoff))
            .cloned()
            .collect();
        assets.sort_by(|a, b| a.deleted_at.cmp(&b.deleted_at).then(a.id.cmp(&b.id)));
        assets.truncate(limit.max(0) as usize);
        Ok(assets)
    }

    async fn stats(&self) -> Result<MediaStats, AppError> {
        let state = self.lock()?;
        let live: Vec<&MediaAsset> = state
            .assets
            .values()
            .filter(|a| a.deleted_at.is_none())
            .collect();
        let uploaders: HashSet<Uuid> = live.iter().filter_map(|a| a.uploaded_by).collect();
        Ok(MediaStats {
            total_count: live.len() as i64,
            total_size_bytes: live.iter().map(|a| a.size_bytes).sum(),
            unique_uploaders: uploaders.len() as i64,
        })
    }

    async fn link_media(&self, relation: NewMediaRelation) -> Result<MediaRelation, AppError> {
        relation.validate()?;
        let mut state = self.lock()?;
        if active(&state, &relation.media_id).is_none() {
            return Err(AppError::media_not_found(relation.media_id));
        }

        if let Some(existing) = state.relations.iter_mut().find(|r| {
            r.media_id == relation.media_id
                && r.entity_type == relation.entity_type
                && r.entity_id == relation.entity_id
                && r.relation_type == relation.relation_type
        }) {
            existing.sort_order = relation.sort_order;
            return Ok(existing.clone());
        }

        let created = MediaRelation {
            id: Uuid::new_v4(),
            media_id: relation.media_id,
            entity_type: relation.entity_type,
            entity_id: relation.entity_id,
            relation_type: relation.relation_type,
            sort_order: relation.sort_order,
            created_at: Utc::now(),
        };
        state.relations.push(created.clone());
        Ok(created)
    }

    async fn unlink_media(
        &self,
        media_id: Uuid,
        entity_type: &str,
        entity_id: Uuid,
        relation_type: Option<&str>,
    ) -> Result<u64, AppError> {
        let mut state = self.lock()?;
        let before = state.relations.len();
        state.relations.retain(|r| {
            !(r.media_id == media_id
                && r.entity_type == entity_type
                && r.entity_id == entity_id
                && relation_type.map_or(true, |t| r.relation_type == t))
        });
        Ok((before - state.relations.len()) as u64)
    }

    async fn get_media_for_entity(
        &self,
        entity_type: &str,
        entity_id: Uuid,
        relation_type: Option<&str>,
    ) -> Result<Vec<LinkedMedia>, AppError> {
        let state = self.lock()?;
        let mut relations: Vec<&MediaRelation> = state
            .relations
            .iter()
            .filter(|r| {
                r.entity_type == entity_type
                    && r.entity_id == entity_id
                    && relation_type.map_or(true, |t| r.relation_type == t)
            })
            .collect();
        relations.sort_by(|a, b| {
            a.sort_order
                .cmp(&b.sort_order)
                .then(a.created_at.cmp(&b.created_at))
        });

        Ok(relations
            .into_iter()
            .filter_map(|r| {
                active(&state, &r.media_id).map(|asset| LinkedMedia {
                    asset: asset.clone(),
                    relation: r.clone(),
                })
            })
            .collect())
    }

    async fn replace_relations(
        &self,
        entity_type: &str,
        entity_id: Uuid,
        relation_type: &str,
        media_ids: &[Uuid],
    ) -> Result<Vec<MediaRelation>, AppError> {
        validate_scope(entity_type, relation_type)?;
        let ids = dedupe_ids(media_ids);
        let mut state = self.lock()?;

        // Check everything before touching the scope so a failure changes nothing.
        if let Some(missing) = ids.iter().find(|id| active(&state, id).is_none()) {
            return Err(AppError::media_not_found(missing));
        }

        state.relations.retain(|r| {
            !(r.entity_type == entity_type
                && r.entity_id == entity_id
                && r.relation_type == relation_type)
        });

        let now = Utc::now();
        let created: Vec<MediaRelation> = ids
            .iter()
            .enumerate()
            .map(|(position, media_id)| MediaRelation {
                id: Uuid::new_v4(),
                media_id: *media_id,
                entity_type: entity_type.to_string(),
                entity_id,
                relation_type: relation_type.to_string(),
                sort_order: position as i32,
                created_at: now,
            })
            .collect();
        state.relations.extend(created.iter().cloned());
        Ok(created)
    }
}

/// [`NotificationOutbox`] backed by a mutex-guarded map.
#[derive(Clone, Default)]
pub struct InMemoryNotificationOutbox {
    entries: Arc<Mutex<Vec<Notification>>>,
}

impl InMemoryNotificationOutbox {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Vec<Notification>>, AppError> {
        self.entries
            .lock()
            .map_err(|_| AppError::Internal("outbox lock poisoned".to_string()))
    }

    /// Snapshot of every entry.
    pub fn all(&self) -> Vec<Notification> {
        self.entries.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn get(&self, id: Uuid) -> Option<Notification> {
        self.all().into_iter().find(|n| n.id == id)
    }

    fn update(&self, id: Uuid, f: impl FnOnce(&mut Notification)) -> Result<(), AppError> {
        let mut entries = self.lock()?;
        let entry = entries
            .iter_mut()
            .find(|n| n.id == id)
            .ok_or_else(|| AppError::NotFound(format!("Notification {} not found", id)))?;
        f(entry);
        entry.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl NotificationOutbox for InMemoryNotificationOutbox {
    async fn enqueue(&self, notification: NewNotification) -> Result<Notification, AppError> {
        let now = Utc::now();
        let entry = Notification {
            id: Uuid::new_v4(),
            media_id: notification.media_id,
            event: notification.event,
            payload: notification.payload,
            status: NotificationStatus::Pending,
            attempts: 0,
            last_error: None,
            created_at: now,
            updated_at: now,
            sent_at: None,
        };
        self.lock()?.push(entry.clone());
        Ok(entry)
    }

    async fn fetch_retryable(
        &self,
        limit: i64,
        max_attempts: i32,
    ) -> Result<Vec<Notification>, AppError> {
        let entries = self.lock()?;
        let mut due: Vec<Notification> = entries
            .iter()
            .filter(|n| n.is_retryable(max_attempts))
            .cloned()
            .collect();
        due.sort_by_key(|n| n.created_at);
        due.truncate(limit.max(0) as usize);
        Ok(due)
    }

    async fn mark_sent(&self, id: Uuid) -> Result<(), AppError> {
        self.update(id, |n| {
            n.status = NotificationStatus::Sent;
            n.attempts += 1;
            n.last_error = None;
            n.sent_at = Some(Utc::now());
        })
    }

    async fn mark_failed(&self, id: Uuid, error: &str) -> Result<(), AppError> {
        self.update(id, |n| {
            n.status = NotificationStatus::Failed;
            n.attempts += 1;
            n.last_error = Some(error.to_string());
        })
    }
}
