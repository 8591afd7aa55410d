//! Permanent removal of media assets.

use futures::stream::{self, StreamExt};
use mediaroom_core::models::MediaAsset;
use mediaroom_core::AppError;
use mediaroom_db::MediaRegistry;
use mediaroom_storage::Storage;
use std::sync::Arc;

const CONCURRENT_DELETES: usize = 8;

/// Storage keys handled during one hard delete.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReapOutcome {
    pub keys_deleted: usize,
    pub keys_failed: usize,
}

/// Removes the registry row first, then every stored variant.
///
/// A storage failure leaves an orphaned object behind and is only logged;
/// the row is already gone by then.
#[derive(Clone)]
pub struct AssetReaper {
    registry: Arc<dyn MediaRegistry>,
    storage: Arc<dyn Storage>,
}

impl AssetReaper {
    pub fn new(registry: Arc<dyn MediaRegistry>, storage: Arc<dyn Storage>) -> Self {
        Self { registry, storage }
    }

    #[tracing::instrument(skip(self, asset), fields(media_id = %asset.id))]
    pub async fn hard_delete(&self, asset: &MediaAsset) -> Result<ReapOutcome, AppError> {
        self.registry.hard_delete(asset.id).await?;

        let deletes: Vec<_> = asset
            .storage_keys()
            .into_iter()
            .map(|key| delete_key(self.storage.clone(), key))
            .collect();
        let results: Vec<bool> = stream::iter(deletes)
            .buffer_unordered(CONCURRENT_DELETES)
            .collect()
            .await;

        let outcome = ReapOutcome {
            keys_deleted: results.iter().filter(|ok| **ok).count(),
            keys_failed: results.iter().filter(|ok| !**ok).count(),
        };

        tracing::info!(
            keys_deleted = outcome.keys_deleted,
            keys_failed = outcome.keys_failed,
            "Media permanently deleted"
        );
        Ok(outcome)
    }
}

async fn delete_key(storage: Arc<dyn Storage>, key: &str) -> bool {
    match storage.delete(key).await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(
                error = %e,
                storage_key = %key,
                "Failed to delete stored variant, object orphaned"
            );
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::MockStorage;
    use mediaroom_core::models::{NewMediaAsset, Variant, VariantKind};
    use mediaroom_core::StorageBackend;
    use mediaroom_db::InMemoryMediaRegistry;

    async fn stored_asset(registry: &InMemoryMediaRegistry, storage: &MockStorage) -> MediaAsset {
        let mut variants = Vec::new();
        for (kind, name) in [
            (VariantKind::Original, "a.webp"),
            (VariantKind::Thumbnail, "a_thumb.webp"),
        ] {
            let uploaded = storage
                .upload(
                    Box::pin(std::io::Cursor::new(b"bytes".to_vec())),
                    name,
                    "image/webp",
                    None,
                    true,
                )
                .await
                .unwrap();
            variants.push(Variant {
                kind,
                key: uploaded.key,
                url: uploaded.url,
                content_type: "image/webp".to_string(),
                width: Some(10),
                height: Some(10),
                size_bytes: 5,
            });
        }

        registry
            .create_media(NewMediaAsset {
                original_filename: "a.png".to_string(),
                mime_type: "image/webp".to_string(),
                size_bytes: 5,
                storage_backend: StorageBackend::Local,
                width: Some(10),
                height: Some(10),
                duration_seconds: None,
                title: None,
                alt_text: None,
                uploaded_by: None,
                variants,
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_hard_delete_removes_every_key_then_not_found() {
        let registry = InMemoryMediaRegistry::new();
        let storage = Arc::new(MockStorage::new());
        let asset = stored_asset(&registry, &storage).await;
        let reaper = AssetReaper::new(Arc::new(registry.clone()), storage.clone());

        let outcome = reaper.hard_delete(&asset).await.unwrap();

        assert_eq!(outcome.keys_deleted, 2);
        assert!(storage.keys().is_empty());
        assert!(matches!(
            registry.get_by_id(asset.id).await.unwrap_err(),
            AppError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_storage_failure_does_not_block_row_removal() {
        let registry = InMemoryMediaRegistry::new();
        let storage = Arc::new(MockStorage::new().fail_deletes());
        let asset = stored_asset(&registry, &storage).await;
        let reaper = AssetReaper::new(Arc::new(registry.clone()), storage.clone());

        let outcome = reaper.hard_delete(&asset).await.unwrap();

        assert_eq!(outcome.keys_failed, 2);
        assert!(registry.find_any(asset.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_registry_failure_keeps_objects() {
        let registry = InMemoryMediaRegistry::new();
        let storage = Arc::new(MockStorage::new());
        let asset = stored_asset(&registry, &storage).await;
        registry.hard_delete(asset.id).await.unwrap();
        let reaper = AssetReaper::new(Arc::new(registry.clone()), storage.clone());

        let err = reaper.hard_delete(&asset).await.unwrap_err();

        assert!(matches!(err, AppError::NotFound(_)));
        assert_eq!(storage.keys().len(), 2);
        assert!(storage.deleted().is_empty());
    }
}
