//! Permanent removal of media soft-deleted longer than the retention window.

use crate::periodic::{PeriodicJob, RunSummary};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use mediaroom_core::WorkerConfig;
use mediaroom_db::MediaRegistry;
use mediaroom_services::AssetReaper;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Purge worker settings.
#[derive(Debug, Clone, Copy)]
pub struct PurgeConfig {
    pub retention_days: i64,
    pub batch_size: i64,
}

impl Default for PurgeConfig {
    fn default() -> Self {
        Self {
            retention_days: 30,
            batch_size: 100,
        }
    }
}

impl From<&WorkerConfig> for PurgeConfig {
    fn from(config: &WorkerConfig) -> Self {
        Self {
            retention_days: config.purge_retention_days,
            batch_size: config.purge_batch_size,
        }
    }
}

pub struct PurgeWorker {
    registry: Arc<dyn MediaRegistry>,
    reaper: AssetReaper,
    config: PurgeConfig,
}

impl PurgeWorker {
    pub fn new(registry: Arc<dyn MediaRegistry>, reaper: AssetReaper, config: PurgeConfig) -> Self {
        Self {
            registry,
            reaper,
            config,
        }
    }

    /// Assets deleted strictly before this instant are eligible.
    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - Duration::days(self.config.retention_days)
    }

    /// One purge pass against a fixed `now`.
    pub async fn purge_before(
        &self,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> anyhow::Result<RunSummary> {
        let cutoff = self.cutoff(now);
        let mut summary = RunSummary::default();

        loop {
            if cancel.is_cancelled() {
                break;
            }

            let batch = self
                .registry
                .list_soft_deleted_before(cutoff, self.config.batch_size)
                .await?;
            let full_batch = batch.len() as i64 >= self.config.batch_size;

            let mut pass = RunSummary::default();
            for asset in &batch {
                if cancel.is_cancelled() {
                    break;
                }
                match self.reaper.hard_delete(asset).await {
                    Ok(_) => pass.record(true),
                    Err(e) => {
                        tracing::error!(
                            error = %e,
                            media_id = %asset.id,
                            "Failed to purge media"
                        );
                        pass.record(false);
                    }
                }
            }
            summary.merge(pass);

            // Failed rows are fetched again; stop once a batch makes no progress.
            if !full_batch || pass.succeeded == 0 {
                break;
            }
        }

        if summary.attempted == 0 {
            tracing::info!(cutoff = %cutoff, "No media to purge");
        } else {
            tracing::info!(
                cutoff = %cutoff,
                purged = summary.succeeded,
                failed = summary.failed,
                "Purge pass finished"
            );
        }

        Ok(summary)
    }
}

#[async_trait]
impl PeriodicJob for PurgeWorker {
    fn name(&self) -> &'static str {
        "media_purge"
    }

    async fn run_once(&self, cancel: &CancellationToken) -> anyhow::Result<RunSummary> {
        self.purge_before(Utc::now(), cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mediaroom_core::models::{MediaAsset, NewMediaAsset, Variant, VariantKind};
    use mediaroom_core::StorageBackend;
    use mediaroom_db::InMemoryMediaRegistry;
    use mediaroom_services::test_helpers::MockStorage;
    use mediaroom_storage::Storage;

    async fn deleted_asset(
        registry: &InMemoryMediaRegistry,
        storage: &MockStorage,
        deleted_at: DateTime<Utc>,
    ) -> MediaAsset {
        let uploaded = storage
            .upload(
                Box::pin(std::io::Cursor::new(b"webp".to_vec())),
                "photo.webp",
                "image/webp",
                None,
                true,
            )
            .await
            .unwrap();
        let asset = registry
            .create_media(NewMediaAsset {
                original_filename: "photo.jpg".to_string(),
                mime_type: "image/webp".to_string(),
                size_bytes: 4,
                storage_backend: StorageBackend::Local,
                width: Some(8),
                height: Some(8),
                duration_seconds: None,
                title: None,
                alt_text: None,
                uploaded_by: None,
                variants: vec![Variant {
                    kind: VariantKind::Original,
                    key: uploaded.key,
                    url: uploaded.url,
                    content_type: "image/webp".to_string(),
                    width: Some(8),
                    height: Some(8),
                    size_bytes: 4,
                }],
            })
            .await
            .unwrap();
        registry.set_deleted_at(asset.id, Some(deleted_at));
        asset
    }

    fn worker(
        registry: &InMemoryMediaRegistry,
        storage: Arc<MockStorage>,
        config: PurgeConfig,
    ) -> PurgeWorker {
        let registry: Arc<dyn MediaRegistry> = Arc::new(registry.clone());
        PurgeWorker::new(
            registry.clone(),
            AssetReaper::new(registry, storage),
            config,
        )
    }

    #[tokio::test]
    async fn test_purges_only_past_retention() {
        let registry = InMemoryMediaRegistry::new();
        let storage = Arc::new(MockStorage::new());
        let now = Utc::now();
        let config = PurgeConfig {
            retention_days: 30,
            batch_size: 100,
        };
        let old = deleted_asset(&registry, &storage, now - Duration::days(31)).await;
        let recent = deleted_asset(&registry, &storage, now - Duration::days(29)).await;

        let summary = worker(&registry, storage.clone(), config)
            .purge_before(now, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(summary.succeeded, 1);
        assert!(registry.find_any(old.id).await.unwrap().is_none());
        assert!(registry.find_any(recent.id).await.unwrap().is_some());
        assert!(!storage.contains(&old.variants[0].key));
        assert!(storage.contains(&recent.variants[0].key));
    }

    #[tokio::test]
    async fn test_live_media_is_never_purged() {
        let registry = InMemoryMediaRegistry::new();
        let storage = Arc::new(MockStorage::new());
        let asset = deleted_asset(&registry, &storage, Utc::now()).await;
        registry.set_deleted_at(asset.id, None);

        let summary = worker(&registry, storage, PurgeConfig::default())
            .purge_before(Utc::now() + Duration::days(365), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(summary.attempted, 0);
        assert!(registry.get_by_id(asset.id).await.is_ok());
    }

    #[tokio::test]
    async fn test_empty_registry_is_a_no_op() {
        let registry = InMemoryMediaRegistry::new();
        let summary = worker(&registry, Arc::new(MockStorage::new()), PurgeConfig::default())
            .run_once(&CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(summary, RunSummary::default());
    }

    #[tokio::test]
    async fn test_drains_multiple_batches() {
        let registry = InMemoryMediaRegistry::new();
        let storage = Arc::new(MockStorage::new());
        let now = Utc::now();
        for _ in 0..5 {
            deleted_asset(&registry, &storage, now - Duration::days(40)).await;
        }
        let config = PurgeConfig {
            retention_days: 30,
            batch_size: 2,
        };

        let summary = worker(&registry, storage.clone(), config)
            .purge_before(now, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(summary.succeeded, 5);
        assert!(registry.is_empty());
        assert!(storage.keys().is_empty());
    }

    #[tokio::test]
    async fn test_storage_failures_still_remove_rows() {
        let registry = InMemoryMediaRegistry::new();
        let storage = Arc::new(MockStorage::new().fail_deletes());
        let now = Utc::now();
        let asset = deleted_asset(&registry, &storage, now - Duration::days(60)).await;

        let summary = worker(&registry, storage.clone(), PurgeConfig::default())
            .purge_before(now, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(summary.succeeded, 1);
        assert!(registry.find_any(asset.id).await.unwrap().is_none());
        assert!(storage.contains(&asset.variants[0].key));
    }

    #[tokio::test]
    async fn test_cancelled_pass_purges_nothing() {
        let registry = InMemoryMediaRegistry::new();
        let storage = Arc::new(MockStorage::new());
        let now = Utc::now();
        let asset = deleted_asset(&registry, &storage, now - Duration::days(90)).await;
        let cancel = CancellationToken::new();
        cancel.cancel();

        let summary = worker(&registry, storage, PurgeConfig::default())
            .purge_before(now, &cancel)
            .await
            .unwrap();

        assert_eq!(summary.attempted, 0);
        assert!(registry.find_any(asset.id).await.unwrap().is_some());
    }

    #[test]
    fn test_cutoff_subtracts_retention_days() {
        let registry = InMemoryMediaRegistry::new();
        let worker = worker(&registry, Arc::new(MockStorage::new()), PurgeConfig::default());
        let now = Utc::now();

        assert_eq!(worker.cutoff(now), now - Duration::days(30));
    }
}
