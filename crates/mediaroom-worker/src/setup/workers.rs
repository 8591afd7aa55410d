//! Job construction from configuration

use anyhow::{Context, Result};
use mediaroom_core::Config;
use mediaroom_db::{MediaRegistry, NotificationOutbox, PgMediaRegistry, PgNotificationOutbox};
use mediaroom_infra::{LogNotifier, Notifier, WebhookNotifier};
use mediaroom_services::{AssetReaper, NotificationDispatcher};
use mediaroom_worker::{PeriodicWorker, PurgeConfig, PurgeWorker, RetryConfig, RetryWorker};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn notifier(config: &Config) -> Result<Arc<dyn Notifier>> {
    match WebhookNotifier::from_config(&config.notifications)? {
        Some(webhook) => {
            tracing::info!(url = %webhook.url(), "Delivering notifications to webhook");
            Ok(Arc::new(webhook))
        }
        None => {
            tracing::info!("No webhook configured, notifications are logged only");
            Ok(Arc::new(LogNotifier))
        }
    }
}

/// Start every enabled worker under `shutdown`.
pub async fn start_workers(
    config: &Config,
    pool: PgPool,
    shutdown: &CancellationToken,
) -> Result<Vec<PeriodicWorker>> {
    let registry: Arc<dyn MediaRegistry> = Arc::new(PgMediaRegistry::new(pool.clone()));
    let outbox: Arc<dyn NotificationOutbox> = Arc::new(PgNotificationOutbox::new(pool));

    let dispatcher = NotificationDispatcher::new(outbox, notifier(config)?);
    let mut workers = vec![PeriodicWorker::start(
        Arc::new(RetryWorker::new(dispatcher, RetryConfig::from(&config.workers))),
        Duration::from_secs(config.workers.retry_interval_secs),
        shutdown,
    )];

    if config.workers.purge_enabled {
        let storage = mediaroom_storage::create_storage(&config.storage)
            .await
            .context("Failed to initialize storage")?;
        let reaper = AssetReaper::new(registry.clone(), storage);
        workers.push(PeriodicWorker::start(
            Arc::new(PurgeWorker::new(
                registry,
                reaper,
                PurgeConfig::from(&config.workers),
            )),
            Duration::from_secs(config.workers.purge_interval_secs),
            shutdown,
        ));
        tracing::info!(
            retention_days = config.workers.purge_retention_days,
            "Auto-purge enabled"
        );
    } else {
        tracing::info!("Auto-purge disabled");
    }

    Ok(workers)
}
