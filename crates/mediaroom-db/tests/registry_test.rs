//! Postgres registry integration tests.
//!
//! Run with: `cargo test -p mediaroom-db --test registry_test`
//! Requires Docker for testcontainers (Postgres).

mod helpers;

use chrono::{Duration, Utc};
use helpers::{create, draft, setup_test_db};
use mediaroom_core::models::{
    MediaQuery, NewMediaRelation, NewNotification, NotificationStatus, VariantKind,
    RELATION_GALLERY,
};
use mediaroom_core::{AppError, StorageBackend};
use mediaroom_db::{MediaRegistry, NotificationOutbox, PgNotificationOutbox};
use uuid::Uuid;

#[tokio::test]
async fn test_create_and_get_round_trips_variants_and_backend() {
    let db = setup_test_db().await;
    let registry = db.registry();

    let created = registry
        .create_media(draft("harbour.jpg", StorageBackend::S3))
        .await
        .unwrap();
    let fetched = registry.get_by_id(created.id).await.unwrap();

    assert_eq!(fetched.storage_backend, StorageBackend::S3);
    assert_eq!(fetched.title.as_deref(), Some("Harbour at dusk"));
    assert_eq!(fetched.variants, created.variants);
    assert!(fetched.variant(VariantKind::Original).is_some());
    assert!(fetched.deleted_at.is_none());
}

#[tokio::test]
async fn test_soft_delete_hides_and_restore_brings_back() {
    let db = setup_test_db().await;
    let registry = db.registry();
    let asset = create(&registry, "a.png").await;

    registry.soft_delete(asset.id).await.unwrap();

    assert!(matches!(
        registry.get_by_id(asset.id).await,
        Err(AppError::NotFound(_))
    ));
    assert!(registry.find_any(asset.id).await.unwrap().is_some());
    assert_eq!(registry.count_media(&MediaQuery::default()).await.unwrap(), 0);
    assert!(matches!(
        registry.soft_delete(asset.id).await,
        Err(AppError::NotFound(_))
    ));

    let restored = registry.restore(asset.id).await.unwrap();
    assert!(restored.deleted_at.is_none());
    assert!(registry.get_by_id(asset.id).await.is_ok());

    // Restoring a live asset is not a valid transition.
    assert!(matches!(
        registry.restore(asset.id).await,
        Err(AppError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_purge_listing_respects_cutoff() {
    let db = setup_test_db().await;
    let registry = db.registry();
    let now = Utc::now();
    let old = create(&registry, "old.png").await;
    let recent = create(&registry, "recent.png").await;
    let live = create(&registry, "live.png").await;
    db.set_deleted_at(old.id, now - Duration::days(31)).await;
    db.set_deleted_at(recent.id, now - Duration::days(29)).await;

    let due = registry
        .list_soft_deleted_before(now - Duration::days(30), 100)
        .await
        .unwrap();

    let ids: Vec<Uuid> = due.iter().map(|a| a.id).collect();
    assert_eq!(ids, vec![old.id]);
    assert!(!ids.contains(&live.id));

    registry.hard_delete(old.id).await.unwrap();
    assert!(registry.find_any(old.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_purge_listing_is_oldest_first_and_limited() {
    let db = setup_test_db().await;
    let registry = db.registry();
    let now = Utc::now();
    let mut expected = Vec::new();
    for days in [90, 60, 45] {
        let asset = create(&registry, "gone.png").await;
        db.set_deleted_at(asset.id, now - Duration::days(days)).await;
        expected.push(asset.id);
    }

    let due = registry.list_soft_deleted_before(now, 2).await.unwrap();

    let ids: Vec<Uuid> = due.iter().map(|a| a.id).collect();
    assert_eq!(ids, expected[..2].to_vec());
}

#[tokio::test]
async fn test_replace_relations_orders_and_dedupes() {
    let db = setup_test_db().await;
    let registry = db.registry();
    let post = Uuid::new_v4();
    let a = create(&registry, "a.png").await;
    let b = create(&registry, "b.png").await;
    let c = create(&registry, "c.png").await;

    registry
        .replace_relations("post", post, RELATION_GALLERY, &[a.id, b.id])
        .await
        .unwrap();
    let relations = registry
        .replace_relations("post", post, RELATION_GALLERY, &[c.id, a.id, c.id])
        .await
        .unwrap();

    let pairs: Vec<(Uuid, i32)> = relations.iter().map(|r| (r.media_id, r.sort_order)).collect();
    assert_eq!(pairs, vec![(c.id, 0), (a.id, 1)]);

    let linked = registry
        .get_media_for_entity("post", post, Some(RELATION_GALLERY))
        .await
        .unwrap();
    let ids: Vec<Uuid> = linked.iter().map(|l| l.asset.id).collect();
    assert_eq!(ids, vec![c.id, a.id]);
}

#[tokio::test]
async fn test_replace_relations_with_unknown_id_changes_nothing() {
    let db = setup_test_db().await;
    let registry = db.registry();
    let post = Uuid::new_v4();
    let a = create(&registry, "a.png").await;
    let b = create(&registry, "b.png").await;
    registry
        .replace_relations("post", post, RELATION_GALLERY, &[a.id])
        .await
        .unwrap();
    registry.soft_delete(b.id).await.unwrap();

    for bad in [Uuid::new_v4(), b.id] {
        let err = registry
            .replace_relations("post", post, RELATION_GALLERY, &[bad, a.id])
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    let linked = registry
        .get_media_for_entity("post", post, Some(RELATION_GALLERY))
        .await
        .unwrap();
    assert_eq!(linked.len(), 1);
    assert_eq!(linked[0].asset.id, a.id);
}

#[tokio::test]
async fn test_link_is_an_upsert_and_skips_deleted_media() {
    let db = setup_test_db().await;
    let registry = db.registry();
    let post = Uuid::new_v4();
    let asset = create(&registry, "a.png").await;
    let relation = |sort_order| NewMediaRelation {
        media_id: asset.id,
        entity_type: "post".to_string(),
        entity_id: post,
        relation_type: RELATION_GALLERY.to_string(),
        sort_order,
    };

    let first = registry.link_media(relation(3)).await.unwrap();
    let second = registry.link_media(relation(7)).await.unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(second.sort_order, 7);

    registry.soft_delete(asset.id).await.unwrap();
    assert!(registry
        .get_media_for_entity("post", post, None)
        .await
        .unwrap()
        .is_empty());
    assert!(matches!(
        registry.link_media(relation(1)).await,
        Err(AppError::NotFound(_))
    ));

    registry.restore(asset.id).await.unwrap();
    let removed = registry
        .unlink_media(asset.id, "post", post, None)
        .await
        .unwrap();
    assert_eq!(removed, 1);
}

#[tokio::test]
async fn test_mime_prefix_filter_treats_wildcards_literally() {
    let db = setup_test_db().await;
    let registry = db.registry();
    create(&registry, "a.png").await;

    let images = MediaQuery {
        mime_prefix: Some("image/".to_string()),
        ..Default::default()
    };
    let wildcard = MediaQuery {
        mime_prefix: Some("%".to_string()),
        ..Default::default()
    };

    assert_eq!(registry.count_media(&images).await.unwrap(), 1);
    assert_eq!(registry.count_media(&wildcard).await.unwrap(), 0);
    assert_eq!(
        registry.list_paginated(&images, 10, 0).await.unwrap().len(),
        1
    );
}

#[tokio::test]
async fn test_outbox_retry_bookkeeping() {
    let db = setup_test_db().await;
    let registry = db.registry();
    let outbox = PgNotificationOutbox::new(db.pool.clone());
    let asset = create(&registry, "a.png").await;

    let entry = outbox
        .enqueue(NewNotification {
            media_id: asset.id,
            event: "media.uploaded".to_string(),
            payload: serde_json::json!({ "media_id": asset.id }),
        })
        .await
        .unwrap();
    assert_eq!(entry.status, NotificationStatus::Pending);

    outbox.mark_failed(entry.id, "timeout").await.unwrap();
    let retryable = outbox.fetch_retryable(10, 2).await.unwrap();
    assert_eq!(retryable.len(), 1);
    assert_eq!(retryable[0].attempts, 1);
    assert_eq!(retryable[0].last_error.as_deref(), Some("timeout"));

    outbox.mark_failed(entry.id, "timeout").await.unwrap();
    assert!(outbox.fetch_retryable(10, 2).await.unwrap().is_empty());

    outbox.mark_sent(entry.id).await.unwrap();
    assert!(outbox.fetch_retryable(10, 5).await.unwrap().is_empty());
    assert!(matches!(
        outbox.mark_sent(Uuid::new_v4()).await,
        Err(AppError::NotFound(_))
    ));
}
