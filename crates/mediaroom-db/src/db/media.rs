use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mediaroom_core::models::{
    validate_scope, LinkedMedia, MediaAsset, MediaQuery, MediaRelation, MediaStats,
    NewMediaAsset, NewMediaRelation, Variant,
};
use mediaroom_core::{AppError, StorageBackend};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

use super::traits::{dedupe_ids, MediaRegistry};
use super::transaction::TransactionGuard;

const FOREIGN_KEY_VIOLATION: &str = "23503";

#[derive(Debug, sqlx::FromRow)]
struct MediaAssetRow {
    id: Uuid,
    original_filename: String,
    mime_type: String,
    size_bytes: i64,
    storage_backend: StorageBackend,
    width: Option<i32>,
    height: Option<i32>,
    duration_seconds: Option<f64>,
    title: Option<String>,
    alt_text: Option<String>,
    uploaded_by: Option<Uuid>,
    variants: Json<Vec<Variant>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl From<MediaAssetRow> for MediaAsset {
    fn from(row: MediaAssetRow) -> Self {
        MediaAsset {
            id: row.id,
            original_filename: row.original_filename,
            mime_type: row.mime_type,
            size_bytes: row.size_bytes,
            storage_backend: row.storage_backend,
            width: row.width,
            height: row.height,
            duration_seconds: row.duration_seconds,
            title: row.title,
            alt_text: row.alt_text,
            uploaded_by: row.uploaded_by,
            variants: row.variants.0,
            created_at: row.created_at,
            updated_at: row.updated_at,
            deleted_at: row.deleted_at,
        }
    }
}

/// Asset columns plus the relation that matched, from one join.
#[derive(Debug, sqlx::FromRow)]
struct LinkedMediaRow {
    #[sqlx(flatten)]
    asset: MediaAssetRow,
    relation_id: Uuid,
    entity_type: String,
    entity_id: Uuid,
    relation_type: String,
    sort_order: i32,
    relation_created_at: DateTime<Utc>,
}

impl From<LinkedMediaRow> for LinkedMedia {
    fn from(row: LinkedMediaRow) -> Self {
        let relation = MediaRelation {
            id: row.relation_id,
            media_id: row.asset.id,
            entity_type: row.entity_type,
            entity_id: row.entity_id,
            relation_type: row.relation_type,
            sort_order: row.sort_order,
            created_at: row.relation_created_at,
        };
        LinkedMedia {
            asset: row.asset.into(),
            relation,
        }
    }
}

/// `LIKE` pattern matching values that start with `prefix`.
fn like_prefix(prefix: &str) -> String {
    let escaped = prefix
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("{}%", escaped)
}

fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some(FOREIGN_KEY_VIOLATION))
}

/// Postgres-backed [`MediaRegistry`]
#[derive(Clone)]
pub struct PgMediaRegistry {
    pool: PgPool,
}

impl PgMediaRegistry {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MediaRegistry for PgMediaRegistry {
    #[tracing::instrument(skip(self, draft), fields(db.table = "media_assets", db.operation = "insert"))]
    async fn create_media(&self, draft: NewMediaAsset) -> Result<MediaAsset, AppError> {
        draft.validate()?;

        let row = sqlx::query_as::<Postgres, MediaAssetRow>(
            r#"
            INSERT INTO media_assets (
                id, original_filename, mime_type, size_bytes, storage_backend,
                width, height, duration_seconds, title, alt_text, uploaded_by, variants
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&draft.original_filename)
        .bind(&draft.mime_type)
        .bind(draft.size_bytes)
        .bind(draft.storage_backend)
        .bind(draft.width)
        .bind(draft.height)
        .bind(draft.duration_seconds)
        .bind(&draft.title)
        .bind(&draft.alt_text)
        .bind(draft.uploaded_by)
        .bind(Json(&draft.variants))
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }

    #[tracing::instrument(skip(self), fields(db.table = "media_assets", db.operation = "select", db.record_id = %id))]
    async fn get_by_id(&self, id: Uuid) -> Result<MediaAsset, AppError> {
        let row = sqlx::query_as::<Postgres, MediaAssetRow>(
            "SELECT * FROM media_assets WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Into::into)
            .ok_or_else(|| AppError::media_not_found(id))
    }

    #[tracing::instrument(skip(self), fields(db.table = "media_assets", db.operation = "select", db.record_id = %id))]
    async fn find_any(&self, id: Uuid) -> Result<Option<MediaAsset>, AppError> {
        let row = sqlx::query_as::<Postgres, MediaAssetRow>(
            "SELECT * FROM media_assets WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    #[tracing::instrument(skip(self), fields(db.table = "media_assets", db.operation = "select"))]
    async fn list_paginated(
        &self,
        query: &MediaQuery,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<MediaAsset>, AppError> {
        let rows = sqlx::query_as::<Postgres, MediaAssetRow>(
            r#"
            SELECT * FROM media_assets
            WHERE deleted_at IS NULL
              AND ($1::TEXT IS NULL OR mime_type LIKE $1 ESCAPE '\')
              AND ($2::UUID IS NULL OR uploaded_by = $2)
            ORDER BY created_at DESC, id DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(query.mime_prefix.as_deref().map(like_prefix))
        .bind(query.uploaded_by)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[tracing::instrument(skip(self), fields(db.table = "media_assets", db.operation = "count"))]
    async fn count_media(&self, query: &MediaQuery) -> Result<i64, AppError> {
        let count: i64 = sqlx::query_scalar::<Postgres, i64>(
            r#"
            SELECT COUNT(*) FROM media_assets
            WHERE deleted_at IS NULL
              AND ($1::TEXT IS NULL OR mime_type LIKE $1 ESCAPE '\')
              AND ($2::UUID IS NULL OR uploaded_by = $2)
            "#,
        )
        .bind(query.mime_prefix.as_deref().map(like_prefix))
        .bind(query.uploaded_by)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    #[tracing::instrument(skip(self, alt_text), fields(db.table = "media_assets", db.operation = "update", db.record_id = %id))]
    async fn update_alt_text(
        &self,
        id: Uuid,
        alt_text: Option<String>,
    ) -> Result<MediaAsset, AppError> {
        let row = sqlx::query_as::<Postgres, MediaAssetRow>(
            r#"
            UPDATE media_assets
            SET alt_text = $2, updated_at = NOW()
            WHERE id = $1 AND deleted_at IS NULL
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&alt_text)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Into::into)
            .ok_or_else(|| AppError::media_not_found(id))
    }

    #[tracing::instrument(skip(self), fields(db.table = "media_assets", db.operation = "soft_delete", db.record_id = %id))]
    async fn soft_delete(&self, id: Uuid) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            UPDATE media_assets
            SET deleted_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::media_not_found(id));
        }
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(db.table = "media_assets", db.operation = "restore", db.record_id = %id))]
    async fn restore(&self, id: Uuid) -> Result<MediaAsset, AppError> {
        let row = sqlx::query_as::<Postgres, MediaAssetRow>(
            r#"
            UPDATE media_assets
            SET deleted_at = NULL, updated_at = NOW()
            WHERE id = $1 AND deleted_at IS NOT NULL
            RETURNING *
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Into::into)
            .ok_or_else(|| AppError::NotFound(format!("Deleted media {} not found", id)))
    }

    #[tracing::instrument(skip(self), fields(db.table = "media_assets", db.operation = "delete", db.record_id = %id))]
    async fn hard_delete(&self, id: Uuid) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM media_assets WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::media_not_found(id));
        }
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(db.table = "media_assets", db.operation = "select"))]
    async fn list_soft_deleted_before(
        &self,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<MediaAsset>, AppError> {
        let rows = sqlx::query_as::<Postgres, MediaAssetRow>(
            r#"
            SELECT * FROM media_assets
            WHERE deleted_at IS NOT NULL AND deleted_at < $1
            ORDER BY deleted_at ASC, id ASC
            LIMIT $2
            "#,
        )
        .bind(cutoff)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[tracing::instrument(skip(self), fields(db.table = "media_assets", db.operation = "aggregate"))]
    async fn stats(&self) -> Result<MediaStats, AppError> {
        let (total_count, total_size_bytes, unique_uploaders) =
            sqlx::query_as::<Postgres, (i64, i64, i64)>(
                r#"
                SELECT
                    COUNT(*)::BIGINT,
                    COALESCE(SUM(size_bytes), 0)::BIGINT,
                    COUNT(DISTINCT uploaded_by)::BIGINT
                FROM media_assets
                WHERE deleted_at IS NULL
                "#,
            )
            .fetch_one(&self.pool)
            .await?;

        Ok(MediaStats {
            total_count,
            total_size_bytes,
            unique_uploaders,
        })
    }

    #[tracing::instrument(skip(self, relation), fields(db.table = "media_relations", db.operation = "upsert", media_id = %relation.media_id))]
    async fn link_media(&self, relation: NewMediaRelation) -> Result<MediaRelation, AppError> {
        relation.validate()?;

        // The asset must exist and be active; the upsert keeps the tuple unique.
        let linked = sqlx::query_as::<Postgres, MediaRelation>(
            r#"
            INSERT INTO media_relations (id, media_id, entity_type, entity_id, relation_type, sort_order)
            SELECT $1, $2, $3, $4, $5, $6
            WHERE EXISTS (SELECT 1 FROM media_assets WHERE id = $2 AND deleted_at IS NULL)
            ON CONFLICT (media_id, entity_type, entity_id, relation_type)
            DO UPDATE SET sort_order = EXCLUDED.sort_order
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(relation.media_id)
        .bind(&relation.entity_type)
        .bind(relation.entity_id)
        .bind(&relation.relation_type)
        .bind(relation.sort_order)
        .fetch_optional(&self.pool)
        .await;

        match linked {
            Ok(Some(linked)) => Ok(linked),
            Ok(None) => Err(AppError::media_not_found(relation.media_id)),
            Err(e) if is_foreign_key_violation(&e) => {
                Err(AppError::media_not_found(relation.media_id))
            }
            Err(e) => Err(e.into()),
        }
    }

    #[tracing::instrument(skip(self), fields(db.table = "media_relations", db.operation = "delete"))]
    async fn unlink_media(
        &self,
        media_id: Uuid,
        entity_type: &str,
        entity_id: Uuid,
        relation_type: Option<&str>,
    ) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            DELETE FROM media_relations
            WHERE media_id = $1 AND entity_type = $2 AND entity_id = $3
              AND ($4::TEXT IS NULL OR relation_type = $4)
            "#,
        )
        .bind(media_id)
        .bind(entity_type)
        .bind(entity_id)
        .bind(relation_type)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    #[tracing::instrument(skip(self), fields(db.table = "media_relations", db.operation = "select"))]
    async fn get_media_for_entity(
        &self,
        entity_type: &str,
        entity_id: Uuid,
        relation_type: Option<&str>,
    ) -> Result<Vec<LinkedMedia>, AppError> {
        let rows = sqlx::query_as::<Postgres, LinkedMediaRow>(
            r#"
            SELECT m.*,
                   r.id AS relation_id,
                   r.entity_type,
                   r.entity_id,
                   r.relation_type,
                   r.sort_order,
                   r.created_at AS relation_created_at
            FROM media_relations r
            JOIN media_assets m ON m.id = r.media_id
            WHERE r.entity_type = $1 AND r.entity_id = $2
              AND ($3::TEXT IS NULL OR r.relation_type = $3)
              AND m.deleted_at IS NULL
            ORDER BY r.sort_order ASC, r.created_at ASC
            "#,
        )
        .bind(entity_type)
        .bind(entity_id)
        .bind(relation_type)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[tracing::instrument(skip(self, media_ids), fields(db.table = "media_relations", db.operation = "replace", count = media_ids.len()))]
    async fn replace_relations(
        &self,
        entity_type: &str,
        entity_id: Uuid,
        relation_type: &str,
        media_ids: &[Uuid],
    ) -> Result<Vec<MediaRelation>, AppError> {
        validate_scope(entity_type, relation_type)?;
        let ids = dedupe_ids(media_ids);

        let mut tx = TransactionGuard::begin(&self.pool, "replace_relations").await?;

        let active: Vec<Uuid> = sqlx::query_scalar::<Postgres, Uuid>(
            "SELECT id FROM media_assets WHERE id = ANY($1) AND deleted_at IS NULL FOR SHARE",
        )
        .bind(&ids)
        .fetch_all(&mut **tx)
        .await?;

        if let Some(missing) = ids.iter().find(|id| !active.contains(id)) {
            tx.rollback().await?;
            return Err(AppError::media_not_found(missing));
        }

        sqlx::query(
            r#"
            DELETE FROM media_relations
            WHERE entity_type = $1 AND entity_id = $2 AND relation_type = $3
            "#,
        )
        .bind(entity_type)
        .bind(entity_id)
        .bind(relation_type)
        .execute(&mut **tx)
        .await?;

        let mut relations = Vec::with_capacity(ids.len());
        for (position, media_id) in ids.iter().enumerate() {
            let relation = sqlx::query_as::<Postgres, MediaRelation>(
                r#"
                INSERT INTO media_relations (id, media_id, entity_type, entity_id, relation_type, sort_order)
                VALUES ($1, $2, $3, $4, $5, $6)
                RETURNING *
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(media_id)
            .bind(entity_type)
            .bind(entity_id)
            .bind(relation_type)
            .bind(position as i32)
            .fetch_one(&mut **tx)
            .await?;
            relations.push(relation);
        }

        tx.commit().await?;

        tracing::debug!(
            entity_type,
            %entity_id,
            relation_type,
            count = relations.len(),
            "Relations replaced"
        );

        Ok(relations)
    }
}
