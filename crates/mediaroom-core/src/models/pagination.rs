//! Wire representations returned to callers of the media service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::media::{MediaAsset, VariantKind};

const DEFAULT_LIMIT: i64 = 20;
const MAX_LIMIT: i64 = 100;

/// Page/limit pair normalised for SQL `LIMIT`/`OFFSET`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: i64,
    pub limit: i64,
}

impl Pagination {
    pub fn new(page: Option<i64>, limit: Option<i64>) -> Self {
        let page = page.unwrap_or(1).max(1);
        let limit = limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
        Self { page, limit }
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.limit)
    }

    pub fn total_pages(&self, total_count: i64) -> i64 {
        if total_count <= 0 {
            0
        } else {
            (total_count + self.limit - 1) / self.limit
        }
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self::new(None, None)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaResponse {
    pub id: Uuid,
    pub url: String,
    pub thumbnail_url: Option<String>,
    pub medium_url: Option<String>,
    pub poster_url: Option<String>,
    pub mime_type: String,
    pub size: i64,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub duration: Option<f64>,
    pub title: Option<String>,
    pub alt_text: Option<String>,
    pub sort_order: Option<i32>,
    pub created_at: DateTime<Utc>,
}

impl MediaResponse {
    pub fn from_asset(asset: &MediaAsset, sort_order: Option<i32>) -> Self {
        let url_of = |kind| asset.variant(kind).map(|v| v.url.clone());
        Self {
            id: asset.id,
            url: url_of(VariantKind::Original).unwrap_or_default(),
            thumbnail_url: url_of(VariantKind::Thumbnail),
            medium_url: url_of(VariantKind::Medium),
            poster_url: url_of(VariantKind::VideoPoster),
            mime_type: asset.mime_type.clone(),
            size: asset.size_bytes,
            width: asset.width,
            height: asset.height,
            duration: asset.duration_seconds,
            title: asset.title.clone(),
            alt_text: asset.alt_text.clone(),
            sort_order,
            created_at: asset.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginatedMedia {
    pub items: Vec<MediaResponse>,
    pub total_count: i64,
    pub total_pages: i64,
    pub page: i64,
}
