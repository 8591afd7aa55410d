use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::AppError;
use crate::storage_types::StorageBackend;

/// Named representation of a media asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariantKind {
    Original,
    Thumbnail,
    Medium,
    VideoPoster,
}

impl VariantKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            VariantKind::Original => "original",
            VariantKind::Thumbnail => "thumbnail",
            VariantKind::Medium => "medium",
            VariantKind::VideoPoster => "video_poster",
        }
    }
}

impl fmt::Display for VariantKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One stored representation, owned by exactly one asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variant {
    pub kind: VariantKind,
    pub key: String,
    pub url: String,
    pub content_type: String,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub size_bytes: i64,
}

/// Persisted media record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaAsset {
    pub id: Uuid,
    pub original_filename: String,
    pub mime_type: String,
    pub size_bytes: i64,
    pub storage_backend: StorageBackend,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub duration_seconds: Option<f64>,
    pub title: Option<String>,
    pub alt_text: Option<String>,
    pub uploaded_by: Option<Uuid>,
    pub variants: Vec<Variant>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl MediaAsset {
    pub fn variant(&self, kind: VariantKind) -> Option<&Variant> {
        self.variants.iter().find(|v| v.kind == kind)
    }

    pub fn original(&self) -> Option<&Variant> {
        self.variant(VariantKind::Original)
    }

    /// Every storage key this asset knows about.
    pub fn storage_keys(&self) -> Vec<&str> {
        self.variants.iter().map(|v| v.key.as_str()).collect()
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn is_video(&self) -> bool {
        self.mime_type.starts_with("video/")
    }
}

/// Draft asset handed to the registry after all uploads succeeded.
#[derive(Debug, Clone)]
pub struct NewMediaAsset {
    pub original_filename: String,
    pub mime_type: String,
    pub size_bytes: i64,
    pub storage_backend: StorageBackend,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub duration_seconds: Option<f64>,
    pub title: Option<String>,
    pub alt_text: Option<String>,
    pub uploaded_by: Option<Uuid>,
    pub variants: Vec<Variant>,
}

impl NewMediaAsset {
    /// Exactly one original, no kind twice.
    pub fn validate(&self) -> Result<(), AppError> {
        let originals = self
            .variants
            .iter()
            .filter(|v| v.kind == VariantKind::Original)
            .count();
        if originals != 1 {
            return Err(AppError::Validation(format!(
                "Media asset must have exactly one original variant, found {}",
                originals
            )));
        }

        for (i, variant) in self.variants.iter().enumerate() {
            if self.variants[..i].iter().any(|v| v.kind == variant.kind) {
                return Err(AppError::Validation(format!(
                    "Duplicate {} variant",
                    variant.kind
                )));
            }
        }

        if self.original_filename.trim().is_empty() {
            return Err(AppError::Validation("Original filename is required".to_string()));
        }

        Ok(())
    }

    pub fn storage_keys(&self) -> Vec<&str> {
        self.variants.iter().map(|v| v.key.as_str()).collect()
    }
}

/// Optional list filters.
#[derive(Debug, Clone, Default)]
pub struct MediaQuery {
    /// Prefix match on the MIME type, e.g. `image/`
    pub mime_prefix: Option<String>,
    pub uploaded_by: Option<Uuid>,
}

impl MediaQuery {
    pub fn matches(&self, asset: &MediaAsset) -> bool {
        let mime_ok = self
            .mime_prefix
            .as_deref()
            .map_or(true, |prefix| asset.mime_type.starts_with(prefix));
        let uploader_ok = self
            .uploaded_by
            .map_or(true, |uploader| asset.uploaded_by == Some(uploader));
        mime_ok && uploader_ok
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaStats {
    pub total_count: i64,
    pub total_size_bytes: i64,
    pub unique_uploaders: i64,
}
