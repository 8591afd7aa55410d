use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::media::MediaAsset;
use crate::error::AppError;

pub const RELATION_FEATURED: &str = "featured";
pub const RELATION_GALLERY: &str = "gallery";

/// Link between a media asset and an external content entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct MediaRelation {
    pub id: Uuid,
    pub media_id: Uuid,
    pub entity_type: String,
    pub entity_id: Uuid,
    pub relation_type: String,
    pub sort_order: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewMediaRelation {
    pub media_id: Uuid,
    pub entity_type: String,
    pub entity_id: Uuid,
    pub relation_type: String,
    pub sort_order: i32,
}

impl NewMediaRelation {
    pub fn validate(&self) -> Result<(), AppError> {
        validate_scope(&self.entity_type, &self.relation_type)
    }
}

/// Entity type and relation type must be non-empty identifiers.
pub fn validate_scope(entity_type: &str, relation_type: &str) -> Result<(), AppError> {
    if entity_type.trim().is_empty() {
        return Err(AppError::Validation("entity_type is required".to_string()));
    }
    if relation_type.trim().is_empty() {
        return Err(AppError::Validation("relation_type is required".to_string()));
    }
    Ok(())
}

/// A media asset together with the relation that links it to an entity.
#[derive(Debug, Clone)]
pub struct LinkedMedia {
    pub asset: MediaAsset,
    pub relation: MediaRelation,
}
