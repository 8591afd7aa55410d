//! Shared key generation for storage backends.
//!
//! Key format: `media/{stored_name}`.

use crate::traits::{StorageError, StorageResult};
use uuid::Uuid;

pub const KEY_PREFIX: &str = "media";

const MAX_EXTENSION_LEN: usize = 10;
const MAX_NAME_LEN: usize = 200;

/// Storage key for a stored name.
pub fn storage_key(stored_name: &str) -> String {
    format!("{}/{}", KEY_PREFIX, stored_name)
}

/// Lowercased, alphanumeric-only extension of `filename`, if any.
pub fn extension(filename: &str) -> Option<String> {
    let base = base_name(filename);
    let (stem, ext) = base.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() || ext.len() > MAX_EXTENSION_LEN {
        return None;
    }
    if !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Collision-resistant name: `{uuid}.{ext}`.
pub fn unique_name(filename: &str) -> String {
    let id = Uuid::new_v4().simple();
    match extension(filename) {
        Some(ext) => format!("{}.{}", id, ext),
        None => id.to_string(),
    }
}

/// Strip directories and replace anything outside `[A-Za-z0-9._-]`.
pub fn sanitize_filename(filename: &str) -> String {
    let cleaned: String = base_name(filename)
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    let cleaned: String = cleaned.chars().take(MAX_NAME_LEN).collect();
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned
    }
}

/// Name an upload will be stored under.
pub fn stored_name(filename: &str, generate_unique_name: bool) -> String {
    if generate_unique_name {
        unique_name(filename)
    } else {
        sanitize_filename(filename)
    }
}

/// Reject keys that could escape the storage root.
pub fn validate_key(storage_key: &str) -> StorageResult<()> {
    if storage_key.is_empty()
        || storage_key.starts_with('/')
        || storage_key.contains('\\')
        || storage_key.split('/').any(|segment| segment == ".." || segment == ".")
        || storage_key.contains('\0')
    {
        return Err(StorageError::InvalidKey(storage_key.to_string()));
    }
    Ok(())
}

fn base_name(filename: &str) -> &str {
    filename
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or(filename)
}
