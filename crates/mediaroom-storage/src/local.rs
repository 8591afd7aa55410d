use crate::keys;
use crate::traits::{
    classify_io_error, Storage, StorageError, StorageResult, UploadReader, UploadResult,
};
use crate::StorageBackend;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Local filesystem storage implementation
#[derive(Clone)]
pub struct LocalStorage {
    base_path: PathBuf,
    base_url: String,
}

impl LocalStorage {
    /// Create a new LocalStorage instance
    ///
    /// # Arguments
    /// * `base_path` - Root directory for file storage (e.g., "/var/lib/mediaroom")
    /// * `base_url` - Base URL the directory is served from (e.g., "http://localhost:3000/media")
    pub async fn new(base_path: impl Into<PathBuf>, base_url: String) -> StorageResult<Self> {
        let base_path = base_path.into();

        fs::create_dir_all(&base_path).await.map_err(|e| {
            StorageError::ConfigError(format!(
                "Failed to create storage directory {}: {}",
                base_path.display(),
                e
            ))
        })?;

        Ok(LocalStorage {
            base_path,
            base_url,
        })
    }

    /// Convert storage key to filesystem path, rejecting keys that escape the root
    fn key_to_path(&self, storage_key: &str) -> StorageResult<PathBuf> {
        keys::validate_key(storage_key)?;
        Ok(self.base_path.join(storage_key))
    }

    async fn ensure_parent_dir(&self, path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                StorageError::upload(
                    classify_io_error(&e),
                    format!("Failed to create directory {}", parent.display()),
                    e,
                )
            })?;
        }
        Ok(())
    }

    async fn write_file(&self, path: &Path, mut reader: UploadReader) -> StorageResult<u64> {
        let write_err = |action: &str, e: std::io::Error| {
            StorageError::upload(
                classify_io_error(&e),
                format!("Failed to {} file {}", action, path.display()),
                e,
            )
        };

        let mut file = fs::File::create(path)
            .await
            .map_err(|e| write_err("create", e))?;
        let written = tokio::io::copy(&mut reader, &mut file)
            .await
            .map_err(|e| write_err("write", e))?;
        file.flush().await.map_err(|e| write_err("flush", e))?;
        file.sync_all().await.map_err(|e| write_err("sync", e))?;
        Ok(written)
    }
}

async fn read_dimensions(content_type: &str, path: &Path) -> (Option<u32>, Option<u32>) {
    if !content_type.starts_with("image/") {
        return (None, None);
    }
    let path = path.to_path_buf();
    match tokio::task::spawn_blocking(move || image::image_dimensions(&path)).await {
        Ok(Ok((w, h))) => (Some(w), Some(h)),
        _ => (None, None),
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn upload(
        &self,
        reader: UploadReader,
        filename: &str,
        content_type: &str,
        size: Option<u64>,
        generate_unique_name: bool,
    ) -> StorageResult<UploadResult> {
        let stored_name = keys::stored_name(filename, generate_unique_name);
        let key = keys::storage_key(&stored_name);
        let path = self.key_to_path(&key)?;

        self.ensure_parent_dir(&path).await?;

        let start = std::time::Instant::now();

        let written = match self.write_file(&path, reader).await {
            Ok(written) => written,
            Err(e) => {
                // Never leave a truncated object behind.
                if let Err(cleanup) = fs::remove_file(&path).await {
                    if cleanup.kind() != std::io::ErrorKind::NotFound {
                        tracing::warn!(
                            path = %path.display(),
                            error = %cleanup,
                            "Failed to remove partial upload"
                        );
                    }
                }
                tracing::error!(
                    error = %e,
                    key = %key,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "Local storage upload failed"
                );
                return Err(e);
            }
        };

        if let Some(expected) = size {
            if expected != written {
                tracing::debug!(
                    key = %key,
                    expected_bytes = expected,
                    written_bytes = written,
                    "Upload size differs from declared size"
                );
            }
        }

        let (width, height) = read_dimensions(content_type, &path).await;
        let url = self.url(&key);

        tracing::info!(
            path = %path.display(),
            key = %key,
            size_bytes = written,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage upload successful"
        );

        Ok(UploadResult {
            stored_name,
            key,
            url,
            size: written,
            width,
            height,
        })
    }

    async fn delete(&self, storage_key: &str) -> StorageResult<()> {
        let path = self.key_to_path(storage_key)?;
        let start = std::time::Instant::now();

        match fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(key = %storage_key, "Delete of missing local object ignored");
                return Ok(());
            }
            Err(e) => {
                return Err(StorageError::delete(
                    classify_io_error(&e),
                    format!("Failed to delete file {}", path.display()),
                    e,
                ));
            }
        }

        tracing::info!(
            path = %path.display(),
            key = %storage_key,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage delete successful"
        );

        Ok(())
    }

    fn url(&self, storage_key: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), storage_key)
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Local
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const BASE_URL: &str = "http://localhost:3000/media";

    async fn setup() -> (LocalStorage, TempDir) {
        let dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(dir.path(), BASE_URL.to_string())
            .await
            .unwrap();
        (storage, dir)
    }

    fn reader(bytes: Vec<u8>) -> UploadReader {
        Box::pin(std::io::Cursor::new(bytes))
    }

    fn tiny_png() -> Vec<u8> {
        let img = image::RgbImage::from_pixel(7, 5, image::Rgb([200, 10, 10]));
        let mut out = std::io::Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[tokio::test]
    async fn test_unique_names_for_identical_filenames() {
        let (storage, dir) = setup().await;

        let a = storage
            .upload(reader(b"one".to_vec()), "a.txt", "text/plain", Some(3), true)
            .await
            .unwrap();
        let b = storage
            .upload(reader(b"two".to_vec()), "a.txt", "text/plain", Some(3), true)
            .await
            .unwrap();

        assert_ne!(a.key, b.key);
        assert!(a.key.starts_with("media/"));
        assert_eq!(std::fs::read(dir.path().join(&a.key)).unwrap(), b"one");
        assert_eq!(std::fs::read(dir.path().join(&b.key)).unwrap(), b"two");
        assert_eq!(a.url, format!("{}/{}", BASE_URL, a.key));
    }

    #[tokio::test]
    async fn test_sanitized_name_when_not_unique() {
        let (storage, _dir) = setup().await;

        let result = storage
            .upload(
                reader(b"x".to_vec()),
                "../../my file.txt",
                "text/plain",
                None,
                false,
            )
            .await
            .unwrap();

        assert_eq!(result.stored_name, "my_file.txt");
        assert_eq!(result.key, "media/my_file.txt");
        assert_eq!(result.size, 1);
        assert_eq!(result.width, None);
    }

    #[tokio::test]
    async fn test_image_upload_reports_dimensions() {
        let (storage, _dir) = setup().await;
        let bytes = tiny_png();
        let len = bytes.len() as u64;

        let result = storage
            .upload(reader(bytes), "dot.png", "image/png", Some(len), true)
            .await
            .unwrap();

        assert_eq!(result.width, Some(7));
        assert_eq!(result.height, Some(5));
        assert_eq!(result.size, len);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let (storage, dir) = setup().await;

        let result = storage
            .upload(reader(b"bye".to_vec()), "b.bin", "application/octet-stream", None, true)
            .await
            .unwrap();
        storage.delete(&result.key).await.unwrap();
        assert!(!dir.path().join(&result.key).exists());

        storage.delete(&result.key).await.unwrap();
        storage.delete("media/never-existed.bin").await.unwrap();
    }

    #[tokio::test]
    async fn test_url_is_pure() {
        let dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(dir.path(), format!("{}/", BASE_URL))
            .await
            .unwrap();
        assert_eq!(
            storage.url("media/abc.webp"),
            "http://localhost:3000/media/media/abc.webp"
        );
        assert!(!dir.path().join("media/abc.webp").exists());
        assert_eq!(storage.backend_type(), StorageBackend::Local);
    }

    #[tokio::test]
    async fn test_traversal_keys_rejected() {
        let (storage, _dir) = setup().await;
        let err = storage.delete("media/../../etc/passwd").await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidKey(_)));
    }
}
