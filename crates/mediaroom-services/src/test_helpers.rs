//! Test doubles for services tests.

use async_trait::async_trait;
use mediaroom_storage::{
    keys, FailureKind, Storage, StorageBackend, StorageError, StorageResult, UploadReader,
    UploadResult,
};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::io::AsyncReadExt;

#[derive(Default)]
struct MockState {
    objects: HashMap<String, (String, Vec<u8>)>,
    deleted: Vec<String>,
    fail_content_types: Vec<String>,
    fail_deletes: bool,
    uploads_started: usize,
    slow_after: Option<(usize, Duration)>,
}

/// In-memory [`Storage`] with failure injection.
#[derive(Default)]
pub struct MockStorage {
    state: Mutex<MockState>,
}

impl MockStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every upload whose content type starts with `prefix`.
    pub fn fail_uploads_of(self, prefix: &str) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.fail_content_types.push(prefix.to_string());
        }
        self
    }

    /// Stall every upload after the first `n` for `delay` before storing it.
    pub fn delay_uploads_after(self, n: usize, delay: Duration) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.slow_after = Some((n, delay));
        }
        self
    }

    pub fn fail_deletes(self) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.fail_deletes = true;
        }
        self
    }

    pub fn contains(&self, key: &str) -> bool {
        self.state
            .lock()
            .map(|s| s.objects.contains_key(key))
            .unwrap_or(false)
    }

    pub fn keys(&self) -> Vec<String> {
        self.state
            .lock()
            .map(|s| s.objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Keys passed to `delete`, in call order.
    pub fn deleted(&self) -> Vec<String> {
        self.state
            .lock()
            .map(|s| s.deleted.clone())
            .unwrap_or_default()
    }

    pub fn object(&self, key: &str) -> Option<(String, Vec<u8>)> {
        self.state.lock().ok()?.objects.get(key).cloned()
    }
}

#[async_trait]
impl Storage for MockStorage {
    async fn upload(
        &self,
        mut reader: UploadReader,
        filename: &str,
        content_type: &str,
        _size: Option<u64>,
        generate_unique_name: bool,
    ) -> StorageResult<UploadResult> {
        let (injected, delay) = self
            .state
            .lock()
            .map(|mut s| {
                let index = s.uploads_started;
                s.uploads_started += 1;
                let delay = s
                    .slow_after
                    .filter(|(n, _)| index >= *n)
                    .map(|(_, d)| d);
                let injected = s
                    .fail_content_types
                    .iter()
                    .any(|p| content_type.starts_with(p.as_str()));
                (injected, delay)
            })
            .unwrap_or((false, None));
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if injected {
            return Err(StorageError::upload(
                FailureKind::Transient,
                format!("injected upload failure for {}", filename),
                "mock",
            ));
        }

        let mut data = Vec::new();
        reader.read_to_end(&mut data).await?;

        let stored_name = keys::stored_name(filename, generate_unique_name);
        let key = keys::storage_key(&stored_name);
        let size = data.len() as u64;
        if let Ok(mut state) = self.state.lock() {
            state
                .objects
                .insert(key.clone(), (content_type.to_string(), data));
        }

        Ok(UploadResult {
            stored_name,
            url: self.url(&key),
            key,
            size,
            width: None,
            height: None,
        })
    }

    async fn delete(&self, storage_key: &str) -> StorageResult<()> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| StorageError::ConfigError("mock storage poisoned".to_string()))?;
        state.deleted.push(storage_key.to_string());
        if state.fail_deletes {
            return Err(StorageError::delete(
                FailureKind::Transient,
                format!("injected delete failure for {}", storage_key),
                "mock",
            ));
        }
        state.objects.remove(storage_key);
        Ok(())
    }

    fn url(&self, storage_key: &str) -> String {
        format!("mock://{}", storage_key)
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Local
    }
}
