use std::path::PathBuf;

use crate::error::{ProcessingError, ProcessingResult};

/// One derived file ready for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendition {
    pub path: PathBuf,
    pub content_type: &'static str,
    /// Extension used when naming the stored object
    pub extension: &'static str,
    pub width: u32,
    pub height: u32,
    pub size_bytes: u64,
}

impl Rendition {
    /// Describe a file the transcoder just wrote. A missing or empty file is an error.
    pub(crate) async fn from_file(
        path: PathBuf,
        content_type: &'static str,
        extension: &'static str,
        width: u32,
        height: u32,
    ) -> ProcessingResult<Self> {
        let size_bytes = match tokio::fs::metadata(&path).await {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => 0,
            Err(e) => return Err(e.into()),
        };
        if size_bytes == 0 {
            return Err(ProcessingError::EmptyOutput(path.display().to_string()));
        }
        Ok(Self {
            path,
            content_type,
            extension,
            width,
            height,
            size_bytes,
        })
    }

    /// Upload filename for this rendition, e.g. `holiday.webp`.
    pub fn file_name(&self, stem: &str) -> String {
        format!("{}.{}", stem, self.extension)
    }
}
