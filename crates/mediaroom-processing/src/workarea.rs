//! Per-invocation scratch directories.

use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};

use crate::error::{ProcessingError, ProcessingResult};

const WORK_AREA_PREFIX: &str = "mediaroom-";
const SPOOL_CHUNK: usize = 64 * 1024;

/// Temporary directory owned by one processing invocation.
///
/// The directory and everything in it is removed when the value is dropped,
/// whichever way the invocation ends. Use [`WorkArea::close`] to observe
/// removal errors.
#[derive(Debug)]
pub struct WorkArea {
    dir: TempDir,
}

impl WorkArea {
    pub fn new() -> ProcessingResult<Self> {
        let dir = tempfile::Builder::new().prefix(WORK_AREA_PREFIX).tempdir()?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Path for a file inside the area. Only the final path component of
    /// `name` is used.
    pub fn path_for(&self, name: &str) -> PathBuf {
        let file_name = Path::new(name)
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "file".into());
        self.dir.path().join(file_name)
    }

    /// Copy `reader` to `name`, failing once more than `max_bytes` arrive.
    pub async fn spool<R>(
        &self,
        reader: &mut R,
        name: &str,
        max_bytes: u64,
    ) -> ProcessingResult<(PathBuf, u64)>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let path = self.path_for(name);
        let mut file = tokio::fs::File::create(&path).await?;
        let mut buf = vec![0u8; SPOOL_CHUNK];
        let mut total: u64 = 0;

        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            total += n as u64;
            if total > max_bytes {
                drop(file);
                let _ = tokio::fs::remove_file(&path).await;
                return Err(ProcessingError::TooLarge { limit: max_bytes });
            }
            file.write_all(&buf[..n]).await?;
        }

        file.flush().await?;
        Ok((path, total))
    }

    /// Remove the directory now, reporting failures.
    pub fn close(self) -> ProcessingResult<()> {
        self.dir.close()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_spool_within_limit() {
        let area = WorkArea::new().unwrap();
        let mut reader: &[u8] = b"hello world";
        let (path, size) = area.spool(&mut reader, "in.bin", 100).await.unwrap();
        assert_eq!(size, 11);
        assert_eq!(std::fs::read(&path).unwrap(), b"hello world");
        assert!(path.starts_with(area.path()));
    }

    #[tokio::test]
    async fn test_spool_enforces_limit() {
        let area = WorkArea::new().unwrap();
        let data = vec![7u8; 1024];
        let mut reader: &[u8] = &data;
        let err = area.spool(&mut reader, "in.bin", 512).await.unwrap_err();
        assert!(matches!(err, ProcessingError::TooLarge { limit: 512 }));
        assert!(!area.path_for("in.bin").exists());
    }

    #[test]
    fn test_removed_on_drop() {
        let area = WorkArea::new().unwrap();
        let path = area.path().to_path_buf();
        std::fs::write(area.path_for("x"), b"x").unwrap();
        assert!(path.is_dir());
        drop(area);
        assert!(!path.exists());
    }

    #[test]
    fn test_path_for_strips_directories() {
        let area = WorkArea::new().unwrap();
        assert_eq!(area.path_for("../../etc/passwd"), area.path().join("passwd"));
        area.close().unwrap();
    }
}
