//! Per-operation scratch directory.
//!
//! Every input the backend needs as a file is materialized here, and every
//! intermediate output lands here. Dropping the [`Workspace`] removes the
//! directory, whichever way the operation ended.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;
use tokio::fs;
use tracing::{debug, warn};

use beatreel_models::MediaSource;

use crate::error::{MediaError, MediaResult, Stage};

pub struct Workspace {
    dir: TempDir,
    counter: AtomicUsize,
}

impl Workspace {
    /// Create a scratch directory under `parent`, or the system temp dir.
    pub fn create(parent: Option<&Path>, label: &str) -> MediaResult<Self> {
        let mut builder = tempfile::Builder::new();
        let prefix = format!("beatreel-{}-", label);
        builder.prefix(&prefix);

        let dir = match parent {
            Some(parent) => {
                std::fs::create_dir_all(parent)?;
                builder.tempdir_in(parent)?
            }
            None => builder.tempdir()?,
        };
        debug!(path = %dir.path().display(), "Created workspace");

        Ok(Self {
            dir,
            counter: AtomicUsize::new(0),
        })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// A fresh, unused file path with the given stem and extension.
    pub fn file(&self, stem: &str, extension: &str) -> PathBuf {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        self.dir.path().join(format!("{:03}_{}.{}", n, stem, extension))
    }

    /// Write a source's bytes to disk using its MIME-derived extension.
    pub async fn materialize(&self, source: &MediaSource) -> MediaResult<PathBuf> {
        if source.is_empty() {
            return Err(MediaError::source_unavailable(&source.id, "source has no bytes"));
        }
        let path = self.file(&source.id.file_stem(), source.extension());
        fs::write(&path, &source.data).await?;
        Ok(path)
    }

    /// Write raw bytes (PCM buffers, concat manifests).
    pub async fn write(&self, stem: &str, extension: &str, bytes: &[u8]) -> MediaResult<PathBuf> {
        let path = self.file(stem, extension);
        fs::write(&path, bytes).await?;
        Ok(path)
    }

    /// Read an output back into memory, rejecting missing or empty files.
    pub async fn read_output(&self, path: &Path, stage: Stage) -> MediaResult<Vec<u8>> {
        match fs::read(path).await {
            Ok(bytes) if bytes.is_empty() => Err(MediaError::EmptyOutput { stage }),
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(MediaError::EmptyOutput { stage })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Size of an output file, 0 when it does not exist.
    pub async fn output_size(&self, path: &Path) -> u64 {
        fs::metadata(path).await.map(|m| m.len()).unwrap_or(0)
    }

    /// Delete a file early (rejected recordings).
    pub async fn discard(&self, path: &Path) {
        if let Err(e) = fs::remove_file(path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %path.display(), error = %e, "Failed to remove discarded file");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_materialize_uses_extension() {
        let ws = Workspace::create(None, "test").unwrap();
        let source = MediaSource::new("clip one", vec![1, 2, 3], "video/webm");

        let path = ws.materialize(&source).await.unwrap();
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("webm"));
        assert_eq!(fs::read(&path).await.unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_empty_source_is_unavailable() {
        let ws = Workspace::create(None, "test").unwrap();
        let source = MediaSource::new("empty", Vec::new(), "video/mp4");
        assert!(matches!(
            ws.materialize(&source).await,
            Err(MediaError::SourceUnavailable { .. })
        ));
    }

    #[tokio::test]
    async fn test_drop_removes_directory() {
        let parent = tempfile::tempdir().unwrap();
        let ws = Workspace::create(Some(parent.path()), "drop").unwrap();
        let root = ws.path().to_path_buf();
        ws.write("scratch", "bin", b"data").await.unwrap();
        assert!(root.exists());

        drop(ws);
        assert!(!root.exists());
    }

    #[tokio::test]
    async fn test_read_output_rejects_empty() {
        let ws = Workspace::create(None, "test").unwrap();
        let path = ws.write("empty", "mp4", b"").await.unwrap();
        assert!(matches!(
            ws.read_output(&path, Stage::Concat).await,
            Err(MediaError::EmptyOutput { stage: Stage::Concat })
        ));

        let missing = ws.file("missing", "mp4");
        assert!(ws.read_output(&missing, Stage::Trim).await.is_err());
        assert_eq!(ws.output_size(&missing).await, 0);
    }

    #[test]
    fn test_files_are_unique() {
        let ws = Workspace::create(None, "test").unwrap();
        assert_ne!(ws.file("a", "mp4"), ws.file("a", "mp4"));
    }
}
