//! `SinkService`: the contract the orchestrator depends on to persist
//! downloaded bytes to the local filesystem.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::DownloadError;

/// Operations the orchestrator needs from a byte sink.
#[async_trait]
pub trait SinkService: Send + Sync {
    /// Idempotently ensures `path` exists as a directory.
    async fn ensure_directory(&self, path: &Path) -> Result<(), DownloadError>;

    /// Writes `content` to `path`, creating parent directories as needed,
    /// and returns the number of bytes written.
    ///
    /// `show_progress` mirrors `DownloadRequest.show_progress_bars`: a
    /// concrete sink may use it to decide whether to report per-file write
    /// progress to its embedder. No concrete terminal-rendering progress bar
    /// ships in this crate (the CLI frontend that would own one is out of
    /// scope); `FilesystemSink` honors it by emitting a debug-level trace
    /// event per write.
    async fn save_content(
        &self,
        content: &[u8],
        path: &Path,
        show_progress: bool,
    ) -> Result<u64, DownloadError>;
}

/// Concrete filesystem-backed sink used outside of tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct FilesystemSink;

impl FilesystemSink {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SinkService for FilesystemSink {
    async fn ensure_directory(&self, path: &Path) -> Result<(), DownloadError> {
        fs::create_dir_all(path)
            .await
            .map_err(|e| DownloadError::io(path.display().to_string(), e))
    }

    async fn save_content(
        &self,
        content: &[u8],
        path: &Path,
        show_progress: bool,
    ) -> Result<u64, DownloadError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| DownloadError::io(parent.display().to_string(), e))?;
        }
        let mut file = fs::File::create(path)
            .await
            .map_err(|e| DownloadError::io(path.display().to_string(), e))?;
        file.write_all(content)
            .await
            .map_err(|e| DownloadError::io(path.display().to_string(), e))?;
        file.flush()
            .await
            .map_err(|e| DownloadError::io(path.display().to_string(), e))?;
        if show_progress {
            debug!(path = %path.display(), bytes = content.len(), "wrote file");
        }
        Ok(content.len() as u64)
    }
}

/// In-process test double recording every write, for exercising the
/// orchestrator without touching disk.
#[derive(Default)]
pub struct InMemorySink {
    written: Mutex<HashMap<PathBuf, Vec<u8>>>,
    directories: Mutex<Vec<PathBuf>>,
    show_progress_calls: Mutex<Vec<bool>>,
}

impl InMemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn contains(&self, path: &Path) -> bool {
        self.written
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .contains_key(path)
    }

    #[must_use]
    pub fn written_files(&self) -> Vec<PathBuf> {
        self.written
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .keys()
            .cloned()
            .collect()
    }

    /// The `show_progress` flag passed to each `save_content` call, in order.
    #[must_use]
    pub fn show_progress_calls(&self) -> Vec<bool> {
        self.show_progress_calls
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }
}

#[async_trait]
impl SinkService for InMemorySink {
    async fn ensure_directory(&self, path: &Path) -> Result<(), DownloadError> {
        self.directories
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(path.to_path_buf());
        Ok(())
    }

    async fn save_content(
        &self,
        content: &[u8],
        path: &Path,
        show_progress: bool,
    ) -> Result<u64, DownloadError> {
        self.written
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(path.to_path_buf(), content.to_vec());
        self.show_progress_calls
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(show_progress);
        Ok(content.len() as u64)
    }
}
