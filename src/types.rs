//! Core data model: repository references, file manifests, filter criteria,
//! download requests, and the progress/result types the orchestrator produces.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};

/// A repository identified by owner and name on a GitHub-style host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryRef {
    pub owner: String,
    pub name: String,
}

impl RepositoryRef {
    #[must_use]
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }

    #[must_use]
    pub fn display_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

/// The kind of ref a [`GitRef`] points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GitRefKind {
    Branch,
    Tag,
    Commit,
}

/// A branch, tag, or commit identifying a point in a repository's history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitRef {
    pub name: String,
    pub kind: GitRefKind,
    pub sha: Option<String>,
}

impl GitRef {
    #[must_use]
    pub fn branch(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: GitRefKind::Branch,
            sha: None,
        }
    }

    #[must_use]
    pub fn commit(sha: impl Into<String>) -> Self {
        let sha = sha.into();
        Self {
            name: sha.clone(),
            kind: GitRefKind::Commit,
            sha: Some(sha),
        }
    }
}

/// The kind of entry a repository tree listing can contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Blob,
    Tree,
    Symlink,
}

/// One entry in a repository tree listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub path: String,
    pub kind: EntryKind,
    pub size: u64,
    pub download_url: Option<String>,
    pub sha: Option<String>,
}

impl FileEntry {
    #[must_use]
    pub fn new_blob(path: impl Into<String>, size: u64) -> Self {
        Self {
            path: path.into(),
            kind: EntryKind::Blob,
            size,
            download_url: None,
            sha: None,
        }
    }

    #[must_use]
    pub fn with_download_url(mut self, url: impl Into<String>) -> Self {
        self.download_url = Some(url.into());
        self
    }
}

/// Criteria the Filter Engine applies to a repository's file manifest.
///
/// Every axis is optional; an empty/unset axis places no constraint.
#[derive(Debug, Clone, Default)]
pub struct FilterCriteria {
    pub include_globs: Vec<String>,
    pub exclude_globs: Vec<String>,
    pub min_size: Option<u64>,
    pub max_size: Option<u64>,
    pub included_exts: Vec<String>,
    pub excluded_exts: Vec<String>,
    pub include_hidden: bool,
    pub target_paths: Vec<String>,
}

/// Configuration for a single download run.
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub repository: RepositoryRef,
    pub git_ref: GitRef,
    pub destination: PathBuf,
    pub filters: FilterCriteria,
    pub overwrite_existing: bool,
    pub preserve_structure: bool,
    pub create_destination: bool,
    pub show_progress_bars: bool,
    pub max_concurrent_downloads: usize,
    pub chunk_size: usize,
    pub timeout: Duration,
    pub dry_run: bool,
    pub token: Option<String>,
}

/// Error constructing a [`DownloadRequest`] with invalid fields.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum DownloadRequestError {
    #[error("destination path must not be empty")]
    EmptyDestination,
    #[error("max_concurrent_downloads must be greater than zero")]
    ZeroConcurrency,
    #[error("chunk_size must be greater than zero")]
    ZeroChunkSize,
    #[error("timeout must be greater than zero")]
    ZeroTimeout,
}

impl DownloadRequest {
    /// Builds a request with the source's documented defaults, validating the
    /// caller-controlled fields that can otherwise produce a silently-useless run.
    pub fn new(
        repository: RepositoryRef,
        git_ref: GitRef,
        destination: PathBuf,
    ) -> Result<Self, DownloadRequestError> {
        if destination.as_os_str().is_empty() {
            return Err(DownloadRequestError::EmptyDestination);
        }
        Ok(Self {
            repository,
            git_ref,
            destination,
            filters: FilterCriteria::default(),
            overwrite_existing: false,
            preserve_structure: true,
            create_destination: true,
            show_progress_bars: false,
            max_concurrent_downloads: 10,
            chunk_size: 8192,
            timeout: Duration::from_secs(300),
            dry_run: false,
            token: None,
        })
    }

    pub fn validate(&self) -> Result<(), DownloadRequestError> {
        if self.destination.as_os_str().is_empty() {
            return Err(DownloadRequestError::EmptyDestination);
        }
        if self.max_concurrent_downloads == 0 {
            return Err(DownloadRequestError::ZeroConcurrency);
        }
        if self.chunk_size == 0 {
            return Err(DownloadRequestError::ZeroChunkSize);
        }
        if self.timeout.is_zero() {
            return Err(DownloadRequestError::ZeroTimeout);
        }
        Ok(())
    }
}

/// A point-in-time view of an in-flight run's progress.
#[derive(Debug, Clone, Default)]
pub struct ProgressSnapshot {
    pub total_files: usize,
    pub downloaded_files: usize,
    pub total_bytes: u64,
    pub downloaded_bytes: u64,
    pub current_file: Option<String>,
    pub started_at: Option<SystemTime>,
}

impl ProgressSnapshot {
    #[must_use]
    pub fn percent_by_files(&self) -> f64 {
        if self.total_files == 0 {
            0.0
        } else {
            (self.downloaded_files as f64 / self.total_files as f64) * 100.0
        }
    }

    #[must_use]
    pub fn percent_by_bytes(&self) -> f64 {
        if self.total_bytes == 0 {
            0.0
        } else {
            (self.downloaded_bytes as f64 / self.total_bytes as f64) * 100.0
        }
    }

    #[must_use]
    pub fn elapsed(&self) -> Duration {
        match self.started_at.and_then(|s| s.elapsed().ok()) {
            Some(d) => d,
            None => Duration::ZERO,
        }
    }

    pub(crate) fn update_file_progress(&mut self, bytes_written: u64, path: impl Into<String>) {
        self.downloaded_bytes += bytes_written;
        self.current_file = Some(path.into());
    }

    pub(crate) fn complete_file(&mut self) {
        self.downloaded_files += 1;
        self.current_file = None;
    }
}

/// Internal run-level counters, never exposed directly to callers.
#[derive(Debug, Clone, Default)]
pub struct DownloadStatistics {
    pub downloaded_files: usize,
    pub skipped_files: usize,
    pub failed_files: usize,
    pub total_bytes: u64,
    pub cache_hits: usize,
    pub api_calls: usize,
    pub start_time: Option<SystemTime>,
    pub end_time: Option<SystemTime>,
}

impl DownloadStatistics {
    #[must_use]
    pub fn duration(&self) -> Duration {
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) => end.duration_since(start).unwrap_or(Duration::ZERO),
            _ => Duration::ZERO,
        }
    }

    #[must_use]
    pub fn download_speed_bytes_per_sec(&self) -> f64 {
        let duration = self.duration().as_secs_f64();
        if duration > 0.0 && self.total_bytes > 0 {
            self.total_bytes as f64 / duration
        } else {
            0.0
        }
    }

    #[must_use]
    pub fn success_rate_percent(&self) -> f64 {
        let attempted = self.downloaded_files + self.failed_files;
        if attempted > 0 {
            (self.downloaded_files as f64 / attempted as f64) * 100.0
        } else {
            0.0
        }
    }
}

/// Run-level status, tracked on [`DownloadResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Cancelled,
    Paused,
}

/// The outcome of a single `execute` call, published incrementally so that
/// concurrent control operations can observe and mutate it.
#[derive(Debug, Clone)]
pub struct DownloadResult {
    pub request: DownloadRequest,
    pub status: DownloadStatus,
    pub progress: ProgressSnapshot,
    pub downloaded_files: Vec<String>,
    pub skipped_files: Vec<String>,
    pub failed_files: HashMap<String, String>,
    pub matched_files: Vec<String>,
    pub started_at: Option<SystemTime>,
    pub completed_at: Option<SystemTime>,
    pub error_message: Option<String>,
    pub cache_hits: usize,
    pub api_calls_made: usize,
}

impl DownloadResult {
    #[must_use]
    pub fn new(request: DownloadRequest, status: DownloadStatus, progress: ProgressSnapshot) -> Self {
        Self {
            request,
            status,
            progress,
            downloaded_files: Vec::new(),
            skipped_files: Vec::new(),
            failed_files: HashMap::new(),
            matched_files: Vec::new(),
            started_at: None,
            completed_at: None,
            error_message: None,
            cache_hits: 0,
            api_calls_made: 0,
        }
    }

    #[must_use]
    pub fn total_time(&self) -> Option<Duration> {
        match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) => end.duration_since(start).ok(),
            _ => None,
        }
    }

    #[must_use]
    pub fn avg_speed_bytes_per_sec(&self) -> f64 {
        match self.total_time() {
            Some(d) if d.as_secs_f64() > 0.0 => {
                self.progress.downloaded_bytes as f64 / d.as_secs_f64()
            }
            _ => 0.0,
        }
    }

    /// Finalizes a successful or partially-failed run.
    ///
    /// `status` only becomes `Completed` if no files failed; otherwise it is
    /// reclassified to `Failed`. Never call this eagerly before all per-file
    /// outcomes are known.
    pub fn mark_completed(&mut self) {
        self.status = if self.failed_files.is_empty() {
            DownloadStatus::Completed
        } else {
            DownloadStatus::Failed
        };
        self.completed_at = Some(SystemTime::now());
    }
}

/// Rate-limit budget as reported by the remote service's response headers.
#[derive(Debug, Clone, Default)]
pub struct RateLimitInfo {
    pub limit: u64,
    pub remaining: u64,
    pub used: u64,
    pub reset_time: Option<SystemTime>,
}

/// Soft reserve: acquiring with fewer than this many calls left in the
/// current window is treated as exhaustion, even though the server has not
/// yet refused a request. Preserved from the source for behavioral parity.
pub const RATE_LIMIT_EXHAUSTION_THRESHOLD: u64 = 10;

impl RateLimitInfo {
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.remaining <= RATE_LIMIT_EXHAUSTION_THRESHOLD
    }

    #[must_use]
    pub fn reset_in(&self) -> Duration {
        match self.reset_time {
            Some(reset) => reset
                .duration_since(SystemTime::now())
                .unwrap_or(Duration::ZERO),
            None => Duration::ZERO,
        }
    }
}
