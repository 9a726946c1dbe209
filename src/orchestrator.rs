//! The Orchestrator: composes the Filter Engine, Rate Limiter, Retry
//! Manager, and the `ApiService`/`SinkService` contracts into a single
//! bounded-concurrency download run with cooperative pause/resume/cancel.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use thiserror::Error;
use tokio::sync::{watch, Mutex, Semaphore};
use tracing::{debug, info, instrument, warn};

use crate::api::ApiService;
use crate::error::DownloadError;
use crate::filter::filter_files;
use crate::retry::RetryManager;
use crate::rate_limiter::RateLimiter;
use crate::sink::SinkService;
use crate::types::{
    DownloadRequest, DownloadResult, DownloadStatistics, DownloadStatus, FileEntry,
    ProgressSnapshot,
};

/// Errors that abort an entire run rather than a single file.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("a previous run was cancelled and the orchestrator has not been reset")]
    NotReset,
}

/// The outcome of a single per-file task, distinguishing the two cases that
/// share the spec's "skip-sentinel" shape: an existing file left alone
/// (reported in `DownloadResult.skipped_files`) and a cancellation-observed
/// exit (reported nowhere in the current, non-resumable run).
enum FileOutcome {
    Downloaded(u64),
    SkippedExisting,
    CancelledBeforeStart,
}

struct ControlState {
    current_result: Option<DownloadResult>,
    /// The same progress object the in-flight per-file tasks mutate, so that
    /// `current_progress()` observes live updates instead of the stale
    /// snapshot taken when the result was published.
    live_progress: Option<Arc<Mutex<ProgressSnapshot>>>,
}

/// Orchestrates one download run at a time.
///
/// A concrete `ApiService` built outside this crate may already apply its
/// own rate limiting and retrying internally (per the contract in
/// `crate::api`); the orchestrator also wraps `get_file_content` with its
/// own `RateLimiter`/`RetryManager` so that the two core components have a
/// real, exercised integration point even though no concrete HTTP-backed
/// `ApiService` ships in this crate. Wrapping twice is harmless: both layers
/// only delay or retry, they never change the fetched bytes.
pub struct Orchestrator {
    api: Arc<dyn ApiService>,
    sink: Arc<dyn SinkService>,
    rate_limiter: Arc<RateLimiter>,
    retry: RetryManager,
    cancelled: Arc<AtomicBool>,
    paused: AtomicBool,
    gate_tx: watch::Sender<bool>,
    gate_rx: watch::Receiver<bool>,
    control: Mutex<ControlState>,
}

impl Orchestrator {
    #[must_use]
    pub fn new(api: Arc<dyn ApiService>, sink: Arc<dyn SinkService>) -> Self {
        Self::with_components(api, sink, Arc::new(RateLimiter::new()), RetryManager::new())
    }

    #[must_use]
    pub fn with_components(
        api: Arc<dyn ApiService>,
        sink: Arc<dyn SinkService>,
        rate_limiter: Arc<RateLimiter>,
        retry: RetryManager,
    ) -> Self {
        let (gate_tx, gate_rx) = watch::channel(true);
        Self {
            api,
            sink,
            rate_limiter,
            retry,
            cancelled: Arc::new(AtomicBool::new(false)),
            paused: AtomicBool::new(false),
            gate_tx,
            gate_rx,
            control: Mutex::new(ControlState {
                current_result: None,
                live_progress: None,
            }),
        }
    }

    fn target_path(request: &DownloadRequest, file: &FileEntry) -> PathBuf {
        if request.preserve_structure {
            request.destination.join(&file.path)
        } else {
            let name = file.path.rsplit('/').next().unwrap_or(&file.path);
            request.destination.join(name)
        }
    }

    /// Runs the full pipeline for `request`, returning once every matched
    /// file has a final outcome (or a terminal control/error condition).
    #[instrument(skip(self, request), fields(repo = %request.repository.display_name()))]
    pub async fn execute(&self, request: DownloadRequest) -> DownloadResult {
        if self.cancelled.load(Ordering::SeqCst) {
            let mut failed = DownloadResult::new(
                request.clone(),
                DownloadStatus::Failed,
                ProgressSnapshot::default(),
            );
            failed.error_message = Some(OrchestratorError::NotReset.to_string());
            self.reset_state().await;
            return failed;
        }

        let result = self.execute_inner(request).await;
        self.reset_state().await;
        result
    }

    async fn execute_inner(&self, request: DownloadRequest) -> DownloadResult {
        let start = SystemTime::now();
        let mut stats = DownloadStatistics {
            start_time: Some(start),
            ..Default::default()
        };
        let mut progress = ProgressSnapshot {
            started_at: Some(start),
            ..Default::default()
        };

        debug!("fetching repository tree");
        let files = match self
            .api
            .get_repository_tree(&request.repository, &request.git_ref)
            .await
        {
            Ok(files) => {
                stats.api_calls += 1;
                files
            }
            Err(err) => {
                return Self::failed_result(request, progress, start, err.to_string());
            }
        };

        let filter_result = filter_files(&files, &request.filters);
        let target_files = filter_result.included;
        progress.total_files = target_files.len();
        progress.total_bytes = target_files.iter().map(|f| f.size).sum();

        let mut result = DownloadResult::new(request.clone(), DownloadStatus::InProgress, progress.clone());
        result.matched_files = target_files.iter().map(|f| f.path.clone()).collect();
        result.started_at = Some(start);

        let live_progress = Arc::new(Mutex::new(progress.clone()));

        // Publish before any per-file task starts so pause()/cancel() can
        // observe it, and hand out the same progress handle the per-file
        // tasks mutate so `current_progress()` sees live updates mid-run.
        {
            let mut control = self.control.lock().await;
            control.current_result = Some(result.clone());
            control.live_progress = Some(Arc::clone(&live_progress));
        }

        if request.dry_run {
            let mut skipped = Vec::new();
            for file in &target_files {
                let target_path = Self::target_path(&request, file);
                if target_path.exists() && !request.overwrite_existing {
                    skipped.push(file.path.clone());
                }
            }
            result.status = DownloadStatus::Completed;
            result.skipped_files = skipped;
            result.completed_at = Some(SystemTime::now());
            self.control.lock().await.current_result = Some(result.clone());
            info!(matched = target_files.len(), "dry run complete");
            return result;
        }

        if request.create_destination {
            if let Err(err) = self.sink.ensure_directory(&request.destination).await {
                result.status = DownloadStatus::Failed;
                result.error_message = Some(err.to_string());
                result.completed_at = Some(SystemTime::now());
                self.control.lock().await.current_result = Some(result.clone());
                return result;
            }
        }

        let api_call_counter = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let (downloaded, failed, skipped, bytes, shared_progress) = self
            .run_downloads(&target_files, &request, Arc::clone(&live_progress), Arc::clone(&api_call_counter))
            .await;

        stats.downloaded_files = downloaded.len();
        stats.failed_files = failed.len();
        stats.skipped_files = skipped.len();
        stats.total_bytes = bytes;
        stats.end_time = Some(SystemTime::now());

        result.downloaded_files = downloaded;
        result.failed_files = failed;
        result.skipped_files = skipped;
        result.progress = shared_progress;
        result.cache_hits = stats.cache_hits;
        result.api_calls_made =
            stats.api_calls + api_call_counter.load(Ordering::SeqCst);

        if self.cancelled.load(Ordering::SeqCst) {
            // A cancellation observed during the run is terminal on its own;
            // it must not be reclassified to completed/failed just because
            // every in-flight task happened to resolve without an error.
            result.status = DownloadStatus::Cancelled;
            result.completed_at = Some(SystemTime::now());
            info!("download cancelled mid-run");
        } else {
            result.mark_completed();
            if matches!(result.status, DownloadStatus::Completed) {
                info!(downloaded = result.downloaded_files.len(), "download completed");
            } else {
                warn!(failed = result.failed_files.len(), "download finished with failures");
            }
        }

        self.control.lock().await.current_result = Some(result.clone());
        result
    }

    fn failed_result(
        request: DownloadRequest,
        progress: ProgressSnapshot,
        start: SystemTime,
        message: String,
    ) -> DownloadResult {
        let mut result = DownloadResult::new(request, DownloadStatus::Failed, progress);
        result.error_message = Some(message);
        result.started_at = Some(start);
        result.completed_at = Some(start);
        result
    }

    #[allow(clippy::type_complexity)]
    async fn run_downloads(
        &self,
        target_files: &[FileEntry],
        request: &DownloadRequest,
        progress: Arc<Mutex<ProgressSnapshot>>,
        api_call_counter: Arc<std::sync::atomic::AtomicUsize>,
    ) -> (Vec<String>, HashMap<String, String>, Vec<String>, u64, ProgressSnapshot) {
        let semaphore = Arc::new(Semaphore::new(request.max_concurrent_downloads.max(1)));

        let mut handles = Vec::with_capacity(target_files.len());
        for file in target_files.iter().cloned() {
            let semaphore = Arc::clone(&semaphore);
            let api = Arc::clone(&self.api);
            let sink = Arc::clone(&self.sink);
            let rate_limiter = Arc::clone(&self.rate_limiter);
            let retry = self.retry;
            let request = request.clone();
            let progress = Arc::clone(&progress);
            let gate_rx = self.gate_rx.clone();
            let cancelled = Arc::clone(&self.cancelled);
            let api_call_counter = Arc::clone(&api_call_counter);

            handles.push((
                file.clone(),
                tokio::spawn(download_one_file(
                    file,
                    request,
                    semaphore,
                    api,
                    sink,
                    rate_limiter,
                    retry,
                    progress,
                    gate_rx,
                    cancelled,
                    api_call_counter,
                )),
            ));
        }

        let mut downloaded = Vec::new();
        let mut failed = HashMap::new();
        let mut skipped = Vec::new();
        let mut bytes = 0u64;

        for (file, handle) in handles {
            match handle.await {
                Ok(Ok(FileOutcome::Downloaded(written))) => {
                    downloaded.push(file.path.clone());
                    bytes += written;
                }
                Ok(Ok(FileOutcome::SkippedExisting)) => skipped.push(file.path.clone()),
                Ok(Ok(FileOutcome::CancelledBeforeStart)) => {}
                Ok(Err(err)) => {
                    failed.insert(file.path.clone(), err.to_string());
                }
                Err(join_err) => {
                    failed.insert(file.path.clone(), join_err.to_string());
                }
            }
        }

        let final_progress = progress.lock().await.clone();
        (downloaded, failed, skipped, bytes, final_progress)
    }

    /// Marks the in-flight operation cancelled. Synchronous: does not await
    /// the tasks' actual termination, only signals it.
    #[instrument(skip(self))]
    pub async fn cancel(&self) -> Option<DownloadResult> {
        let mut control = self.control.lock().await;
        let result = control.current_result.as_mut()?;

        self.cancelled.store(true, Ordering::SeqCst);
        // Clear paused too: otherwise a later resume() would see `paused`
        // still set and flip this terminal `Cancelled` status back to
        // `InProgress`.
        self.paused.store(false, Ordering::SeqCst);
        // Unblock any task currently parked at the pause gate so it can
        // observe cancellation and exit.
        let _ = self.gate_tx.send(true);

        result.status = DownloadStatus::Cancelled;
        result.completed_at = Some(SystemTime::now());
        info!("download cancelled");
        Some(result.clone())
    }

    /// Transitions the in-flight operation to paused. Idempotent.
    #[instrument(skip(self))]
    pub async fn pause(&self) -> Option<DownloadResult> {
        let mut control = self.control.lock().await;
        let result = control.current_result.as_mut()?;

        if self.paused.load(Ordering::SeqCst) {
            return Some(result.clone());
        }

        self.paused.store(true, Ordering::SeqCst);
        let _ = self.gate_tx.send(false);
        result.status = DownloadStatus::Paused;
        info!("download paused");
        Some(result.clone())
    }

    /// Transitions a paused operation back to in-progress. Idempotent.
    #[instrument(skip(self))]
    pub async fn resume(&self) -> Option<DownloadResult> {
        let mut control = self.control.lock().await;
        let result = control.current_result.as_mut()?;

        if !self.paused.load(Ordering::SeqCst) {
            return Some(result.clone());
        }

        self.paused.store(false, Ordering::SeqCst);
        let _ = self.gate_tx.send(true);
        result.status = DownloadStatus::InProgress;
        info!("download resumed");
        Some(result.clone())
    }

    /// Returns a snapshot of the in-flight operation's progress, if any.
    ///
    /// While a run is in flight this reflects live, per-file updates rather
    /// than the snapshot taken when the result was first published.
    pub async fn current_progress(&self) -> Option<ProgressSnapshot> {
        let control = self.control.lock().await;
        if let Some(live) = &control.live_progress {
            return Some(live.lock().await.clone());
        }
        control.current_result.as_ref().map(|r| r.progress.clone())
    }

    /// Runs after every `execute()` exit path (success, failure, or
    /// cancellation): clears the control flags, re-opens the pause gate, and
    /// drops `current_result`/`live_progress` so a fresh run starts from a
    /// clean slate and stale control operations become no-ops.
    async fn reset_state(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
        self.paused.store(false, Ordering::SeqCst);
        let _ = self.gate_tx.send(true);
        let mut control = self.control.lock().await;
        control.current_result = None;
        control.live_progress = None;
    }
}

#[allow(clippy::too_many_arguments)]
async fn download_one_file(
    file: FileEntry,
    request: DownloadRequest,
    semaphore: Arc<Semaphore>,
    api: Arc<dyn ApiService>,
    sink: Arc<dyn SinkService>,
    rate_limiter: Arc<RateLimiter>,
    retry: RetryManager,
    progress: Arc<Mutex<ProgressSnapshot>>,
    mut gate_rx: watch::Receiver<bool>,
    cancelled: Arc<AtomicBool>,
    api_call_counter: Arc<std::sync::atomic::AtomicUsize>,
) -> Result<FileOutcome, DownloadError> {
    if cancelled.load(Ordering::SeqCst) {
        return Ok(FileOutcome::CancelledBeforeStart);
    }

    let _permit = semaphore
        .acquire_owned()
        .await
        .map_err(|_| DownloadError::Other {
            message: "download semaphore closed while a task was still in flight".to_string(),
        })?;

    wait_for_resume(&mut gate_rx).await;
    if cancelled.load(Ordering::SeqCst) {
        return Ok(FileOutcome::CancelledBeforeStart);
    }

    let target_path = Orchestrator::target_path(&request, &file);
    if target_path.exists() && !request.overwrite_existing {
        debug!(path = %file.path, "skipping existing file");
        return Ok(FileOutcome::SkippedExisting);
    }

    let download_url = file.download_url.clone().unwrap_or_default();
    rate_limiter.acquire().await;
    let content = retry
        .execute(
            || {
                let api = Arc::clone(&api);
                let download_url = download_url.clone();
                let api_call_counter = Arc::clone(&api_call_counter);
                async move {
                    api_call_counter.fetch_add(1, Ordering::SeqCst);
                    api.get_file_content(&download_url).await
                }
            },
            None,
        )
        .await?;

    wait_for_resume(&mut gate_rx).await;
    if cancelled.load(Ordering::SeqCst) {
        return Ok(FileOutcome::CancelledBeforeStart);
    }

    let bytes_written = sink
        .save_content(&content, &target_path, request.show_progress_bars)
        .await?;

    {
        let mut progress = progress.lock().await;
        progress.update_file_progress(bytes_written, file.path.clone());
        progress.complete_file();
    }

    debug!(path = %file.path, bytes = bytes_written, "downloaded");
    Ok(FileOutcome::Downloaded(bytes_written))
}

async fn wait_for_resume(gate_rx: &mut watch::Receiver<bool>) {
    loop {
        if *gate_rx.borrow() {
            return;
        }
        if gate_rx.changed().await.is_err() {
            return;
        }
    }
}
