//! Concurrent download orchestrator core.
//!
//! This library selectively downloads the contents of a remote
//! GitHub-style repository to a local directory, honoring include/exclude
//! filters, preserving or flattening the source tree, and exposing live
//! control (pause, resume, cancel) over a running operation.
//!
//! # Architecture
//!
//! - [`types`] - the data model: repository refs, file manifests, requests, results
//! - [`filter`] - Filter Engine: pure include/exclude partitioning
//! - [`rate_limiter`] - Rate Limiter: paces outbound calls against a server-supplied budget
//! - [`retry`] - Retry Manager: bounded exponential backoff with jitter
//! - [`error`] - the error taxonomy at the remote-service boundary
//! - [`api`] - `ApiService`: the remote-repository contract (no concrete HTTP client)
//! - [`sink`] - `SinkService`: the filesystem-write contract, plus a concrete implementation
//! - [`orchestrator`] - composes the above into bounded-concurrency runs
//!
//! Deliberately out of scope: a CLI frontend, configuration file loading,
//! a high-level download-directory/download-file façade, logging sink
//! setup, and any concrete HTTP client.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod api;
pub mod error;
pub mod filter;
pub mod orchestrator;
pub mod rate_limiter;
pub mod retry;
pub mod sink;
pub mod types;

pub use api::{ApiService, InMemoryApi, RepositoryMetadata};
pub use error::DownloadError;
pub use filter::{filter_files, FilterResult};
pub use orchestrator::{Orchestrator, OrchestratorError};
pub use rate_limiter::RateLimiter;
pub use retry::{RetryConfig, RetryManager, Retryable};
pub use sink::{FilesystemSink, InMemorySink, SinkService};
pub use types::{
    DownloadRequest, DownloadRequestError, DownloadResult, DownloadStatistics, DownloadStatus,
    EntryKind, FileEntry, FilterCriteria, GitRef, GitRefKind, ProgressSnapshot, RateLimitInfo,
    RepositoryRef,
};
