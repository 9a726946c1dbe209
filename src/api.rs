//! `ApiService`: the contract the orchestrator depends on to talk to a
//! remote GitHub-style repository host.
//!
//! No concrete HTTP-backed implementation lives in this crate — a real
//! `ApiService` is the caller's responsibility to supply (it owns the
//! concrete HTTP client, authentication, and rate-limit header plumbing).
//! [`InMemoryApi`] exists only to drive this crate's own orchestrator tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::DownloadError;
use crate::types::{FileEntry, GitRef, RepositoryRef};

/// Metadata about a repository beyond its owner/name, as returned by
/// `get_repository_info`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepositoryMetadata {
    pub default_branch: String,
    pub description: Option<String>,
    pub is_private: bool,
}

/// Operations the orchestrator needs from a remote repository host.
///
/// Uses `async_trait` for `Arc<dyn ApiService + Send + Sync>` dynamic
/// dispatch: Rust's native async traits are not yet object-safe, so
/// `async_trait` is required wherever the orchestrator holds a trait object
/// rather than a concrete, statically-known type.
#[async_trait]
pub trait ApiService: Send + Sync {
    /// Returns the full recursive file listing for `git_ref`.
    async fn get_repository_tree(
        &self,
        repository: &RepositoryRef,
        git_ref: &GitRef,
    ) -> Result<Vec<FileEntry>, DownloadError>;

    /// Fetches the raw bytes behind a [`FileEntry::download_url`].
    async fn get_file_content(&self, download_url: &str) -> Result<Vec<u8>, DownloadError>;

    /// Disambiguates a user-supplied ref string (branch/tag/short-sha) into
    /// a fully-resolved [`GitRef`].
    async fn resolve_reference(
        &self,
        repository: &RepositoryRef,
        ref_name: &str,
    ) -> Result<GitRef, DownloadError>;

    /// Resolves repository-level metadata (default branch, visibility, …)
    /// for a repository the orchestrator does not otherwise need to touch
    /// during `execute`, but which embedders use to default `GitRef` when
    /// the caller did not specify one.
    async fn get_repository_info(
        &self,
        repository: &RepositoryRef,
    ) -> Result<RepositoryMetadata, DownloadError>;
}

/// In-process test double: serves a fixed manifest and byte map, and
/// records call counts without touching the network.
#[derive(Default)]
pub struct InMemoryApi {
    tree: Vec<FileEntry>,
    contents: HashMap<String, Vec<u8>>,
    calls: Mutex<usize>,
    fail_urls: HashMap<String, DownloadError>,
    metadata: RepositoryMetadata,
}

impl InMemoryApi {
    #[must_use]
    pub fn new(tree: Vec<FileEntry>, contents: HashMap<String, Vec<u8>>) -> Self {
        Self {
            tree,
            contents,
            calls: Mutex::new(0),
            fail_urls: HashMap::new(),
            metadata: RepositoryMetadata {
                default_branch: "main".to_string(),
                description: None,
                is_private: false,
            },
        }
    }

    /// Makes `get_file_content(url)` return `error` instead of looking up
    /// `contents`, for exercising the orchestrator's per-file failure path.
    #[must_use]
    pub fn failing_on(mut self, url: impl Into<String>, error: DownloadError) -> Self {
        self.fail_urls.insert(url.into(), error);
        self
    }

    #[must_use]
    pub fn call_count(&self) -> usize {
        *self.calls.lock().unwrap_or_else(|poison| poison.into_inner())
    }
}

#[async_trait]
impl ApiService for InMemoryApi {
    async fn get_repository_tree(
        &self,
        _repository: &RepositoryRef,
        _git_ref: &GitRef,
    ) -> Result<Vec<FileEntry>, DownloadError> {
        *self.calls.lock().unwrap_or_else(|poison| poison.into_inner()) += 1;
        Ok(self.tree.clone())
    }

    async fn get_file_content(&self, download_url: &str) -> Result<Vec<u8>, DownloadError> {
        *self.calls.lock().unwrap_or_else(|poison| poison.into_inner()) += 1;
        if let Some(err) = self.fail_urls.get(download_url) {
            return Err(clone_error(err));
        }
        self.contents
            .get(download_url)
            .cloned()
            .ok_or_else(|| DownloadError::not_found(download_url))
    }

    async fn resolve_reference(
        &self,
        _repository: &RepositoryRef,
        ref_name: &str,
    ) -> Result<GitRef, DownloadError> {
        Ok(crate::types::GitRef::branch(ref_name))
    }

    async fn get_repository_info(
        &self,
        _repository: &RepositoryRef,
    ) -> Result<RepositoryMetadata, DownloadError> {
        *self.calls.lock().unwrap_or_else(|poison| poison.into_inner()) += 1;
        Ok(self.metadata.clone())
    }
}

fn clone_error(err: &DownloadError) -> DownloadError {
    match err {
        DownloadError::RateLimit { url, retry_after_secs } => {
            DownloadError::rate_limit(url.clone(), *retry_after_secs)
        }
        DownloadError::AuthRequired { url, domain, status } => {
            DownloadError::auth_required(url.clone(), domain.clone(), *status)
        }
        DownloadError::NotFound { url } => DownloadError::not_found(url.clone()),
        DownloadError::Transport { url, message } => DownloadError::transport(url.clone(), message.clone()),
        DownloadError::Timeout { url } => DownloadError::timeout(url.clone()),
        DownloadError::Connection { url, message } => DownloadError::connection(url.clone(), message.clone()),
        DownloadError::Io { path, source } => {
            DownloadError::io(path.clone(), std::io::Error::new(source.kind(), source.to_string()))
        }
        DownloadError::Other { message } => DownloadError::Other { message: message.clone() },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_repository_info_returns_configured_metadata_and_counts_the_call() {
        let api = InMemoryApi::new(vec![], HashMap::new());
        let repo = RepositoryRef::new("octo", "widgets");

        let info = api.get_repository_info(&repo).await.unwrap();

        assert_eq!(info.default_branch, "main");
        assert!(!info.is_private);
        assert_eq!(api.call_count(), 1);
    }

    #[tokio::test]
    async fn resolve_reference_yields_a_branch_ref() {
        let api = InMemoryApi::new(vec![], HashMap::new());
        let repo = RepositoryRef::new("octo", "widgets");

        let git_ref = api.resolve_reference(&repo, "develop").await.unwrap();

        assert_eq!(git_ref.name, "develop");
        assert_eq!(git_ref.kind, crate::types::GitRefKind::Branch);
    }
}
