//! Error taxonomy for the remote-service boundary.
//!
//! Per-file errors never abort a run; they are captured by the orchestrator
//! into `failed_files` by their `Display` form. Manifest-fetch and
//! destination-creation errors are terminal and carry the whole run to
//! `DownloadStatus::Failed`.

use std::io;

use thiserror::Error;

/// An error surfaced by an [`crate::api::ApiService`] or [`crate::sink::SinkService`]
/// implementation.
///
/// Deliberately does not implement `From<io::Error>` or any transport error
/// type: call sites attach the URL/path context a bare conversion would lose.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("rate limit exceeded for {url}, resets in {retry_after_secs}s")]
    RateLimit {
        url: String,
        retry_after_secs: u64,
    },

    #[error("authentication required for {domain} ({url}, status {status})")]
    AuthRequired {
        url: String,
        domain: String,
        status: u16,
    },

    #[error("repository or file not found: {url}")]
    NotFound { url: String },

    #[error("transport error fetching {url}: {message}")]
    Transport { url: String, message: String },

    #[error("timed out fetching {url}")]
    Timeout { url: String },

    #[error("connection error fetching {url}: {message}")]
    Connection { url: String, message: String },

    #[error("io error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("{message}")]
    Other { message: String },
}

impl DownloadError {
    #[must_use]
    pub fn rate_limit(url: impl Into<String>, retry_after_secs: u64) -> Self {
        Self::RateLimit {
            url: url.into(),
            retry_after_secs,
        }
    }

    #[must_use]
    pub fn auth_required(url: impl Into<String>, domain: impl Into<String>, status: u16) -> Self {
        Self::AuthRequired {
            url: url.into(),
            domain: domain.into(),
            status,
        }
    }

    #[must_use]
    pub fn not_found(url: impl Into<String>) -> Self {
        Self::NotFound { url: url.into() }
    }

    #[must_use]
    pub fn transport(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            url: url.into(),
            message: message.into(),
        }
    }

    #[must_use]
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    #[must_use]
    pub fn connection(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Connection {
            url: url.into(),
            message: message.into(),
        }
    }

    #[must_use]
    pub fn io(path: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether the Retry Manager's default policy should retry this kind.
    ///
    /// Transport, timeout, connection, and explicit rate-limit errors are
    /// retryable. Authentication and not-found errors are never retried.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimit { .. } | Self::Transport { .. } | Self::Timeout { .. } | Self::Connection { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_kinds() {
        assert!(DownloadError::rate_limit("u", 1).is_retryable());
        assert!(DownloadError::transport("u", "m").is_retryable());
        assert!(DownloadError::timeout("u").is_retryable());
        assert!(DownloadError::connection("u", "m").is_retryable());
    }

    #[test]
    fn non_retryable_kinds() {
        assert!(!DownloadError::auth_required("u", "d", 401).is_retryable());
        assert!(!DownloadError::not_found("u").is_retryable());
        assert!(!DownloadError::Other { message: "x".into() }.is_retryable());
    }
}
