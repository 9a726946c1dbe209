//! Retry Manager: re-invokes an async operation on classified-retryable
//! failures with bounded exponential backoff and multiplicative jitter.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{error, warn};

/// Decides whether a particular error value should trigger a retry.
///
/// Implemented for [`crate::error::DownloadError`] via its `is_retryable`
/// method, but kept generic so the Retry Manager can wrap operations that
/// fail with other error types (e.g. a concrete sink's I/O errors).
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for crate::error::DownloadError {
    fn is_retryable(&self) -> bool {
        crate::error::DownloadError::is_retryable(self)
    }
}

/// Backoff configuration for [`RetryManager`].
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub exponential_base: f64,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            exponential_base: 2.0,
            jitter: true,
        }
    }
}

/// Re-invokes a fallible async operation on retryable failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryManager {
    config: RetryConfig,
}

impl RetryManager {
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: RetryConfig::default(),
        }
    }

    #[must_use]
    pub fn with_config(config: RetryConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn max_retries(&self) -> u32 {
        self.config.max_retries
    }

    /// `d(n) = min(max_delay, base_delay * exponential_base^n)`, optionally
    /// scaled by a uniform `[0.8, 1.2]` jitter factor. `n` is the zero-based
    /// retry attempt index (the delay waited *before* that attempt).
    #[must_use]
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let raw = self.config.base_delay.as_secs_f64()
            * self.config.exponential_base.powi(attempt as i32);
        let capped = raw.min(self.config.max_delay.as_secs_f64());
        let scaled = if self.config.jitter {
            capped * rand::thread_rng().gen_range(0.8..=1.2)
        } else {
            capped
        };
        Duration::from_secs_f64(scaled.max(0.0))
    }

    /// Runs `operation`, retrying on errors for which `E: Retryable` reports
    /// `true`, up to `max_retries` (an override, when given, replaces the
    /// manager's configured value for this call only).
    ///
    /// Total attempts made is at most `max_retries + 1`. On exhaustion, the
    /// most recent retryable error is returned.
    pub async fn execute<F, Fut, T, E>(&self, mut operation: F, max_retries: Option<u32>) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + std::fmt::Display,
    {
        let max_retries = max_retries.unwrap_or(self.config.max_retries);
        let mut attempt: u32 = 0;

        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) if !err.is_retryable() => return Err(err),
                Err(err) => {
                    if attempt >= max_retries {
                        error!(
                            attempts = attempt + 1,
                            "all {} attempts failed, giving up",
                            attempt + 1
                        );
                        return Err(err);
                    }
                    let delay = self.calculate_delay(attempt);
                    warn!(attempt = attempt + 1, error = %err, delay_secs = delay.as_secs_f64(), "attempt failed, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

impl Default for RetryManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    struct Retryable0(bool);
    impl std::fmt::Display for Retryable0 {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "err")
        }
    }
    impl Retryable for Retryable0 {
        fn is_retryable(&self) -> bool {
            self.0
        }
    }

    #[tokio::test]
    async fn succeeds_without_retry() {
        let manager = RetryManager::new();
        let calls = AtomicU32::new(0);
        let result: Result<&str, Retryable0> = manager
            .execute(
                || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Ok("done") }
                },
                None,
            )
            .await;
        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_retryable_errors_until_success() {
        let manager = RetryManager::with_config(RetryConfig {
            base_delay: Duration::from_millis(1),
            ..RetryConfig::default()
        });
        let calls = AtomicU32::new(0);
        let result: Result<&str, Retryable0> = manager
            .execute(
                || {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    async move {
                        if n < 2 {
                            Err(Retryable0(true))
                        } else {
                            Ok("success_after_retries")
                        }
                    }
                },
                None,
            )
            .await;
        assert_eq!(result.unwrap(), "success_after_retries");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn stops_after_max_attempts() {
        let manager = RetryManager::with_config(RetryConfig {
            max_retries: 2,
            base_delay: Duration::from_millis(1),
            ..RetryConfig::default()
        });
        let calls = AtomicU32::new(0);
        let result: Result<&str, Retryable0> = manager
            .execute(
                || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err(Retryable0(true)) }
                },
                None,
            )
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn per_call_max_retries_overrides_default() {
        let manager = RetryManager::with_config(RetryConfig {
            max_retries: 5,
            base_delay: Duration::from_millis(1),
            ..RetryConfig::default()
        });
        let calls = AtomicU32::new(0);
        let result: Result<&str, Retryable0> = manager
            .execute(
                || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err(Retryable0(true)) }
                },
                Some(1),
            )
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn non_retryable_error_raised_immediately() {
        let manager = RetryManager::new();
        let calls = AtomicU32::new(0);
        let result: Result<&str, Retryable0> = manager
            .execute(
                || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err(Retryable0(false)) }
                },
                None,
            )
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn delay_grows_exponentially_without_jitter() {
        let manager = RetryManager::with_config(RetryConfig {
            base_delay: Duration::from_secs(1),
            exponential_base: 2.0,
            max_delay: Duration::from_secs(100),
            jitter: false,
            ..RetryConfig::default()
        });
        assert_eq!(manager.calculate_delay(0), Duration::from_secs(1));
        assert_eq!(manager.calculate_delay(1), Duration::from_secs(2));
        assert_eq!(manager.calculate_delay(2), Duration::from_secs(4));
        assert_eq!(manager.calculate_delay(3), Duration::from_secs(8));
    }

    #[test]
    fn delay_respects_max_delay_cap() {
        let manager = RetryManager::with_config(RetryConfig {
            base_delay: Duration::from_secs(10),
            exponential_base: 3.0,
            max_delay: Duration::from_secs(15),
            jitter: false,
            ..RetryConfig::default()
        });
        assert_eq!(manager.calculate_delay(0), Duration::from_secs(10));
        assert_eq!(manager.calculate_delay(1), Duration::from_secs(15));
        assert_eq!(manager.calculate_delay(2), Duration::from_secs(15));
    }

    #[test]
    fn jitter_keeps_delay_within_twenty_percent() {
        let manager = RetryManager::with_config(RetryConfig {
            base_delay: Duration::from_secs(10),
            exponential_base: 2.0,
            max_delay: Duration::from_secs(100),
            jitter: true,
            ..RetryConfig::default()
        });
        let mut saw_variation = false;
        let first = manager.calculate_delay(0).as_secs_f64();
        for _ in 0..100 {
            let delay = manager.calculate_delay(0).as_secs_f64();
            assert!((8.0..=12.0).contains(&delay));
            if (delay - first).abs() > f64::EPSILON {
                saw_variation = true;
            }
        }
        assert!(saw_variation);
    }
}
