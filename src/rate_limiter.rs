//! Global rate limiter gating outbound calls to the remote API.
//!
//! Unlike the per-domain limiter this crate's lineage once used for
//! scraping arbitrary sites (keyed by a `DashMap<String, DomainState>`),
//! the remote service here exposes a single, service-wide rate budget via
//! `x-ratelimit-*` response headers, so there is exactly one limiter state,
//! guarded by one lock.

use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rand::Rng;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::types::RateLimitInfo;

const DEFAULT_DELAY: Duration = Duration::from_millis(500);
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);

struct LimiterState {
    info: RateLimitInfo,
    consecutive_exhaustions: u32,
    last_request: Option<Instant>,
}

/// Coordinates request pacing against the remote service's rate-limit
/// headers, with an adaptive self-imposed backoff layered on top.
pub struct RateLimiter {
    default_delay: Duration,
    max_delay: Duration,
    adaptive: bool,
    state: Mutex<LimiterState>,
}

impl RateLimiter {
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(DEFAULT_DELAY, DEFAULT_MAX_DELAY, true)
    }

    #[must_use]
    pub fn with_config(default_delay: Duration, max_delay: Duration, adaptive: bool) -> Self {
        Self {
            default_delay,
            max_delay,
            adaptive,
            state: Mutex::new(LimiterState {
                info: RateLimitInfo::default(),
                consecutive_exhaustions: 0,
                last_request: None,
            }),
        }
    }

    #[must_use]
    pub fn default_delay(&self) -> Duration {
        self.default_delay
    }

    /// Parses `x-ratelimit-*` response headers and updates internal state,
    /// tracking how many consecutive observations have been exhausted.
    pub async fn update_from_headers(&self, headers: &HashMap<String, String>) {
        let mut state = self.state.lock().await;

        if let Some(limit) = headers.get("x-ratelimit-limit").and_then(|v| v.parse().ok()) {
            state.info.limit = limit;
        }
        if let Some(remaining) = headers
            .get("x-ratelimit-remaining")
            .and_then(|v| v.parse().ok())
        {
            state.info.remaining = remaining;
        }
        if let Some(used) = headers.get("x-ratelimit-used").and_then(|v| v.parse().ok()) {
            state.info.used = used;
        }
        if let Some(reset) = headers
            .get("x-ratelimit-reset")
            .and_then(|v| v.parse::<u64>().ok())
        {
            state.info.reset_time = Some(UNIX_EPOCH + Duration::from_secs(reset));
        }

        if state.info.is_exhausted() {
            state.consecutive_exhaustions += 1;
        } else {
            state.consecutive_exhaustions = 0;
        }
    }

    /// Suspends the caller long enough to respect both the server's primary
    /// rate-limit window and this limiter's own adaptive pacing.
    pub async fn acquire(&self) {
        let mut state = self.state.lock().await;

        if state.info.is_exhausted() {
            let reset_in = state.info.reset_in();
            if !reset_in.is_zero() {
                debug!(seconds = reset_in.as_secs_f64(), "rate limit exhausted, waiting for reset");
                tokio::time::sleep(reset_in).await;
            }
        } else if self.adaptive {
            let multiplier = 1 + state.consecutive_exhaustions;
            let mut delay = self.default_delay.saturating_mul(multiplier);
            if delay > self.max_delay {
                delay = self.max_delay;
            }
            delay = jitter(delay);

            let elapsed = state
                .last_request
                .map_or(Duration::ZERO, |last| last.elapsed());
            let wait = delay.saturating_sub(elapsed);
            if !wait.is_zero() {
                tokio::time::sleep(wait).await;
            }
        }

        state.last_request = Some(Instant::now());
    }

    pub async fn rate_limit_info(&self) -> RateLimitInfo {
        self.state.lock().await.info.clone()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

/// Applies a ±10% jitter so concurrently-waking callers don't all retry in lockstep.
fn jitter(delay: Duration) -> Duration {
    let factor = rand::thread_rng().gen_range(0.9..=1.1);
    Duration::from_secs_f64((delay.as_secs_f64() * factor).max(0.0))
}
