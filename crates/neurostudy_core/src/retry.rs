//! crates/neurostudy_core/src/retry.rs
//!
//! A reusable retry-with-backoff policy for outbound calls.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::ports::{PortError, PortResult};

/// Statuses the generation provider uses for "try again later".
pub const RATE_LIMITED: u16 = 429;
pub const UNAVAILABLE: u16 = 503;

fn is_transient(err: &PortError) -> bool {
    matches!(err.status(), Some(RATE_LIMITED) | Some(UNAVAILABLE))
}

/// Exponential backoff policy: wait `initial_backoff * multiplier^n` before retry `n`.
#[derive(Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub multiplier: u32,
    pub retryable: fn(&PortError) -> bool,
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_retries", &self.max_retries)
            .field("initial_backoff", &self.initial_backoff)
            .field("multiplier", &self.multiplier)
            .finish_non_exhaustive()
    }
}

impl Default for RetryPolicy {
    /// Three retries on 429/503, starting at five seconds and doubling.
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_secs(5),
            multiplier: 2,
            retryable: is_transient,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    pub fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }

    /// The delay before retry number `attempt` (zero-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        self.initial_backoff * self.multiplier.saturating_pow(attempt)
    }

    /// Runs `op`, retrying transient failures according to the policy.
    ///
    /// Non-retryable errors are returned immediately. When the retries are
    /// exhausted the last error is returned.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> PortResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = PortResult<T>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if attempt < self.max_retries && (self.retryable)(&err) => {
                    let delay = self.backoff_for(attempt);
                    warn!(
                        "Transient provider error ({}), retry {}/{} in {:?}",
                        err,
                        attempt + 1,
                        self.max_retries,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    fn provider_error(status: u16) -> PortError {
        PortError::Provider {
            status,
            message: "test".to_string(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_two_rate_limits() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let started = Instant::now();

        let result = RetryPolicy::default()
            .run(move || async move {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(provider_error(429))
                } else {
                    Ok("guide")
                }
            })
            .await;

        assert_eq!(result, Ok("guide"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        let waited = started.elapsed();
        assert!(waited >= Duration::from_secs(15), "waited {:?}", waited);
        assert!(waited < Duration::from_secs(16), "waited {:?}", waited);
    }

    #[tokio::test(start_paused = true)]
    async fn bad_request_is_not_retried() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let started = Instant::now();

        let result: PortResult<()> = RetryPolicy::default()
            .run(move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(provider_error(400))
            })
            .await;

        assert_eq!(result, Err(provider_error(400)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_retries() {
        let calls = AtomicU32::new(0);
        let counter = &calls;

        let result: PortResult<()> = RetryPolicy::default()
            .run(move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(provider_error(503))
            })
            .await;

        assert_eq!(result, Err(provider_error(503)));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn backoff_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_for(0), Duration::from_secs(5));
        assert_eq!(policy.backoff_for(1), Duration::from_secs(10));
        assert_eq!(policy.backoff_for(2), Duration::from_secs(20));
    }

    #[tokio::test]
    async fn non_provider_errors_propagate() {
        let result: PortResult<()> = RetryPolicy::default()
            .run(|| async { Err(PortError::Configuration("GEMINI_API_KEY".to_string())) })
            .await;
        assert!(matches!(result, Err(PortError::Configuration(_))));
    }
}
