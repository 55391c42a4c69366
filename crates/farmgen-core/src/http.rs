//! Shared HTTP client construction and bounded retry with exponential backoff.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::UpstreamError;

/// How often and how patiently transient upstream failures are retried.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts including the first one.  `0` behaves like `1`.
    pub max_attempts: u32,
    /// Delay before the first retry; doubled for each further retry.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// No retries at all.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
        }
    }

    /// Backoff before retry number `retry` (0-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(retry))
    }
}

/// Build the process-wide `reqwest` client.  Every request made through it
/// is bounded by `timeout`.
pub fn build_client(timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .user_agent(concat!("farmgen/", env!("CARGO_PKG_VERSION")))
        .timeout(timeout)
        .build()
}

/// Run `op` until it succeeds, fails permanently, or the policy's attempt
/// budget is spent.  Only [`UpstreamError::is_transient`] failures are retried.
pub async fn with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &'static str,
    op: F,
) -> Result<T, UpstreamError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, UpstreamError>>,
{
    with_backoff_if(policy, operation, UpstreamError::is_transient, op).await
}

/// Like [`with_backoff`], but only failures accepted by `retryable` are
/// retried.  Used for calls that are not idempotent.
pub async fn with_backoff_if<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &'static str,
    retryable: fn(&UpstreamError) -> bool,
    mut op: F,
) -> Result<T, UpstreamError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, UpstreamError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut retry = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if retryable(&e) && retry + 1 < max_attempts => {
                let delay = policy.delay_for(retry);
                warn!(
                    operation,
                    attempt = retry + 1,
                    error = %e,
                    delay_ms = delay.as_millis() as u64,
                    "transient upstream failure; retrying"
                );
                tokio::time::sleep(delay).await;
                retry += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::error::UpstreamErrorKind;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
        }
    }

    #[test]
    fn delay_doubles() {
        let p = RetryPolicy {
            max_attempts: 4,
            base_delay: Duration::from_millis(100),
        };
        assert_eq!(p.delay_for(0), Duration::from_millis(100));
        assert_eq!(p.delay_for(2), Duration::from_millis(400));
    }

    #[tokio::test]
    async fn transient_failures_are_retried_until_success() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result = with_backoff(&fast(3), "test", move || async move {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(UpstreamError::new("test", UpstreamErrorKind::Server, "502"))
            } else {
                Ok(n)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_failures_are_not_retried() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<(), _> = with_backoff(&fast(5), "test", move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(UpstreamError::new("test", UpstreamErrorKind::Unauthorized, "bad key"))
        })
        .await;
        assert_eq!(result.unwrap_err().kind, UpstreamErrorKind::Unauthorized);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn attempts_are_bounded() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<(), _> = with_backoff(&fast(3), "test", move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(UpstreamError::new("test", UpstreamErrorKind::RateLimited, "slow down"))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn predicate_narrows_what_is_retried() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<(), _> = with_backoff_if(
            &fast(5),
            "test",
            |e| e.kind == UpstreamErrorKind::RateLimited,
            move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(UpstreamError::new("test", UpstreamErrorKind::Timeout, "deadline"))
            },
        )
        .await;
        assert_eq!(result.unwrap_err().kind, UpstreamErrorKind::Timeout);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
