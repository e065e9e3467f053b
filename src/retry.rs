//! Retry logic with fixed backoff
//!
//! Every queued task runs through [`run_with_retry`]: up to `max_attempts`
//! attempts, with the same pause between each. Errors that can never succeed
//! on a second try (most importantly HTTP 401) stop the loop immediately.
//!
//! # Example
//!
//! ```no_run
//! use osnova_likes::config::RetryConfig;
//! use osnova_likes::retry::run_with_retry;
//! use osnova_likes::Error;
//!
//! # async fn example() -> Result<(), Error> {
//! let config = RetryConfig::default();
//! let value = run_with_retry(
//!     &config,
//!     || async { Ok::<_, Error>(42) },
//!     |_attempt, _error| {},
//! )
//! .await?;
//! # Ok(())
//! # }
//! ```

use crate::config::RetryConfig;
use crate::error::Error;
use std::future::Future;

/// Trait for errors that can be classified as retryable or not
pub trait IsRetryable {
    /// Returns true if the operation should be attempted again
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            // Credentials must be refreshed by the caller first
            Error::Http { code: 401, .. } => false,
            Error::Http { .. } => true,
            // No HTTP response at all; treated like any other API failure
            Error::Network(e) => e.status().map(|s| s.as_u16() != 401).unwrap_or(true),
            Error::Serialization(_) => true,
            Error::Cancelled
            | Error::QueueClosed
            | Error::InvalidProfileUrl(_)
            | Error::Config { .. }
            | Error::Url(_)
            | Error::Io(_) => false,
        }
    }
}

/// Execute an async operation with fixed-delay retries
///
/// `on_backoff` is invoked with the number of the failed attempt (1-based) right
/// before each pause, which lets the caller reflect the retrying state.
///
/// Returns the first success, the first non-retryable error, or the last error
/// once `max_attempts` attempts have failed.
pub async fn run_with_retry<F, Fut, T, E, B>(
    config: &RetryConfig,
    mut operation: F,
    mut on_backoff: B,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
    B: FnMut(u32, &E),
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    tracing::info!(attempts = attempt, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) if e.is_retryable() && attempt < max_attempts => {
                tracing::warn!(
                    error = %e,
                    attempt = attempt,
                    max_attempts = max_attempts,
                    delay_ms = config.delay.as_millis() as u64,
                    "Operation failed, retrying"
                );

                on_backoff(attempt, &e);
                tokio::time::sleep(config.delay).await;
                attempt += 1;
            }
            Err(e) => {
                if e.is_retryable() {
                    tracing::error!(
                        error = %e,
                        attempts = attempt,
                        "Operation failed after all retry attempts exhausted"
                    );
                } else {
                    tracing::warn!(error = %e, "Operation failed with non-retryable error");
                }
                return Err(e);
            }
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn fast_config(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            delay: Duration::from_millis(100),
        }
    }

    #[test]
    fn unauthorized_is_not_retryable() {
        assert!(!Error::http(401, "Unauthorized").is_retryable());
        assert!(Error::http(500, "Internal Server Error").is_retryable());
        assert!(Error::http(429, "Too Many Requests").is_retryable());
        assert!(!Error::Cancelled.is_retryable());
    }

    #[test]
    fn parse_errors_are_retryable() {
        let err = serde_json::from_str::<serde_json::Value>("<html>").unwrap_err();
        assert!(Error::Serialization(err).is_retryable());
    }

    #[tokio::test]
    async fn transport_errors_are_retried() {
        let counter = Arc::new(AtomicU32::new(0));
        let calls = counter.clone();
        let mut backoffs = 0;

        let result = run_with_retry(
            &RetryConfig {
                max_attempts: 3,
                delay: Duration::from_millis(10),
            },
            || {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    // Nothing listens on the discard port
                    let response = reqwest::get("http://127.0.0.1:9/").await?;
                    Ok::<_, Error>(response.status().as_u16())
                }
            },
            |_, _| backoffs += 1,
        )
        .await;

        let err = result.unwrap_err();
        assert!(matches!(err, Error::Network(_)));
        assert!(err.is_retryable());
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        assert_eq!(backoffs, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn success_needs_no_retry() {
        let counter = Arc::new(AtomicU32::new(0));
        let calls = counter.clone();

        let result = run_with_retry(
            &fast_config(5),
            || {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, Error>(7)
                }
            },
            |_, _| panic!("no backoff expected"),
        )
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failure_then_success() {
        let counter = Arc::new(AtomicU32::new(0));
        let calls = counter.clone();
        let mut backoffs = Vec::new();

        let result = run_with_retry(
            &fast_config(5),
            || {
                let calls = calls.clone();
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(Error::http(502, "Bad Gateway"))
                    } else {
                        Ok("done")
                    }
                }
            },
            |attempt, _| backoffs.push(attempt),
        )
        .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        assert_eq!(backoffs, vec![1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausts_after_max_attempts_with_fixed_delay() {
        let counter = Arc::new(AtomicU32::new(0));
        let calls = counter.clone();
        let start = tokio::time::Instant::now();

        let result = run_with_retry(
            &fast_config(5),
            || {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(Error::http(500, "Internal Server Error"))
                }
            },
            |_, _| {},
        )
        .await;

        assert_eq!(result.unwrap_err().code(), Some(500));
        assert_eq!(counter.load(Ordering::SeqCst), 5);
        assert!(start.elapsed() >= Duration::from_millis(400));
    }

    #[tokio::test(start_paused = true)]
    async fn unauthorized_stops_immediately() {
        let counter = Arc::new(AtomicU32::new(0));
        let calls = counter.clone();

        let result = run_with_retry(
            &fast_config(5),
            || {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(Error::http(401, "Unauthorized"))
                }
            },
            |_, _| panic!("401 must not back off"),
        )
        .await;

        assert!(result.unwrap_err().is_unauthorized());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
