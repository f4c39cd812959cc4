//! Retry helpers for code host requests that hit rate limits.

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};

/// Initial delay before the first retry.
pub const INITIAL_BACKOFF_MS: u64 = 1_000;
/// Upper bound on any single retry delay.
pub const MAX_BACKOFF_MS: u64 = 60_000;
/// Retries attempted before a rate limit error is surfaced.
pub const MAX_RETRIES: usize = 5;

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub min_delay: Duration,
    pub max_delay: Duration,
    pub max_retries: usize,
    pub with_jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            min_delay: Duration::from_millis(INITIAL_BACKOFF_MS),
            max_delay: Duration::from_millis(MAX_BACKOFF_MS),
            max_retries: MAX_RETRIES,
            with_jitter: true,
        }
    }
}

impl RetryConfig {
    #[must_use]
    pub fn new(min_delay: Duration, max_delay: Duration, max_retries: usize) -> Self {
        Self {
            min_delay,
            max_delay,
            max_retries,
            with_jitter: true,
        }
    }

    #[must_use]
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.with_jitter = jitter;
        self
    }

    #[must_use]
    pub fn into_backoff(self) -> ExponentialBuilder {
        let builder = ExponentialBuilder::default()
            .with_min_delay(self.min_delay)
            .with_max_delay(self.max_delay)
            .with_max_times(self.max_retries);

        if self.with_jitter {
            builder.with_jitter()
        } else {
            builder
        }
    }
}

/// Run `operation`, retrying with exponential backoff while `is_retryable`
/// holds for the returned error.
///
/// `what` names the request in debug logs.
pub async fn with_retry<T, E, F, Fut, IsRetryable>(
    mut operation: F,
    config: RetryConfig,
    is_retryable: IsRetryable,
    what: &str,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::error::Error,
    IsRetryable: Fn(&E) -> bool,
{
    let attempt = AtomicU32::new(0);

    let retry_op = || {
        attempt.fetch_add(1, Ordering::SeqCst);
        operation()
    };

    retry_op
        .retry(config.into_backoff())
        .notify(|err, dur| {
            tracing::debug!(
                request = what,
                attempt = attempt.load(Ordering::SeqCst),
                delay = ?dur,
                "Rate limited, retrying: {err}"
            );
        })
        .when(is_retryable)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[derive(Debug, Clone)]
    struct TestError {
        message: &'static str,
        rate_limited: bool,
    }

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{}", self.message)
        }
    }

    impl std::error::Error for TestError {}

    #[test]
    fn test_retry_config_default() {
        let config = RetryConfig::default();
        assert_eq!(config.min_delay, Duration::from_secs(1));
        assert_eq!(config.max_delay, Duration::from_secs(60));
        assert_eq!(config.max_retries, MAX_RETRIES);
        assert!(config.with_jitter);
        assert!(!config.with_jitter(false).with_jitter);
    }

    #[tokio::test(start_paused = true)]
    async fn with_retry_retries_rate_limit_errors_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_capture = Arc::clone(&calls);
        let operation = move || {
            let calls_capture = Arc::clone(&calls_capture);
            async move {
                if calls_capture.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(TestError {
                        message: "rate limited",
                        rate_limited: true,
                    })
                } else {
                    Ok(42u32)
                }
            }
        };

        let result = with_retry(
            operation,
            RetryConfig::default(),
            |e: &TestError| e.rate_limited,
            "GET /user/repos",
        )
        .await;

        assert_eq!(result.expect("third attempt succeeds"), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn with_retry_does_not_retry_other_errors() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_capture = Arc::clone(&calls);
        let operation = move || {
            let calls_capture = Arc::clone(&calls_capture);
            async move {
                calls_capture.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(TestError {
                    message: "boom",
                    rate_limited: false,
                })
            }
        };

        let err = with_retry(
            operation,
            RetryConfig::default(),
            |e: &TestError| e.rate_limited,
            "GET /user",
        )
        .await
        .expect_err("expected error");

        assert_eq!(err.to_string(), "boom");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
