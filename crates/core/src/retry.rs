//! Retry mechanism with exponential backoff and jitter
//!
//! Every single-request store call that mutates or probes an object goes
//! through [`retry_with_backoff`]. Listing pages and ranged stream reads do not.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default number of attempts per call (first try included)
pub const DEFAULT_MAX_ATTEMPTS: u32 = 4;

/// Which failures a [`RetryPolicy`] retries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetryOn {
    /// Only transient failures (network, throttling, timeouts)
    #[default]
    Transient,
    /// Every failure, including rejected requests and missing keys
    Any,
}

/// Retry policy for store calls
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of attempts, first try included
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial backoff duration in milliseconds
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    /// Maximum backoff duration in milliseconds
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,

    /// Failure classes worth another attempt
    #[serde(default)]
    pub retry_on: RetryOn,
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_initial_backoff() -> u64 {
    100
}

fn default_max_backoff() -> u64 {
    10000
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
            retry_on: RetryOn::default(),
        }
    }
}

impl RetryPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.max_attempts = n.max(1);
        self
    }

    pub fn initial_backoff_ms(mut self, ms: u64) -> Self {
        self.initial_backoff_ms = ms;
        self
    }

    pub fn max_backoff_ms(mut self, ms: u64) -> Self {
        self.max_backoff_ms = ms;
        self
    }

    pub fn retry_on(mut self, retry_on: RetryOn) -> Self {
        self.retry_on = retry_on;
        self
    }

    /// A single attempt, no backoff
    pub fn none() -> Self {
        Self::default().max_attempts(1)
    }

    /// Whether this policy retries the given error
    pub fn should_retry(&self, error: &Error) -> bool {
        match self.retry_on {
            RetryOn::Any => true,
            RetryOn::Transient => is_retryable_error(error),
        }
    }

    /// Backoff before the attempt following `attempt` (1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        calculate_backoff(self, attempt)
    }
}

/// Retry a fallible async operation according to `policy`
///
/// Non-retryable errors, and any error under a single-attempt policy, are
/// returned as they are. When the attempt budget is spent the last error is
/// wrapped in [`Error::RetriesExhausted`].
///
/// # Example
/// ```ignore
/// let info = retry_with_backoff(&policy, "head_object", || async {
///     store.head_object(bucket, key).await
/// })
/// .await?;
/// ```
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    operation_name: &str,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                if max_attempts == 1 || !policy.should_retry(&e) {
                    return Err(e);
                }
                if attempt >= max_attempts {
                    tracing::debug!(
                        operation = operation_name,
                        attempts = attempt,
                        error = %e,
                        "Retry budget exhausted"
                    );
                    return Err(Error::RetriesExhausted {
                        attempts: attempt,
                        source: Box::new(e),
                    });
                }

                let backoff = policy.backoff(attempt);
                tracing::debug!(
                    operation = operation_name,
                    attempt = attempt,
                    backoff_ms = backoff.as_millis(),
                    error = %e,
                    "Retrying after error"
                );

                tokio::time::sleep(backoff).await;
            }
        }
    }
}

/// Calculate backoff duration with jitter
fn calculate_backoff(policy: &RetryPolicy, attempt: u32) -> Duration {
    // Exponential backoff: initial * 2^(attempt-1)
    let base_ms = policy
        .initial_backoff_ms
        .saturating_mul(1u64 << (attempt.saturating_sub(1)).min(10));
    let capped_ms = base_ms.min(policy.max_backoff_ms);

    let jitter_ms = rand::thread_rng().gen_range(0..capped_ms.max(1));
    Duration::from_millis(capped_ms + jitter_ms)
}

/// Check if an error is transient
pub fn is_retryable_error(error: &Error) -> bool {
    match error {
        Error::Network(_) => true,
        Error::Io(e) => matches!(
            e.kind(),
            std::io::ErrorKind::ConnectionReset
                | std::io::ErrorKind::ConnectionRefused
                | std::io::ErrorKind::ConnectionAborted
                | std::io::ErrorKind::TimedOut
                | std::io::ErrorKind::Interrupted
        ),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new()
            .max_attempts(max_attempts)
            .initial_backoff_ms(1)
            .max_backoff_ms(5)
    }

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 4);
        assert_eq!(policy.retry_on, RetryOn::Transient);
    }

    #[test]
    fn test_calculate_backoff() {
        let policy = RetryPolicy::new().initial_backoff_ms(100).max_backoff_ms(10000);

        let b1 = policy.backoff(1);
        assert!(b1.as_millis() >= 100 && b1.as_millis() < 200);

        let b2 = policy.backoff(2);
        assert!(b2.as_millis() >= 200 && b2.as_millis() < 400);

        let b3 = policy.backoff(3);
        assert!(b3.as_millis() >= 400 && b3.as_millis() < 800);
    }

    #[test]
    fn test_backoff_cap() {
        let policy = RetryPolicy::new().initial_backoff_ms(1000).max_backoff_ms(5000);
        let b = policy.backoff(10);
        assert!(b.as_millis() < 10000);
    }

    #[test]
    fn test_is_retryable_error() {
        assert!(is_retryable_error(&Error::Network("connection timeout".into())));
        assert!(is_retryable_error(&Error::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "reset"
        ))));
        assert!(!is_retryable_error(&Error::Auth("access denied".into())));
        assert!(!is_retryable_error(&Error::NotFound("gone".into())));
        assert!(!is_retryable_error(&Error::Request("malformed".into())));
    }

    #[test]
    fn test_retry_on_any_retries_everything() {
        let policy = RetryPolicy::new().retry_on(RetryOn::Any);
        assert!(policy.should_retry(&Error::Request("malformed".into())));
    }

    #[test]
    fn test_policy_from_toml() {
        let policy: RetryPolicy = toml::from_str("max_attempts = 2\nretry_on = \"any\"").unwrap();
        assert_eq!(policy.max_attempts, 2);
        assert_eq!(policy.retry_on, RetryOn::Any);
        assert_eq!(policy.initial_backoff_ms, 100);
    }

    #[tokio::test]
    async fn test_retry_success_first_attempt() {
        let mut calls = 0;

        let result = retry_with_backoff(&fast_policy(4), "op", || {
            calls += 1;
            async { Ok::<_, Error>(42) }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn test_retry_success_after_failure() {
        let call_count = Arc::new(AtomicU32::new(0));
        let counter = call_count.clone();

        let result = retry_with_backoff(&fast_policy(4), "op", || {
            let cc = counter.clone();
            async move {
                let count = cc.fetch_add(1, Ordering::SeqCst);
                if count < 2 {
                    Err(Error::Network("timeout".into()))
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(call_count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_exhausted_carries_last_error() {
        let mut calls = 0;

        let result: Result<()> = retry_with_backoff(&fast_policy(4), "op", || {
            calls += 1;
            let n = calls;
            async move { Err(Error::Network(format!("failure {n}"))) }
        })
        .await;

        assert_eq!(calls, 4);
        match result.unwrap_err() {
            Error::RetriesExhausted { attempts, source } => {
                assert_eq!(attempts, 4);
                assert_eq!(source.to_string(), "Network error: failure 4");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_retry_non_retryable() {
        let mut calls = 0;

        let result: Result<()> = retry_with_backoff(&fast_policy(4), "op", || {
            calls += 1;
            async { Err(Error::NotFound("not found".into())) }
        })
        .await;

        assert!(matches!(result, Err(Error::NotFound(_))));
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn test_single_attempt_returns_raw_error() {
        let mut calls = 0;

        let result: Result<()> = retry_with_backoff(&RetryPolicy::none(), "op", || {
            calls += 1;
            async { Err(Error::Network("reset".into())) }
        })
        .await;

        assert!(matches!(result, Err(Error::Network(_))));
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_backoff_jitter_stays_below_double() {
        let policy = RetryPolicy::new().initial_backoff_ms(50).max_backoff_ms(50);
        for attempt in 1..20 {
            let ms = policy.backoff(attempt).as_millis();
            assert!((50..100).contains(&ms), "attempt {attempt}: {ms}ms");
        }

        let zero = RetryPolicy::new().initial_backoff_ms(0).max_backoff_ms(0);
        assert_eq!(zero.backoff(1), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_retry_on_any_retries_fatal_errors() {
        let mut calls = 0;
        let policy = fast_policy(3).retry_on(RetryOn::Any);

        let result: Result<()> = retry_with_backoff(&policy, "op", || {
            calls += 1;
            async { Err(Error::Request("bad".into())) }
        })
        .await;

        assert!(matches!(result, Err(Error::RetriesExhausted { attempts: 3, .. })));
        assert_eq!(calls, 3);
    }
}
