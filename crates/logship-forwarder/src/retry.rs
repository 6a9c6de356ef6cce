//! Retry Logic with Exponential Backoff
//!
//! Transient ingest failures are retried inside the sink client, so a batch
//! only reaches the forwarder's drop path once the policy gives up.
//!
//! ```text
//! Attempt 1: immediate
//! Attempt 2: wait 2s
//! Attempt 3: wait 4s
//! ...
//! Attempt 7: wait 64s (capped)
//! ```
//!
//! **Retryable**: transport errors, HTTP 5xx, 408 (timeout), 404 (ingest
//! endpoint briefly unavailable behind a load balancer).
//!
//! **Non-retryable**: 401/403 (bad token), every other 4xx, serialization
//! failures.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::{SinkError, SinkResult};

/// Retry policy configuration for exponential backoff.
///
/// ```text
/// backoff = min(initial_backoff * multiplier^attempt, max_backoff)
/// ```
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts after the first
    pub max_retries: usize,

    pub initial_backoff: Duration,

    pub max_backoff: Duration,

    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 6,
            initial_backoff: Duration::from_secs(2),
            max_backoff: Duration::from_secs(64),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    pub fn new(
        max_retries: usize,
        initial_backoff: Duration,
        max_backoff: Duration,
        backoff_multiplier: f64,
    ) -> Self {
        Self {
            max_retries,
            initial_backoff,
            max_backoff,
            backoff_multiplier,
        }
    }

    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Backoff before retry number `attempt + 1`.
    pub fn backoff(&self, attempt: usize) -> Duration {
        let backoff_ms =
            self.initial_backoff.as_millis() as f64 * self.backoff_multiplier.powi(attempt as i32);
        let backoff = Duration::from_millis(backoff_ms as u64);
        backoff.min(self.max_backoff)
    }

    pub fn is_retryable(&self, error: &SinkError) -> bool {
        match error {
            SinkError::Transport(_) => true,
            SinkError::Rejected { status, .. } => {
                *status >= 500 || *status == 408 || *status == 404
            }
            SinkError::Unauthorized { .. } => false,
            SinkError::Serialization(_) => false,
        }
    }
}

/// Run `operation` until it succeeds, fails permanently, or the policy's
/// retries are exhausted. The last error is returned on give-up.
pub async fn retry_with_backoff<F, Fut, T>(policy: &RetryPolicy, mut operation: F) -> SinkResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = SinkResult<T>>,
{
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    debug!(attempt = attempt + 1, "Push succeeded after retry");
                }
                return Ok(result);
            }
            Err(error) => {
                if !policy.is_retryable(&error) {
                    return Err(error);
                }

                if attempt >= policy.max_retries {
                    warn!(
                        attempt = attempt + 1,
                        max_retries = policy.max_retries,
                        error = %error,
                        "Max retries exhausted, giving up"
                    );
                    return Err(error);
                }

                let backoff = policy.backoff(attempt);
                warn!(
                    attempt = attempt + 1,
                    max_retries = policy.max_retries,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %error,
                    "Retryable error, backing off"
                );

                sleep(backoff).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn rejected(status: u16) -> SinkError {
        SinkError::Rejected {
            status,
            body: String::new(),
        }
    }

    // ----------------------------------------------------------------
    // Policy
    // ----------------------------------------------------------------

    #[test]
    fn test_retry_policy_default() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 6);
        assert_eq!(policy.initial_backoff, Duration::from_secs(2));
        assert_eq!(policy.max_backoff, Duration::from_secs(64));
        assert_eq!(policy.backoff_multiplier, 2.0);
    }

    #[test]
    fn test_backoff_growth_and_cap() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(0), Duration::from_secs(2));
        assert_eq!(policy.backoff(1), Duration::from_secs(4));
        assert_eq!(policy.backoff(4), Duration::from_secs(32));
        assert_eq!(policy.backoff(5), Duration::from_secs(64));
        assert_eq!(policy.backoff(9), Duration::from_secs(64));
    }

    #[test]
    fn test_retryable_classification() {
        let policy = RetryPolicy::default();
        assert!(policy.is_retryable(&SinkError::Transport("reset".to_string())));
        assert!(policy.is_retryable(&rejected(500)));
        assert!(policy.is_retryable(&rejected(503)));
        assert!(policy.is_retryable(&rejected(408)));
        assert!(policy.is_retryable(&rejected(404)));

        assert!(!policy.is_retryable(&rejected(400)));
        assert!(!policy.is_retryable(&rejected(413)));
        assert!(!policy.is_retryable(&SinkError::Unauthorized { status: 401 }));
        assert!(!policy.is_retryable(&SinkError::Serialization("x".to_string())));
    }

    // ----------------------------------------------------------------
    // retry_with_backoff
    // ----------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn test_retry_until_success() {
        let calls = Arc::new(AtomicUsize::new(0));
        let policy = RetryPolicy::default();

        let counter = calls.clone();
        let result = retry_with_backoff(&policy, || {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(rejected(503))
                } else {
                    Ok("ok")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_retry_on_unauthorized() {
        let calls = Arc::new(AtomicUsize::new(0));
        let policy = RetryPolicy::default();

        let counter = calls.clone();
        let result: SinkResult<()> = retry_with_backoff(&policy, || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(SinkError::Unauthorized { status: 401 })
            }
        })
        .await;

        assert!(result.unwrap_err().is_auth_failure());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_retries() {
        let calls = Arc::new(AtomicUsize::new(0));
        let policy = RetryPolicy::new(
            3,
            Duration::from_millis(10),
            Duration::from_millis(100),
            2.0,
        );

        let counter = calls.clone();
        let result: SinkResult<()> = retry_with_backoff(&policy, || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(SinkError::Transport("connection refused".to_string()))
            }
        })
        .await;

        assert!(matches!(result, Err(SinkError::Transport(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_none_policy_single_attempt() {
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = calls.clone();
        let result: SinkResult<()> = retry_with_backoff(&RetryPolicy::none(), || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(rejected(500))
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
