//! Exponential backoff for transient model service failures.

use std::future::Future;
use std::time::Duration;

use crate::error::Result;

/// Default number of retries after the first attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 2;

/// Default delay before the first retry; doubles on each further retry.
pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_millis(200);

/// How many times to retry and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, initial_backoff: Duration) -> Self {
        Self {
            max_retries,
            initial_backoff,
        }
    }

    /// A policy that never retries.
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// Delay before retry number `retry` (zero based).
    pub fn backoff_for(&self, retry: u32) -> Duration {
        self.initial_backoff
            .saturating_mul(2u32.saturating_pow(retry))
    }
}

/// Execute an async operation with exponential backoff retry.
///
/// Retries only transient errors. Non-retryable errors are returned
/// immediately; after the budget is spent the last error is returned.
pub async fn with_retry<F, Fut, T>(policy: RetryPolicy, backend_name: &str, mut f: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut retry = 0;

    loop {
        let error = match f().await {
            Ok(result) => return Ok(result),
            Err(e) => e,
        };

        if !error.is_transient() {
            return Err(error);
        }

        if retry >= policy.max_retries {
            tracing::warn!(
                backend = backend_name,
                attempts = retry + 1,
                class = ?error.class(),
                error = %error,
                "Request failed, retries exhausted"
            );
            return Err(error);
        }

        let backoff = policy.backoff_for(retry);
        tracing::warn!(
            backend = backend_name,
            attempt = retry + 1,
            max_retries = policy.max_retries,
            backoff_ms = backoff.as_millis() as u64,
            error = %error,
            "Request failed, retrying"
        );
        tokio::time::sleep(backoff).await;
        retry += 1;
    }
}
