//! Caller-side retry policy for storage operations.
//!
//! The gateway never retries. Callers that want resilience wrap an operation in
//! `with_retry()`, which adds:
//! - Exponential backoff with jitter
//! - A bounded number of attempts
//! - Retries only for errors reporting `is_retryable()` (network failures, 429, 5xx)

use std::future::Future;
use std::time::Duration;

use tracing::debug;

use crate::providers::StorageError;

/// How hard a caller tries before surfacing a storage error
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Extra attempts after the first one
    pub max_retries: u32,
    /// Wait before the first retry, in milliseconds
    pub base_delay_ms: u64,
    /// Upper bound for any single wait, before jitter
    pub max_delay_ms: u64,
    /// Growth factor applied to the wait after each failed attempt
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    /// Three retries starting at one second, doubling up to thirty
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Single attempt, errors surface immediately
    pub fn none() -> Self {
        Self { max_retries: 0, ..Self::default() }
    }

    /// Same backoff with a different retry budget (the CLI's `--retries`)
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }
}

/// Wait before retry number `attempt + 1`: capped exponential growth plus 10-30% jitter
pub fn calculate_delay(attempt: u32, policy: &RetryPolicy) -> Duration {
    let wait = policy.base_delay_ms as f64 * policy.backoff_multiplier.powi(attempt as i32);
    let wait = wait.min(policy.max_delay_ms as f64);
    let extra = wait * (0.1 + rand::random::<f64>() * 0.2);
    Duration::from_millis((wait + extra) as u64)
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// retry budget is spent. The last error is returned.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T, StorageError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StorageError>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < policy.max_retries => {
                let delay = calculate_delay(attempt, policy);
                debug!(
                    "Storage operation failed: {}. Retry {}/{} after {:?}",
                    e, attempt + 1, policy.max_retries, delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
