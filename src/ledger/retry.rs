// Retry with exponential backoff for transient ledger errors
//
// Permanent rejections pass through untouched; only Transient errors are
// retried, and only up to the configured attempt cap.

use super::LedgerError;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Backoff policy for transient ledger errors
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Delay before the first retry
    pub base_delay_ms: u64,
    /// Cap on the doubled delay
    pub max_delay_ms: u64,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            max_attempts,
            base_delay_ms,
            max_delay_ms,
        }
    }

    /// A policy that never retries (single attempt)
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay_ms: 0,
            max_delay_ms: 0,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay_ms: 200,
            max_delay_ms: 3_000,
        }
    }
}

/// Run an async ledger operation, retrying transient failures with backoff
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T, LedgerError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LedgerError>>,
{
    let mut delay = Duration::from_millis(policy.base_delay_ms);
    let mut attempt = 1u32;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < policy.max_attempts => {
                warn!(attempt, error = %err, "transient ledger error, retrying");
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                delay = (delay * 2).min(Duration::from_millis(policy.max_delay_ms));
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
