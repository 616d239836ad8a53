//! Bounded retry with increasing backoff for ledger and blob-store calls.
//!
//! Only transient [`StoreError`]s are retried. Cryptographic work never goes
//! through here: decrypting or verifying the same input twice cannot change
//! the outcome.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::store::StoreError;

/// Growth of the wait between attempts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backoff {
    /// base · attempt
    #[default]
    Linear,
    /// base · 2^(attempt-1)
    Exponential,
}

/// Retry policy injected into the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Must be at least 1.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff: Backoff::Linear,
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no waiting.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff: Backoff::Linear,
        }
    }

    /// Retries without sleeping; for tests and in-process stores.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff: Backoff::Linear,
        }
    }

    /// Wait after the failed attempt number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = match self.backoff {
            Backoff::Linear => attempt.max(1),
            Backoff::Exponential => 1u32
                .checked_shl(attempt.saturating_sub(1))
                .unwrap_or(u32::MAX),
        };
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out.
    ///
    /// After exhaustion the last error is returned unchanged.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut op: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_transient() => {
                    debug!(operation, attempt, error = %e, "permanent failure, not retrying");
                    return Err(e);
                }
                Err(e) if attempt >= max_attempts => {
                    warn!(operation, attempts = attempt, error = %e, "giving up after retries");
                    return Err(e);
                }
                Err(e) => {
                    let wait = self.delay_for(attempt);
                    warn!(
                        operation,
                        attempt,
                        wait_ms = wait.as_millis() as u64,
                        error = %e,
                        "transient failure, retrying"
                    );
                    if !wait.is_zero() {
                        tokio::time::sleep(wait).await;
                    }
                    attempt += 1;
                }
            }
        }
    }
}
