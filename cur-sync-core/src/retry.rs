//! Linear backoff for throttled backend calls.
//!
//! Only [`BackendError::Throttled`] is retried. Every other error is returned on the
//! first occurrence. Delays are non-blocking (`tokio::time::sleep`).

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::warn;

use crate::error::{BackendError, SyncError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    /// Base delay; attempt `n` waits `n * delay`.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            delay: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// Backoff after the given (1-based) failed attempt.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.delay.saturating_mul(attempt)
    }

    /// Run `operation` until it succeeds, fails permanently, or the attempt budget is
    /// spent. Exhaustion is reported as [`SyncError::TransientBackend`].
    pub async fn run<F, Fut, T>(&self, operation_name: &str, mut operation: F) -> Result<T, SyncError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, BackendError>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_throttled() && attempt < self.max_attempts => {
                    let backoff = self.backoff(attempt);
                    warn!(
                        operation = operation_name,
                        attempt,
                        error = %e,
                        backoff_ms = backoff.as_millis() as u64,
                        "Backend throttled, backing off"
                    );
                    sleep(backoff).await;
                }
                Err(e) => return Err(SyncError::backend(operation_name, attempt, e)),
            }
        }
    }
}
