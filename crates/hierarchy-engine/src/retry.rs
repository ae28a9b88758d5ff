//! Conflict retries with exponential backoff.
//!
//! Writes guarded by a uniqueness constraint fail with
//! [`HierarchyError::Conflict`] when a concurrent writer got there first.
//! Those failures are safe to retry: the next attempt re-reads the winner's
//! state and proceeds from there.
//!
//! # Example
//!
//! ```rust,no_run
//! use hierarchy_engine::retry::{retry_on_conflict, RetryPolicy};
//! use hierarchy_engine::HierarchyResult;
//!
//! async fn example() -> HierarchyResult<u32> {
//!     retry_on_conflict(&RetryPolicy::fast(), "example", || async {
//!         // An operation that may lose a uniqueness race
//!         Ok(7)
//!     })
//!     .await
//! }
//! ```

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

use crate::error::HierarchyResult;

/// Retry behavior for conflict-prone operations.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first
    pub max_attempts: u32,

    /// Delay before the first retry
    pub initial_delay: Duration,

    /// Upper bound on any single delay
    pub max_delay: Duration,

    /// Backoff multiplier between attempts
    pub exponential_base: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            exponential_base: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Short delays, for in-process contention.
    pub fn fast() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(200),
            exponential_base: 2.0,
        }
    }

    /// Balanced delays.
    pub fn standard() -> Self {
        Self::default()
    }

    /// A single attempt.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            exponential_base: 1.0,
        }
    }

    /// Delay after `delay`, capped at `max_delay`.
    fn next_delay(&self, delay: Duration) -> Duration {
        Duration::from_secs_f64(
            (delay.as_secs_f64() * self.exponential_base).min(self.max_delay.as_secs_f64()),
        )
    }
}

/// Run `f` until it succeeds, fails with a non-retryable error, or the
/// policy's attempts run out.
///
/// `operation` names the call in log events.
pub async fn retry_on_conflict<F, Fut, T>(
    policy: &RetryPolicy,
    operation: &'static str,
    mut f: F,
) -> HierarchyResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = HierarchyResult<T>>,
{
    let mut attempt = 0;
    let mut delay = policy.initial_delay;

    loop {
        attempt += 1;

        match f().await {
            Ok(result) => {
                if attempt > 1 {
                    tracing::info!(operation, attempts = attempt, "Operation succeeded after conflict retry");
                }
                return Ok(result);
            }
            Err(e) if !e.is_retryable() => {
                tracing::debug!(operation, error = %e, "Error is not retryable, returning immediately");
                return Err(e);
            }
            Err(e) if attempt >= policy.max_attempts => {
                tracing::error!(operation, attempts = attempt, error = %e, "All conflict retries exhausted");
                return Err(e);
            }
            Err(e) => {
                tracing::warn!(
                    operation,
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Write lost a race, retrying"
                );

                sleep(delay).await;
                delay = policy.next_delay(delay);
            }
        }
    }
}
