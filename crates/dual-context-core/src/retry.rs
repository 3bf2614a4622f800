//! Bounded exponential backoff around fallible async calls.
//!
//! The delay before retry `n` (0-based) is `min(base_delay * 2^n, max_delay)`.
//! Errors are classified through [`Retryable`]: non-retryable errors return on
//! first occurrence, and cancellation observed before an attempt or during a
//! backoff sleep surfaces as [`RetryError::Cancelled`].

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Classification hook consulted after every failed attempt.
pub trait Retryable {
    fn is_retryable(&self) -> bool;

    /// Cancellation is never retried and is reported as [`RetryError::Cancelled`].
    fn is_cancellation(&self) -> bool {
        false
    }

    /// Server-requested wait. Raises the next delay, still capped by `max_delay`.
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

/// Backoff parameters. Immutable once built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the first call (0 = run once).
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Sleep duration before retry `retry` (0-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Terminal failure of [`execute_with_retry`].
#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    #[error("operation cancelled")]
    Cancelled,

    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: E },

    #[error(transparent)]
    Permanent(E),
}

/// Run `op` until it succeeds, fails permanently, exhausts the policy or is
/// cancelled. `op` receives the 0-based attempt number.
pub async fn execute_with_retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut op: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + std::fmt::Display,
{
    let mut attempt: u32 = 0;
    loop {
        if cancel.is_cancelled() {
            return Err(RetryError::Cancelled);
        }

        let err = match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if err.is_cancellation() {
            return Err(RetryError::Cancelled);
        }
        if !err.is_retryable() {
            return Err(RetryError::Permanent(err));
        }
        if attempt >= policy.max_retries {
            return Err(RetryError::Exhausted {
                attempts: attempt + 1,
                last: err,
            });
        }

        let mut delay = policy.delay_for(attempt);
        if let Some(hint) = err.retry_after() {
            delay = delay.max(hint.min(policy.max_delay));
        }
        debug!(
            event = "retry.scheduled",
            attempt = attempt + 1,
            delay_ms = delay.as_millis() as u64,
            error = %err,
        );

        tokio::select! {
            _ = cancel.cancelled() => return Err(RetryError::Cancelled),
            _ = tokio::time::sleep(delay) => {}
        }
        attempt += 1;
    }
}
