//! Bounded retries with exponential backoff.
//!
//! Failures are classified by the caller instead of being matched inside the loop, so the same
//! helper serves any remote call whose retryable failures can be recognized from its error.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

/// Attempt count and backoff schedule for [`retry_with_backoff`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one.
    pub max_attempts: u32,
    /// Sleep before the second attempt.
    pub initial_backoff: Duration,
    /// Factor applied to the backoff after every failed attempt.
    pub multiplier: u32,
}

impl RetryPolicy {
    /// Returns the sleep that follows the failed attempt with the given zero-based index.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.saturating_pow(attempt);
        self.initial_backoff.saturating_mul(factor)
    }
}

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry,
    Fail,
}

/// Why [`retry_with_backoff`] gave up.
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// The classifier marked the failure as not retryable.
    #[error("attempt {attempt} failed with a non-retryable error: {error}")]
    Fatal { attempt: u32, error: E },
    /// Every attempt failed with a retryable error.
    #[error("all {attempts} attempts failed, last error: {error}")]
    Exhausted { attempts: u32, error: E },
}

impl<E> RetryError<E> {
    /// Returns the error of the last attempt.
    pub fn into_inner(self) -> E {
        match self {
            RetryError::Fatal { error, .. } | RetryError::Exhausted { error, .. } => error,
        }
    }

    /// Returns the error of the last attempt by reference.
    pub fn last_error(&self) -> &E {
        match self {
            RetryError::Fatal { error, .. } | RetryError::Exhausted { error, .. } => error,
        }
    }
}

/// Runs `operation` until it succeeds, fails fatally, or the attempts of `policy` are used up.
///
/// `operation` receives the zero-based attempt index. After a retryable failure the helper sleeps
/// for [`RetryPolicy::backoff`] of that attempt; there is no sleep after the final attempt. A
/// policy with zero attempts still runs the operation once.
pub async fn retry_with_backoff<T, E, F, Fut, C>(
    policy: &RetryPolicy,
    mut classify: C,
    mut operation: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    C: FnMut(&E) -> RetryDecision,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        let error = match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };

        if classify(&error) == RetryDecision::Fail {
            return Err(RetryError::Fatal {
                attempt: attempt + 1,
                error,
            });
        }

        if attempt + 1 >= max_attempts {
            return Err(RetryError::Exhausted {
                attempts: max_attempts,
                error,
            });
        }

        let backoff = policy.backoff(attempt);
        warn!(
            attempt = attempt + 1,
            max_attempts,
            backoff_ms = backoff.as_millis() as u64,
            "retryable failure, backing off"
        );
        tokio::time::sleep(backoff).await;

        attempt += 1;
    }
}
