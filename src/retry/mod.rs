//! Bounded retry with exponential backoff
//!
//! Generic combinator hardening any fallible async operation against
//! transient failures. Orthogonal to admission control: the orchestrator
//! prevents *causing* a provider rate limit, the retrier handles one
//! happening anyway.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// Retry configuration value. Stateless; a fresh execution is built per
/// call.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub base_delay: Duration,
    /// Double the delay after each failed attempt
    pub exponential_backoff: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            exponential_backoff: true,
        }
    }
}

/// Terminal outcome of a retried operation
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// Every attempt failed with a retryable error
    #[error("Operation failed after {attempts} attempts: {source}")]
    Exhausted { attempts: u32, source: E },

    /// A non-retryable error propagated immediately without consuming the
    /// retry budget
    #[error("Operation failed with a non-retryable error: {0}")]
    Fatal(E),
}

impl<E> RetryError<E> {
    /// The underlying failure
    pub fn into_source(self) -> E {
        match self {
            RetryError::Exhausted { source, .. } => source,
            RetryError::Fatal(source) => source,
        }
    }
}

/// Executes operations under a [`RetryPolicy`].
pub struct Retrier {
    policy: RetryPolicy,
}

impl Retrier {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// Attempt `op` up to `max_attempts` times, sleeping between attempts
    /// with optional doubling backoff. Errors rejected by `is_retryable`
    /// propagate immediately as [`RetryError::Fatal`].
    pub async fn run<T, E, F, Fut, R>(&self, mut op: F, is_retryable: R) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        R: Fn(&E) -> bool,
        E: Display,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut delay = self.policy.base_delay;
        let mut attempt = 0;

        loop {
            attempt += 1;
            tracing::trace!(attempt, max_attempts, "Attempting operation");
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if !is_retryable(&e) => {
                    tracing::warn!(attempt, error = %e, "Non-retryable error, giving up");
                    return Err(RetryError::Fatal(e));
                }
                Err(e) => {
                    metrics::counter!("pacer_retry_attempts_total").increment(1);
                    tracing::warn!(
                        attempt,
                        max_attempts,
                        error = %e,
                        "Retryable failure"
                    );
                    if attempt >= max_attempts {
                        tracing::error!(attempts = attempt, "Retry budget exhausted");
                        return Err(RetryError::Exhausted {
                            attempts: attempt,
                            source: e,
                        });
                    }
                    tokio::time::sleep(delay).await;
                    if self.policy.exponential_backoff {
                        delay *= 2;
                    }
                }
            }
        }
    }

    /// Like [`Retrier::run`], but on exhaustion invoke `fallback` and return
    /// its result. A fallback failure is swallowed (logged) and the original
    /// exhaustion error returned.
    pub async fn run_with_fallback<T, E, F, Fut, R, FB, FbFut>(
        &self,
        op: F,
        is_retryable: R,
        fallback: FB,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        R: Fn(&E) -> bool,
        FB: FnOnce() -> FbFut,
        FbFut: Future<Output = Result<T, E>>,
        E: Display,
    {
        match self.run(op, is_retryable).await {
            Ok(value) => Ok(value),
            Err(RetryError::Exhausted { attempts, source }) => {
                tracing::debug!(attempts, "Executing fallback after exhaustion");
                match fallback().await {
                    Ok(value) => Ok(value),
                    Err(fallback_err) => {
                        tracing::warn!(error = %fallback_err, "Fallback failed");
                        Err(RetryError::Exhausted { attempts, source })
                    }
                }
            }
            Err(fatal) => Err(fatal),
        }
    }
}
