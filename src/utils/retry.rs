//! Retry utilities for resilient operations
//!
//! Bounded exponential backoff around a fallible async operation. The sleep
//! between attempts starts at [`RetryPolicy::initial_wait`], grows by
//! [`RetryPolicy::multiplier`] after every failure and never exceeds
//! [`RetryPolicy::max_wait`]. A cancellation token aborts the sleep.
//!
//! This layer does not decide which errors are worth retrying; callers that
//! need that use [`with_retry_if`].

use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Configuration for retry behavior
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first (values below 1 act as 1)
    pub max_attempts: u32,

    /// Delay before the second attempt
    pub initial_wait: Duration,

    /// Upper bound on any single delay
    pub max_wait: Duration,

    /// Growth factor applied to the delay after each failure
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_wait: Duration::from_secs(2),
            max_wait: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Create a policy with custom max attempts and default delays
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Default::default()
        }
    }

    /// Create a policy with custom delays
    pub fn with_delays(max_attempts: u32, initial_wait: Duration, max_wait: Duration) -> Self {
        Self {
            max_attempts,
            initial_wait,
            max_wait,
            multiplier: 2.0,
        }
    }

    /// A policy that calls the operation exactly once
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_wait: Duration::ZERO,
            max_wait: Duration::ZERO,
            multiplier: 1.0,
        }
    }

    fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Delay to sleep after the `failures`-th failed attempt (1-based)
    pub fn delay_after(&self, failures: u32) -> Duration {
        if failures == 0 {
            return Duration::ZERO;
        }
        let max = self.max_wait.as_secs_f64();
        let exponent = i32::try_from(failures - 1).unwrap_or(i32::MAX);
        let scaled = self.initial_wait.as_secs_f64() * self.multiplier.powi(exponent);
        let secs = if scaled.is_finite() && scaled >= 0.0 {
            scaled.min(max)
        } else {
            max
        };
        Duration::from_secs_f64(secs)
    }
}

/// Execute an operation with retry logic and exponential backoff
///
/// Returns the first success. After the last failed attempt the error is
/// wrapped in [`Error::RetryExhausted`]. If `cancel` fires during a backoff
/// sleep, or the operation itself reports [`Error::Cancelled`], the
/// cancellation is returned immediately.
///
/// # Example
///
/// ```no_run
/// use scrapeflow::utils::retry::{with_retry, RetryPolicy};
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() -> scrapeflow::error::Result<()> {
/// let cancel = CancellationToken::new();
/// let value = with_retry(&RetryPolicy::default(), &cancel, || async {
///     Ok::<_, scrapeflow::error::Error>(42)
/// })
/// .await?;
/// assert_eq!(value, 42);
/// # Ok(())
/// # }
/// ```
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    with_retry_if(policy, cancel, operation, |_| true).await
}

/// Execute an operation with retry logic, using a custom retry predicate
///
/// Errors for which `should_retry` returns `false` are returned unwrapped
/// without further attempts.
pub async fn with_retry_if<T, F, Fut, P>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut operation: F,
    should_retry: P,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    P: Fn(&Error) -> bool,
{
    let max_attempts = policy.attempts();
    let mut attempt = 1;

    loop {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let err = match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(attempt, "Operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) => e,
        };

        if err.is_cancelled() {
            return Err(Error::Cancelled);
        }

        if !should_retry(&err) {
            warn!(error = %err, "Non-retryable error encountered");
            return Err(err);
        }

        if attempt >= max_attempts {
            warn!(attempts = attempt, error = %err, "Retry attempts exhausted");
            return Err(Error::RetryExhausted {
                attempts: attempt,
                source: Box::new(err),
            });
        }

        let delay = policy.delay_after(attempt);
        warn!(
            attempt,
            max_attempts,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "Operation failed, will retry"
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(attempt, "Retry sleep interrupted by cancellation");
                return Err(Error::Cancelled);
            }
            _ = tokio::time::sleep(delay) => {}
        }

        attempt += 1;
    }
}
