//! Exponential backoff for operations that fail transiently.
//!
//! Two call sites use it:
//!
//! - the broker connection manager, which waits `delay_for_attempt(i)` before
//!   every connection attempt `i` (1s, 2s, 4s, 8s, 16s with the broker policy)
//! - the stock validation client, which retries transient HTTP failures
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use stockflow_runtime::retry::{RetryPolicy, retry_with_predicate};
//!
//! # async fn example() -> Result<(), std::io::Error> {
//! let policy = RetryPolicy::builder()
//!     .max_retries(2)
//!     .initial_delay(Duration::from_millis(200))
//!     .build();
//!
//! let available = retry_with_predicate(
//!     policy,
//!     || async { Ok::<bool, std::io::Error>(true) },
//!     |error: &std::io::Error| error.kind() == std::io::ErrorKind::TimedOut,
//! )
//! .await?;
//! assert!(available);
//! # Ok(())
//! # }
//! ```

use std::time::Duration;
use tokio::time::sleep;

/// How many times to retry and how long to wait in between.
///
/// Defaults: 3 retries, 100ms first delay doubling per retry, capped at 30s.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts after the first one
    pub max_retries: usize,
    /// Delay for attempt 0
    pub initial_delay: Duration,
    /// Upper bound on any single delay
    pub max_delay: Duration,
    /// Growth factor per attempt
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl RetryPolicy {
    /// Builder starting from the defaults.
    #[must_use]
    pub const fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder {
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }

    /// Total number of attempts the policy allows (first try included).
    #[must_use]
    pub const fn max_attempts(&self) -> usize {
        self.max_retries + 1
    }

    /// Wait before retry `attempt` (0-based):
    /// `initial_delay * multiplier^attempt`, capped at `max_delay`.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_possible_wrap,
        clippy::cast_precision_loss,
        clippy::cast_sign_loss
    )]
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        let exponent = attempt.min(i32::MAX as usize) as i32;
        let delay_ms = self.initial_delay.as_millis() as f64 * self.multiplier.powi(exponent);

        if !delay_ms.is_finite() || delay_ms >= self.max_delay.as_millis() as f64 {
            return self.max_delay;
        }

        Duration::from_millis(delay_ms as u64)
    }
}

/// Const builder for [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct RetryPolicyBuilder {
    max_retries: usize,
    initial_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
}

impl RetryPolicyBuilder {
    /// Retries after the first attempt.
    #[must_use]
    pub const fn max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the delay for attempt 0.
    #[must_use]
    pub const fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Cap on any single delay.
    #[must_use]
    pub const fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Growth factor per attempt.
    #[must_use]
    pub const fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Finish the policy.
    #[must_use]
    pub const fn build(self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            initial_delay: self.initial_delay,
            max_delay: self.max_delay,
            multiplier: self.multiplier,
        }
    }
}

/// [`retry_with_predicate`] treating every error as retryable.
///
/// # Errors
///
/// Returns the last error once `policy.max_retries` retries are exhausted.
pub async fn retry_with_backoff<F, Fut, T, E>(policy: RetryPolicy, operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    retry_with_predicate(policy, operation, |_| true).await
}

/// Retry an async operation, but only for errors `is_retryable` accepts.
///
/// The first attempt runs immediately; retry `n` (0-based) waits
/// `policy.delay_for_attempt(n)` first.
///
/// # Errors
///
/// Returns a non-retryable error immediately, or the last error once
/// `policy.max_retries` retries are exhausted.
pub async fn retry_with_predicate<F, Fut, T, E, P>(
    policy: RetryPolicy,
    mut operation: F,
    is_retryable: P,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let mut retry = 0;

    loop {
        match operation().await {
            Ok(result) => {
                if retry > 0 {
                    tracing::info!(retries = retry, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(err) if !is_retryable(&err) => {
                tracing::debug!(error = %err, "Error is not retryable, failing immediately");
                return Err(err);
            }
            Err(err) if retry >= policy.max_retries => {
                tracing::warn!(retries = retry, error = %err, "Operation failed after max retries");
                return Err(err);
            }
            Err(err) => {
                let delay = policy.delay_for_attempt(retry);
                tracing::warn!(
                    retry = retry + 1,
                    delay_ms = delay.as_millis(),
                    error = %err,
                    "Operation failed, retrying"
                );
                sleep(delay).await;
                retry += 1;
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn broker_schedule_doubles_from_one_second() {
        let policy = RetryPolicy::builder()
            .max_retries(4)
            .initial_delay(Duration::from_secs(1))
            .max_delay(Duration::from_secs(16))
            .build();

        let delays: Vec<u64> = (0..policy.max_attempts())
            .map(|attempt| policy.delay_for_attempt(attempt).as_secs())
            .collect();

        assert_eq!(delays, vec![1, 2, 4, 8, 16]);
    }

    #[test]
    fn huge_attempt_numbers_saturate_at_the_cap() {
        let policy = RetryPolicy::builder()
            .initial_delay(Duration::from_millis(200))
            .max_delay(Duration::from_millis(1600))
            .build();

        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(1600));
        assert_eq!(policy.delay_for_attempt(usize::MAX), Duration::from_millis(1600));
    }

    proptest! {
        #[test]
        fn delay_never_exceeds_cap(attempt in 0usize..200, cap_ms in 1u64..60_000) {
            let policy = RetryPolicy::builder()
                .initial_delay(Duration::from_millis(50))
                .max_delay(Duration::from_millis(cap_ms))
                .build();
            prop_assert!(policy.delay_for_attempt(attempt) <= Duration::from_millis(cap_ms));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failures() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&attempts);

        let available = retry_with_backoff(RetryPolicy::default(), || {
            let seen = Arc::clone(&seen);
            async move {
                match seen.fetch_add(1, Ordering::SeqCst) {
                    0 | 1 => Err("503 Service Unavailable"),
                    _ => Ok(true),
                }
            }
        })
        .await;

        assert_eq!(available, Ok(true));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_retries() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&attempts);
        let policy = RetryPolicy::builder().max_retries(2).build();

        let outcome = retry_with_backoff(policy, || {
            let seen = Arc::clone(&seen);
            async move {
                seen.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>("connection refused")
            }
        })
        .await;

        assert_eq!(outcome, Err("connection refused"));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_errors_fail_fast() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&attempts);

        let outcome = retry_with_predicate(
            RetryPolicy::default(),
            || {
                let seen = Arc::clone(&seen);
                async move {
                    seen.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>("404 Not Found")
                }
            },
            |status: &&str| status.starts_with('5'),
        )
        .await;

        assert_eq!(outcome, Err("404 Not Found"));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
