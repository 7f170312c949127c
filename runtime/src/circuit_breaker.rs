//! Circuit breaker for calls to a dependency that may be down.
//!
//! # States
//!
//! - **Closed**: calls pass through; consecutive failures are counted
//! - **Open**: calls are rejected without running until `open_duration` elapses
//! - **HalfOpen**: trial calls run; `success_threshold` successes close the
//!   circuit, one failure opens it again
//!
//! # Example
//!
//! ```rust
//! use stockflow_runtime::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
//! use std::time::Duration;
//!
//! # async fn example() {
//! let breaker = CircuitBreaker::new(
//!     "stock-service",
//!     CircuitBreakerConfig::builder()
//!         .failure_threshold(5)
//!         .open_duration(Duration::from_secs(30))
//!         .build(),
//! );
//!
//! let result = breaker.call(|| async { Ok::<_, String>(42) }).await;
//! assert!(result.is_ok());
//! # }
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

/// Circuit breaker configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit
    pub failure_threshold: usize,
    /// How long the circuit stays open before a trial call is allowed
    pub open_duration: Duration,
    /// Successful trial calls needed to close the circuit again
    pub success_threshold: usize,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl CircuitBreakerConfig {
    /// Create a new configuration builder.
    #[must_use]
    pub const fn builder() -> CircuitBreakerConfigBuilder {
        CircuitBreakerConfigBuilder {
            failure_threshold: 5,
            open_duration: Duration::from_secs(30),
            success_threshold: 1,
        }
    }
}

/// Builder for [`CircuitBreakerConfig`].
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfigBuilder {
    failure_threshold: usize,
    open_duration: Duration,
    success_threshold: usize,
}

impl CircuitBreakerConfigBuilder {
    /// Circuit opens after this many consecutive failures.
    #[must_use]
    pub const fn failure_threshold(mut self, threshold: usize) -> Self {
        self.failure_threshold = threshold;
        self
    }

    /// How long to stay open before letting a trial call through.
    #[must_use]
    pub const fn open_duration(mut self, duration: Duration) -> Self {
        self.open_duration = duration;
        self
    }

    /// Successful trial calls needed in `HalfOpen` to close the circuit.
    #[must_use]
    pub const fn success_threshold(mut self, threshold: usize) -> Self {
        self.success_threshold = threshold;
        self
    }

    /// Build the configuration. Zero thresholds are raised to one.
    #[must_use]
    pub const fn build(self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: if self.failure_threshold == 0 { 1 } else { self.failure_threshold },
            open_duration: self.open_duration,
            success_threshold: if self.success_threshold == 0 { 1 } else { self.success_threshold },
        }
    }
}

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Calls pass through
    Closed,
    /// Calls are rejected
    Open,
    /// Trial calls pass through
    HalfOpen,
}

/// Errors from circuit breaker operations.
#[derive(Error, Debug)]
pub enum CircuitBreakerError<E> {
    /// Circuit is open, the operation was not run
    #[error("Circuit breaker is open")]
    Open,
    /// The operation ran and failed
    #[error("Operation failed: {0}")]
    Inner(E),
}

#[derive(Debug)]
struct Inner {
    state: State,
    consecutive_failures: usize,
    half_open_successes: usize,
    opened_at: Option<Instant>,
}

/// Circuit breaker shared between clones.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    name: Arc<str>,
    config: Arc<CircuitBreakerConfig>,
    inner: Arc<Mutex<Inner>>,
    rejections: Arc<AtomicU64>,
}

impl CircuitBreaker {
    /// Create a closed circuit breaker. `name` labels its log lines.
    #[must_use]
    pub fn new(name: impl Into<Arc<str>>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config: Arc::new(config),
            inner: Arc::new(Mutex::new(Inner {
                state: State::Closed,
                consecutive_failures: 0,
                half_open_successes: 0,
                opened_at: None,
            })),
            rejections: Arc::new(AtomicU64::new(0)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current state. An open circuit whose timer has elapsed reports `HalfOpen`.
    #[must_use]
    pub fn state(&self) -> State {
        let mut inner = self.lock();
        self.refresh(&mut inner);
        inner.state
    }

    /// Calls rejected because the circuit was open.
    #[must_use]
    pub fn rejections(&self) -> u64 {
        self.rejections.load(Ordering::Relaxed)
    }

    /// Run `operation` unless the circuit is open.
    ///
    /// # Errors
    ///
    /// Returns [`CircuitBreakerError::Open`] without running the operation if
    /// the circuit is open, or [`CircuitBreakerError::Inner`] with the
    /// operation's own error.
    pub async fn call<F, Fut, T, E>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        if self.state() == State::Open {
            self.rejections.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(breaker = %self.name, "Circuit open, call rejected");
            return Err(CircuitBreakerError::Open);
        }

        match operation().await {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(err) => {
                self.record_failure();
                Err(CircuitBreakerError::Inner(err))
            }
        }
    }

    /// Count a success observed outside [`CircuitBreaker::call`].
    pub fn record_success(&self) {
        let mut inner = self.lock();
        match inner.state {
            State::HalfOpen => {
                inner.half_open_successes += 1;
                if inner.half_open_successes >= self.config.success_threshold {
                    tracing::info!(breaker = %self.name, "Circuit closed");
                    inner.state = State::Closed;
                    inner.consecutive_failures = 0;
                    inner.half_open_successes = 0;
                    inner.opened_at = None;
                }
            }
            State::Closed | State::Open => inner.consecutive_failures = 0,
        }
    }

    /// Count a failure observed outside [`CircuitBreaker::call`].
    pub fn record_failure(&self) {
        let mut inner = self.lock();
        inner.consecutive_failures += 1;
        let trip = match inner.state {
            State::HalfOpen => true,
            State::Closed => inner.consecutive_failures >= self.config.failure_threshold,
            State::Open => false,
        };
        if trip {
            tracing::warn!(
                breaker = %self.name,
                failures = inner.consecutive_failures,
                open_for_ms = self.config.open_duration.as_millis(),
                "Circuit opened"
            );
            inner.state = State::Open;
            inner.half_open_successes = 0;
            inner.opened_at = Some(Instant::now());
        }
    }

    fn refresh(&self, inner: &mut Inner) {
        if inner.state != State::Open {
            return;
        }
        let elapsed = inner
            .opened_at
            .is_none_or(|opened| opened.elapsed() >= self.config.open_duration);
        if elapsed {
            tracing::info!(breaker = %self.name, "Circuit half-open, allowing trial call");
            inner.state = State::HalfOpen;
            inner.half_open_successes = 0;
        }
    }
}
