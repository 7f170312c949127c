//! # Stockflow Testing
//!
//! Test doubles for the stockflow services.
//!
//! This crate provides:
//! - [`InMemoryEventBus`]: an in-process broker with explicit ack / nack
//!   bookkeeping, so dispatch and saga tests run without `RabbitMQ`
//! - [`FixedClock`]: deterministic time
//! - [`helpers::eventually`]: poll until a background consumer has caught up
//!
//! ## Example
//!
//! ```ignore
//! use stockflow_testing::{InMemoryEventBus, test_clock};
//!
//! #[tokio::test]
//! async fn order_created_reaches_the_stock_handler() {
//!     let bus = Arc::new(InMemoryEventBus::new());
//!     let publisher = EventPublisher::new(bus.clone());
//!     publisher.publish(&order_created(&test_clock())).await.unwrap();
//!     assert_eq!(bus.published("OrderCreated").len(), 1);
//! }
//! ```

use chrono::{DateTime, Utc};
use stockflow_core::environment::Clock;

pub mod bus;

/// Mock implementations of environment traits.
pub mod mocks {
    use super::{Clock, DateTime, Utc};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use stockflow_testing::mocks::FixedClock;
    /// use stockflow_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone, Copy)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(DateTime::<Utc>::from_timestamp(1_735_689_600, 0).unwrap_or_default())
    }
}

/// Test helpers.
pub mod helpers {
    use std::time::Duration;

    /// Poll `condition` every 10ms until it holds or `timeout` elapses.
    ///
    /// Returns whether the condition was met. Consumers run on spawned tasks,
    /// so a test observes their effects only after they have been scheduled.
    pub async fn eventually(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if condition() {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

pub use bus::{InMemoryEventBus, Settlement};
pub use mocks::{FixedClock, test_clock};

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn fixed_clock_is_new_year_2025() {
        let clock = test_clock();
        assert_eq!(clock.now(), clock.now());
        assert_eq!(clock.now().to_rfc3339(), "2025-01-01T00:00:00+00:00");
    }

    #[tokio::test]
    async fn eventually_waits_for_the_condition() {
        let polls = AtomicUsize::new(0);
        let met = helpers::eventually(Duration::from_secs(1), || {
            polls.fetch_add(1, Ordering::SeqCst) >= 2
        })
        .await;
        assert!(met);
        assert_eq!(polls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn eventually_gives_up() {
        let met = helpers::eventually(Duration::from_millis(30), || false).await;
        assert!(!met);
    }
}
