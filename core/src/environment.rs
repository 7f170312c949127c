//! Injected dependencies shared by both services.

use chrono::{DateTime, Utc};

/// Clock trait - abstracts time operations for testability.
///
/// Every timestamp the services write (`occurredAt`, `createdAt`, `updatedAt`)
/// comes from a `Clock`, so tests can pin time with a fixed implementation.
pub trait Clock: Send + Sync {
    /// Get the current time
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock implementation used by the service binaries.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
