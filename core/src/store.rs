//! Persistence failures shared by the service-local stores.
//!
//! Each service owns its records and its store; only the error vocabulary is
//! common so handlers map it the same way on both sides.

use thiserror::Error;

/// Errors from a record store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// No record with this id
    #[error("{entity} with id {id} not found")]
    NotFound {
        /// Record kind, e.g. `"Product"`
        entity: &'static str,
        /// Missing id
        id: i64,
    },

    /// A record with this id already exists
    #[error("{entity} with id {id} already exists")]
    AlreadyExists {
        /// Record kind
        entity: &'static str,
        /// Conflicting id
        id: i64,
    },

    /// Backend not reachable; the operation may succeed if retried
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Whether retrying the operation could succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}
