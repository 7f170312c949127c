//! Handler contract for consumed integration events.

use crate::event::IntegrationEvent;
use std::error::Error as StdError;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// A handler failure. The subscriber treats it as retryable.
///
/// Domain facts that redelivery cannot change (unknown product, stock
/// already gone) are not failures: the handler logs them and returns `Ok`.
#[derive(Error, Debug)]
#[error("{message}")]
pub struct HandlerError {
    message: String,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl HandlerError {
    /// Failure with a message only.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Failure wrapping a lower-level error.
    #[must_use]
    pub fn with_source(
        message: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

/// Reacts to one integration event type.
///
/// A fresh handler instance is built for every delivery, so state held by the
/// handler (a store handle, a publisher) is never shared between two
/// concurrent deliveries.
pub trait EventHandler<E: IntegrationEvent>: Send + Sync {
    /// Process one event.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError`] when processing failed and the message should
    /// be delivered again.
    fn handle(
        &self,
        event: E,
    ) -> Pin<Box<dyn Future<Output = Result<(), HandlerError>> + Send + '_>>;
}
