//! Event bus abstraction over a queue-based message broker.
//!
//! This module provides the [`EventBus`] trait the typed publisher and the
//! subscriber/dispatcher are built on. The broker model is AMQP-shaped:
//!
//! - **One queue per event type**: the queue name is the event's type tag
//! - **Default exchange**: messages are routed by queue name
//! - **Explicit acknowledgement**: every consumed message is settled with
//!   [`Delivery::ack`] or [`Delivery::nack`]; nothing is auto-acked
//! - **At-least-once**: a nacked (requeued) message comes back, possibly to
//!   another consumer, so handlers must tolerate duplicates
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐       ┌──────────────────┐
//! │  EventPublisher  │       │ EventSubscriber  │
//! │ (typed, runtime) │       │ (typed, runtime) │
//! └────────┬─────────┘       └────────▲─────────┘
//!          │ OutboundMessage          │ Box<dyn Delivery>
//!          ▼                          │
//! ┌─────────────────────────────────────────────┐
//! │               dyn EventBus                  │
//! │  AmqpEventBus (lapin) / InMemoryEventBus    │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! # Dyn Compatibility
//!
//! Methods return `Pin<Box<dyn Future>>` instead of using `async fn` so the
//! bus can be shared as `Arc<dyn EventBus>` by every publisher and subscriber
//! in a process.

use futures::Stream;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Content type stamped on every published message.
pub const CONTENT_TYPE_JSON: &str = "application/json";

/// Header carrying how many times a message has already been retried.
pub const RETRY_COUNT_HEADER: &str = "x-retry-count";

/// Suffix appended to a queue name to form its dead-letter queue.
pub const DEAD_LETTER_SUFFIX: &str = ".dead-letter";

/// Errors that can occur during event bus operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventBusError {
    /// Failed to connect to the broker
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Failed to publish a message to a queue
    #[error("Publish failed for queue '{queue}': {reason}")]
    PublishFailed {
        /// The queue that failed
        queue: String,
        /// The reason for failure
        reason: String,
    },

    /// Failed to start consuming a queue
    #[error("Subscription failed for queue '{queue}': {reason}")]
    SubscriptionFailed {
        /// The queue that failed to subscribe
        queue: String,
        /// The reason for failure
        reason: String,
    },

    /// Queue name is empty or otherwise unusable
    #[error("Invalid queue name: '{0}'")]
    InvalidQueue(String),

    /// A handler is already registered for this event type
    #[error("A handler is already registered for event type '{0}'")]
    DuplicateRegistration(String),

    /// Failed to ack or nack a delivery
    #[error("Acknowledgement failed: {0}")]
    AcknowledgeFailed(String),

    /// Network or transport error
    #[error("Transport error: {0}")]
    TransportError(String),
}

/// Queue declaration flags.
///
/// The publisher and the subscriber declare the same queue; the broker
/// rejects a declaration whose flags differ from an existing queue, so both
/// sides must use the same topology.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueueTopology {
    /// Survive a broker restart
    pub durable: bool,
    /// Restricted to the declaring connection
    pub exclusive: bool,
    /// Deleted when the last consumer goes away
    pub auto_delete: bool,
}

impl QueueTopology {
    /// Non-durable, non-exclusive, not auto-deleted.
    pub const TRANSIENT: Self = Self {
        durable: false,
        exclusive: false,
        auto_delete: false,
    };
}

impl Default for QueueTopology {
    fn default() -> Self {
        Self::TRANSIENT
    }
}

/// A message ready to be handed to the broker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutboundMessage {
    /// Destination queue (routing key on the default exchange)
    pub queue: String,
    /// Encoded body
    pub body: Vec<u8>,
    /// MIME type of the body
    pub content_type: String,
    /// Value of the [`RETRY_COUNT_HEADER`] header
    pub retry_count: u32,
}

impl OutboundMessage {
    /// A first-attempt JSON message.
    #[must_use]
    pub fn json(queue: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            queue: queue.into(),
            body,
            content_type: CONTENT_TYPE_JSON.to_string(),
            retry_count: 0,
        }
    }

    /// Same message with a different retry counter.
    #[must_use]
    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }
}

/// Name of the dead-letter queue paired with `queue`.
#[must_use]
pub fn dead_letter_queue(queue: &str) -> String {
    format!("{queue}{DEAD_LETTER_SUFFIX}")
}

/// Boxed future returned by [`Delivery`] settlement methods.
pub type SettleFuture = Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send>>;

/// A consumed message awaiting settlement.
///
/// Settling consumes the delivery, so a message can be acked or nacked
/// exactly once.
pub trait Delivery: Send {
    /// Queue the message was consumed from.
    fn queue(&self) -> &str;

    /// Raw message body.
    fn body(&self) -> &[u8];

    /// Retries already attempted for this message (0 on first delivery).
    fn retry_count(&self) -> u32;

    /// Whether the broker flagged this as a redelivery.
    fn redelivered(&self) -> bool;

    /// Acknowledge: the broker removes the message from the queue.
    fn ack(self: Box<Self>) -> SettleFuture;

    /// Negatively acknowledge; with `requeue` the broker delivers it again.
    fn nack(self: Box<Self>, requeue: bool) -> SettleFuture;
}

/// Stream of deliveries from one queue.
pub type DeliveryStream =
    Pin<Box<dyn Stream<Item = Result<Box<dyn Delivery>, EventBusError>> + Send>>;

/// Trait for event bus implementations.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`: a single bus (and the broker
/// connection behind it) is shared by every publish and subscribe call site
/// in the process.
pub trait EventBus: Send + Sync {
    /// Publish a message to `message.queue` on the default exchange.
    ///
    /// Declares the queue first (idempotent). Resolves once the broker has
    /// accepted the message, not when a consumer has processed it.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::PublishFailed`] if the channel cannot be
    /// opened, the queue cannot be declared, or the broker refuses the message.
    fn publish(
        &self,
        message: &OutboundMessage,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>>;

    /// Declare `queue` and start consuming it with explicit acknowledgement.
    ///
    /// The underlying channel is retained until [`EventBus::close`].
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::SubscriptionFailed`] if the queue cannot be
    /// declared or consumed.
    fn subscribe(
        &self,
        queue: &str,
    ) -> Pin<Box<dyn Future<Output = Result<DeliveryStream, EventBusError>> + Send + '_>>;

    /// Close every channel retained by [`EventBus::subscribe`].
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::TransportError`] if the broker cannot be told.
    fn close(&self) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>>;
}
