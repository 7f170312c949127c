//! # Stockflow Runtime
//!
//! Broker-agnostic machinery layered on [`stockflow_core::EventBus`]:
//!
//! - [`publisher::EventPublisher`]: resolve queue from the event type, encode, publish
//! - [`subscriber::EventSubscriber`]: registry of (event type, handler factory)
//!   pairs, consumer loops, ack / nack / dead-letter settlement
//! - [`redelivery::RedeliveryPolicy`]: what happens to a message whose handler failed
//! - [`retry`]: exponential backoff for transient failures
//! - [`circuit_breaker`]: stop calling a dependency that keeps failing

pub mod circuit_breaker;
pub mod publisher;
pub mod redelivery;
pub mod retry;
pub mod subscriber;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError};
pub use publisher::EventPublisher;
pub use redelivery::{RedeliveryDecision, RedeliveryPolicy};
pub use retry::{RetryPolicy, retry_with_backoff, retry_with_predicate};
pub use subscriber::EventSubscriber;
