//! Event subscriber and dispatcher.
//!
//! [`EventSubscriber`] holds an explicit registry of event type tag to
//! handler factory. [`EventSubscriber::start`] subscribes one queue per
//! registration and spawns a consumer task that, for every delivery:
//!
//! 1. decodes the body into the registered event type
//! 2. builds a fresh handler from the factory
//! 3. runs the handler
//! 4. acks on success, or settles the failure per [`RedeliveryPolicy`]
//!
//! A handler that panics is treated like one that returned an error: the
//! panic is caught, the delivery is settled and the consumer moves on.
//!
//! Deliveries on one queue are processed one at a time, in the order the
//! broker presents them.

use crate::redelivery::{RedeliveryDecision, RedeliveryPolicy};
use futures::{FutureExt, StreamExt};
use std::any::Any;
use std::collections::BTreeMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use stockflow_core::event_bus::dead_letter_queue;
use stockflow_core::{
    Delivery, DeliveryStream, EventBus, EventBusError, EventError, EventHandler, HandlerError,
    IntegrationEvent, OutboundMessage,
};
use thiserror::Error;
use tokio::task::JoinHandle;

/// Why a delivery could not be processed.
#[derive(Error, Debug)]
enum DispatchFailure {
    #[error("undecodable message: {0}")]
    Decode(#[from] EventError),
    #[error("handler failed: {0}")]
    Handler(#[from] HandlerError),
    #[error("handler panicked: {0}")]
    Panicked(String),
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}

type DispatchFuture = Pin<Box<dyn Future<Output = Result<(), DispatchFailure>> + Send>>;
type DispatchFn = Arc<dyn Fn(Vec<u8>) -> DispatchFuture + Send + Sync>;

struct Registration {
    handler_type: &'static str,
    dispatch: DispatchFn,
    task: Option<JoinHandle<()>>,
}

/// Registry of event handlers plus the consumer tasks driving them.
pub struct EventSubscriber {
    bus: Arc<dyn EventBus>,
    policy: RedeliveryPolicy,
    registrations: BTreeMap<&'static str, Registration>,
}

impl std::fmt::Debug for EventSubscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSubscriber")
            .field("policy", &self.policy)
            .field("queues", &self.registrations.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl EventSubscriber {
    /// Create a subscriber with no registrations.
    #[must_use]
    pub fn new(bus: Arc<dyn EventBus>, policy: RedeliveryPolicy) -> Self {
        Self {
            bus,
            policy,
            registrations: BTreeMap::new(),
        }
    }

    /// Register `factory` as the handler source for events of type `E`.
    ///
    /// The factory runs once per delivery, so each message gets its own
    /// handler instance.
    ///
    /// # Errors
    ///
    /// - [`EventBusError::InvalidQueue`] if `E::EVENT_TYPE` is blank
    /// - [`EventBusError::DuplicateRegistration`] if `E` already has a handler
    pub fn register<E, H, F>(&mut self, factory: F) -> Result<&mut Self, EventBusError>
    where
        E: IntegrationEvent,
        H: EventHandler<E> + 'static,
        F: Fn() -> H + Send + Sync + 'static,
    {
        let queue = E::EVENT_TYPE;
        if queue.trim().is_empty() {
            return Err(EventBusError::InvalidQueue(queue.to_string()));
        }
        if self.registrations.contains_key(queue) {
            return Err(EventBusError::DuplicateRegistration(queue.to_string()));
        }

        let factory = Arc::new(factory);
        let dispatch: DispatchFn = Arc::new(move |body: Vec<u8>| -> DispatchFuture {
            let factory = Arc::clone(&factory);
            Box::pin(async move {
                let event = E::from_json(&body)?;
                let handler = factory();
                handler.handle(event).await?;
                Ok::<(), DispatchFailure>(())
            })
        });

        self.registrations.insert(
            queue,
            Registration {
                handler_type: std::any::type_name::<H>(),
                dispatch,
                task: None,
            },
        );
        tracing::debug!(queue, handler = std::any::type_name::<H>(), "Registered event handler");
        Ok(self)
    }

    /// Event type tags with a registered handler.
    pub fn queues(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.registrations.keys().copied()
    }

    /// Subscribe every registered queue that is not consuming yet.
    ///
    /// # Errors
    ///
    /// Returns the bus error of the first queue that could not be subscribed.
    /// Queues started before the failure keep consuming.
    pub async fn start(&mut self) -> Result<(), EventBusError> {
        for (&queue, registration) in &mut self.registrations {
            if registration.task.is_some() {
                continue;
            }
            let stream = self.bus.subscribe(queue).await?;
            registration.task = Some(tokio::spawn(consume(
                Arc::clone(&self.bus),
                queue,
                stream,
                Arc::clone(&registration.dispatch),
                self.policy,
            )));
            tracing::info!(
                queue,
                handler = registration.handler_type,
                policy = ?self.policy,
                "Subscribed to queue"
            );
        }
        Ok(())
    }

    /// Stop consuming and close the bus's subscription channels.
    ///
    /// Consumer tasks are aborted, so a handler in progress is dropped
    /// mid-flight; its message was never acked and the broker delivers it
    /// again.
    ///
    /// # Errors
    ///
    /// Returns the error from [`EventBus::close`].
    pub async fn shutdown(&mut self) -> Result<(), EventBusError> {
        for (queue, registration) in &mut self.registrations {
            if let Some(task) = registration.task.take() {
                task.abort();
                tracing::debug!(queue, "Stopped consumer");
            }
        }
        self.bus.close().await
    }
}

impl Drop for EventSubscriber {
    fn drop(&mut self) {
        for registration in self.registrations.values_mut() {
            if let Some(task) = registration.task.take() {
                task.abort();
            }
        }
    }
}

async fn consume(
    bus: Arc<dyn EventBus>,
    queue: &'static str,
    mut stream: DeliveryStream,
    dispatch: DispatchFn,
    policy: RedeliveryPolicy,
) {
    while let Some(next) = stream.next().await {
        match next {
            Ok(delivery) => settle(bus.as_ref(), queue, delivery, &dispatch, policy).await,
            Err(error) => tracing::warn!(queue, %error, "Consumer stream error"),
        }
    }
    tracing::info!(queue, "Consumer stream ended");
}

async fn settle(
    bus: &dyn EventBus,
    queue: &'static str,
    delivery: Box<dyn Delivery>,
    dispatch: &DispatchFn,
    policy: RedeliveryPolicy,
) {
    let retry_count = delivery.retry_count();
    let body = delivery.body().to_vec();

    let result = AssertUnwindSafe(dispatch(body.clone()))
        .catch_unwind()
        .await
        .unwrap_or_else(|payload| Err(DispatchFailure::Panicked(panic_message(&*payload))));

    let failure = match result {
        Ok(()) => {
            record(queue, "acked");
            if let Err(error) = delivery.ack().await {
                tracing::warn!(queue, %error, "Failed to ack processed message");
            }
            return;
        }
        Err(failure) => failure,
    };

    let outcome = match policy.decide(retry_count) {
        RedeliveryDecision::Requeue => {
            tracing::warn!(queue, retry_count, error = %failure, "Message failed, requeueing");
            requeue(queue, delivery).await;
            "requeued"
        }
        RedeliveryDecision::Retry { next_retry_count } => {
            tracing::warn!(
                queue,
                retry_count = next_retry_count,
                error = %failure,
                "Message failed, scheduling retry"
            );
            let retry = OutboundMessage::json(queue, body).with_retry_count(next_retry_count);
            republish_then_ack(bus, queue, &retry, delivery).await
        }
        RedeliveryDecision::DeadLetter => {
            tracing::error!(
                queue,
                retry_count,
                error = %failure,
                "Message failed after max retries, dead-lettering"
            );
            let dead = OutboundMessage::json(dead_letter_queue(queue), body)
                .with_retry_count(retry_count);
            republish_then_ack(bus, queue, &dead, delivery).await
        }
    };
    record(queue, outcome);
}

async fn republish_then_ack(
    bus: &dyn EventBus,
    queue: &'static str,
    message: &OutboundMessage,
    delivery: Box<dyn Delivery>,
) -> &'static str {
    if let Err(error) = bus.publish(message).await {
        tracing::error!(
            queue,
            destination = %message.queue,
            %error,
            "Republish failed, requeueing original"
        );
        requeue(queue, delivery).await;
        return "requeued";
    }
    if let Err(error) = delivery.ack().await {
        tracing::warn!(queue, %error, "Failed to ack republished message");
    }
    if message.queue == queue {
        "retried"
    } else {
        "dead_lettered"
    }
}

async fn requeue(queue: &'static str, delivery: Box<dyn Delivery>) {
    if let Err(error) = delivery.nack(true).await {
        tracing::warn!(queue, %error, "Failed to nack message");
    }
}

fn record(queue: &'static str, outcome: &'static str) {
    metrics::counter!("stockflow_deliveries_total", "queue" => queue, "outcome" => outcome)
        .increment(1);
}
