//! In-memory implementation of [`EventBus`].
//!
//! Each queue is an unbounded channel. Messages published before anyone
//! subscribes are buffered until the first subscription takes the receiver.
//! Every settlement is recorded so tests can assert exactly what was acked,
//! nacked and republished.

use futures::future;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use stockflow_core::event_bus::SettleFuture;
use stockflow_core::{
    Delivery, DeliveryStream, EventBus, EventBusError, IntegrationEvent, OutboundMessage,
};
use tokio::sync::mpsc;

#[derive(Debug, Clone)]
struct QueuedMessage {
    body: Vec<u8>,
    retry_count: u32,
    redelivered: bool,
}

struct QueueState {
    sender: mpsc::UnboundedSender<QueuedMessage>,
    receiver: Option<mpsc::UnboundedReceiver<QueuedMessage>>,
}

impl QueueState {
    fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender,
            receiver: Some(receiver),
        }
    }
}

/// A settled message as recorded by the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settlement {
    /// Queue the message was consumed from
    pub queue: String,
    /// Message body
    pub body: Vec<u8>,
    /// Retry counter the message carried
    pub retry_count: u32,
}

#[derive(Default)]
struct BusState {
    queues: HashMap<String, QueueState>,
    published: Vec<OutboundMessage>,
    acked: Vec<Settlement>,
    nacked: Vec<(Settlement, bool)>,
    fail_publishes: bool,
    closed: bool,
}

impl BusState {
    fn queue(&mut self, name: &str) -> &mut QueueState {
        self.queues
            .entry(name.to_string())
            .or_insert_with(QueueState::new)
    }
}

/// In-process broker for tests.
///
/// One consumer per queue: a second `subscribe` to the same queue fails.
#[derive(Clone, Default)]
pub struct InMemoryEventBus {
    state: Arc<Mutex<BusState>>,
}

impl std::fmt::Debug for InMemoryEventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("InMemoryEventBus")
            .field("queues", &state.queues.keys().collect::<Vec<_>>())
            .field("published", &state.published.len())
            .field("closed", &state.closed)
            .finish()
    }
}

impl InMemoryEventBus {
    /// Create an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BusState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make every subsequent publish fail (or succeed again).
    pub fn set_fail_publishes(&self, fail: bool) {
        self.lock().fail_publishes = fail;
    }

    /// Messages accepted for `queue`, in publish order, retries included.
    #[must_use]
    pub fn published(&self, queue: &str) -> Vec<OutboundMessage> {
        self.lock()
            .published
            .iter()
            .filter(|message| message.queue == queue)
            .cloned()
            .collect()
    }

    /// First-attempt messages on `E`'s queue, decoded.
    ///
    /// Undecodable bodies are skipped.
    #[must_use]
    pub fn published_events<E: IntegrationEvent>(&self) -> Vec<E> {
        self.published(E::EVENT_TYPE)
            .iter()
            .filter(|message| message.retry_count == 0)
            .filter_map(|message| E::from_json(&message.body).ok())
            .collect()
    }

    /// Messages acked on `queue`.
    #[must_use]
    pub fn acked(&self, queue: &str) -> Vec<Settlement> {
        self.lock()
            .acked
            .iter()
            .filter(|settlement| settlement.queue == queue)
            .cloned()
            .collect()
    }

    /// Messages nacked on `queue`, with their `requeue` flag.
    #[must_use]
    pub fn nacked(&self, queue: &str) -> Vec<(Settlement, bool)> {
        self.lock()
            .nacked
            .iter()
            .filter(|(settlement, _)| settlement.queue == queue)
            .cloned()
            .collect()
    }

    /// Whether [`EventBus::close`] has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    fn publish_now(&self, message: &OutboundMessage) -> Result<(), EventBusError> {
        let mut state = self.lock();
        if state.closed || state.fail_publishes {
            return Err(EventBusError::PublishFailed {
                queue: message.queue.clone(),
                reason: if state.closed { "bus closed" } else { "broker unavailable" }.to_string(),
            });
        }
        if message.queue.is_empty() {
            return Err(EventBusError::InvalidQueue(message.queue.clone()));
        }

        let queued = QueuedMessage {
            body: message.body.clone(),
            retry_count: message.retry_count,
            redelivered: false,
        };
        state
            .queue(&message.queue)
            .sender
            .send(queued)
            .map_err(|_| EventBusError::PublishFailed {
                queue: message.queue.clone(),
                reason: "queue consumer dropped".to_string(),
            })?;
        state.published.push(message.clone());
        Ok(())
    }

    fn subscribe_now(&self, queue: &str) -> Result<DeliveryStream, EventBusError> {
        let mut receiver = {
            let mut state = self.lock();
            if state.closed {
                return Err(EventBusError::SubscriptionFailed {
                    queue: queue.to_string(),
                    reason: "bus closed".to_string(),
                });
            }
            state
                .queue(queue)
                .receiver
                .take()
                .ok_or_else(|| EventBusError::SubscriptionFailed {
                    queue: queue.to_string(),
                    reason: "queue already has a consumer".to_string(),
                })?
        };

        let bus = self.clone();
        let queue = queue.to_string();
        let stream = async_stream::stream! {
            while let Some(message) = receiver.recv().await {
                let delivery = InMemoryDelivery {
                    bus: bus.clone(),
                    queue: queue.clone(),
                    message,
                };
                yield Ok::<_, EventBusError>(Box::new(delivery) as Box<dyn Delivery>);
            }
        };
        Ok(Box::pin(stream))
    }
}

impl EventBus for InMemoryEventBus {
    fn publish(
        &self,
        message: &OutboundMessage,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>> {
        Box::pin(future::ready(self.publish_now(message)))
    }

    fn subscribe(
        &self,
        queue: &str,
    ) -> Pin<Box<dyn Future<Output = Result<DeliveryStream, EventBusError>> + Send + '_>> {
        Box::pin(future::ready(self.subscribe_now(queue)))
    }

    fn close(&self) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>> {
        let mut state = self.lock();
        state.closed = true;
        // Dropping the senders ends every consumer stream.
        state.queues.clear();
        Box::pin(future::ready(Ok(())))
    }
}

struct InMemoryDelivery {
    bus: InMemoryEventBus,
    queue: String,
    message: QueuedMessage,
}

impl InMemoryDelivery {
    fn settlement(&self) -> Settlement {
        Settlement {
            queue: self.queue.clone(),
            body: self.message.body.clone(),
            retry_count: self.message.retry_count,
        }
    }
}

impl Delivery for InMemoryDelivery {
    fn queue(&self) -> &str {
        &self.queue
    }

    fn body(&self) -> &[u8] {
        &self.message.body
    }

    fn retry_count(&self) -> u32 {
        self.message.retry_count
    }

    fn redelivered(&self) -> bool {
        self.message.redelivered
    }

    fn ack(self: Box<Self>) -> SettleFuture {
        let settlement = self.settlement();
        self.bus.lock().acked.push(settlement);
        Box::pin(future::ready(Ok(())))
    }

    fn nack(self: Box<Self>, requeue: bool) -> SettleFuture {
        let settlement = self.settlement();
        let mut state = self.bus.lock();
        state.nacked.push((settlement, requeue));

        let result = if requeue && !state.closed {
            let redelivery = QueuedMessage {
                redelivered: true,
                ..self.message.clone()
            };
            state
                .queue(&self.queue)
                .sender
                .send(redelivery)
                .map_err(|e| EventBusError::AcknowledgeFailed(e.to_string()))
        } else {
            Ok(())
        };
        Box::pin(future::ready(result))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[test]
    fn buffers_until_first_subscriber() {
        let bus = InMemoryEventBus::new();
        tokio_test::block_on(bus.publish(&OutboundMessage::json("q", b"one".to_vec()))).unwrap();

        let mut stream = tokio_test::block_on(bus.subscribe("q")).unwrap();
        let delivery = tokio_test::block_on(stream.next()).unwrap().unwrap();

        assert_eq!(delivery.body(), b"one");
        assert_eq!(delivery.retry_count(), 0);
        assert!(!delivery.redelivered());
    }

    #[test]
    fn nack_with_requeue_redelivers() {
        let bus = InMemoryEventBus::new();
        let mut stream = tokio_test::block_on(bus.subscribe("q")).unwrap();
        tokio_test::block_on(bus.publish(&OutboundMessage::json("q", b"m".to_vec()))).unwrap();

        let first = tokio_test::block_on(stream.next()).unwrap().unwrap();
        tokio_test::block_on(first.nack(true)).unwrap();
        let second = tokio_test::block_on(stream.next()).unwrap().unwrap();
        assert!(second.redelivered());
        tokio_test::block_on(second.ack()).unwrap();

        assert_eq!(bus.nacked("q").len(), 1);
        assert_eq!(bus.acked("q").len(), 1);
    }

    #[test]
    fn second_consumer_is_rejected() {
        let bus = InMemoryEventBus::new();
        let _first = tokio_test::block_on(bus.subscribe("q")).unwrap();
        assert!(matches!(
            tokio_test::block_on(bus.subscribe("q")),
            Err(EventBusError::SubscriptionFailed { .. })
        ));
    }

    #[test]
    fn failing_publishes_are_not_recorded() {
        let bus = InMemoryEventBus::new();
        bus.set_fail_publishes(true);
        let result = tokio_test::block_on(bus.publish(&OutboundMessage::json("q", vec![])));
        assert!(matches!(result, Err(EventBusError::PublishFailed { .. })));
        assert!(bus.published("q").is_empty());
    }

    #[test]
    fn close_ends_consumer_streams() {
        let bus = InMemoryEventBus::new();
        let mut stream = tokio_test::block_on(bus.subscribe("q")).unwrap();
        tokio_test::block_on(bus.close()).unwrap();

        assert!(tokio_test::block_on(stream.next()).is_none());
        assert!(bus.is_closed());
    }
}
