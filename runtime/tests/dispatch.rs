//! Integration tests for publish → subscribe → settle over the in-memory broker.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can unwrap and panic

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use stockflow_core::environment::Clock;
use stockflow_core::{
    EventBus, EventBusError, EventHandler, HandlerError, IntegrationEvent, Money, OrderCreated,
    OrderId, OutboundMessage, ProductId,
};
use stockflow_runtime::{EventPublisher, EventSubscriber, RedeliveryPolicy};
use stockflow_testing::helpers::eventually;
use stockflow_testing::{InMemoryEventBus, test_clock};

// ============================================================================
// Test Fixtures
// ============================================================================

const WAIT: Duration = Duration::from_secs(2);

fn order_created(order_id: i64) -> OrderCreated {
    OrderCreated::new(
        OrderId::new(order_id),
        ProductId::new(3),
        4,
        Money::from_cents(1999),
        test_clock().now(),
    )
}

/// Records every event it sees; fails while `failures_left` is positive.
struct Recording {
    seen: Arc<Mutex<Vec<OrderCreated>>>,
    failures_left: Arc<AtomicUsize>,
}

impl EventHandler<OrderCreated> for Recording {
    fn handle(
        &self,
        event: OrderCreated,
    ) -> Pin<Box<dyn Future<Output = Result<(), HandlerError>> + Send + '_>> {
        Box::pin(async move {
            self.seen.lock().unwrap().push(event);
            let failing = self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failing {
                Err(HandlerError::new("store unavailable"))
            } else {
                Ok(())
            }
        })
    }
}

/// Panics the first time it runs, then records like [`Recording`].
struct PanicsOnce {
    seen: Arc<Mutex<Vec<OrderCreated>>>,
    panicked: Arc<AtomicUsize>,
}

impl EventHandler<OrderCreated> for PanicsOnce {
    fn handle(
        &self,
        event: OrderCreated,
    ) -> Pin<Box<dyn Future<Output = Result<(), HandlerError>> + Send + '_>> {
        Box::pin(async move {
            if self.panicked.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("stock record corrupted");
            }
            self.seen.lock().unwrap().push(event);
            Ok(())
        })
    }
}

struct Harness {
    bus: Arc<InMemoryEventBus>,
    publisher: EventPublisher,
    subscriber: EventSubscriber,
    seen: Arc<Mutex<Vec<OrderCreated>>>,
}

async fn harness(policy: RedeliveryPolicy, failures: usize) -> Harness {
    let bus = Arc::new(InMemoryEventBus::new());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let failures_left = Arc::new(AtomicUsize::new(failures));

    let mut subscriber = EventSubscriber::new(bus.clone(), policy);
    let handler_seen = Arc::clone(&seen);
    subscriber
        .register::<OrderCreated, _, _>(move || Recording {
            seen: Arc::clone(&handler_seen),
            failures_left: Arc::clone(&failures_left),
        })
        .unwrap();
    subscriber.start().await.unwrap();

    Harness {
        publisher: EventPublisher::new(bus.clone()),
        bus,
        subscriber,
        seen,
    }
}

fn seen_count(seen: &Arc<Mutex<Vec<OrderCreated>>>) -> usize {
    seen.lock().unwrap().len()
}

// ============================================================================
// Delivery
// ============================================================================

#[tokio::test]
async fn published_event_reaches_handler_intact_and_is_acked() {
    let h = harness(RedeliveryPolicy::default(), 0).await;
    let event = order_created(17);

    h.publisher.publish(&event).await.unwrap();

    assert!(eventually(WAIT, || !h.bus.acked("OrderCreated").is_empty()).await);
    assert_eq!(*h.seen.lock().unwrap(), vec![event]);
    assert!(h.bus.nacked("OrderCreated").is_empty());

    let message = &h.bus.published("OrderCreated")[0];
    assert_eq!(message.content_type, "application/json");
    assert_eq!(message.retry_count, 0);
}

#[tokio::test]
async fn messages_published_before_start_are_delivered() {
    let bus = Arc::new(InMemoryEventBus::new());
    EventPublisher::new(bus.clone())
        .publish(&order_created(1))
        .await
        .unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let handler_seen = Arc::clone(&seen);
    let mut subscriber = EventSubscriber::new(bus.clone(), RedeliveryPolicy::Requeue);
    subscriber
        .register::<OrderCreated, _, _>(move || Recording {
            seen: Arc::clone(&handler_seen),
            failures_left: Arc::new(AtomicUsize::new(0)),
        })
        .unwrap();
    subscriber.start().await.unwrap();

    assert!(eventually(WAIT, || seen_count(&seen) == 1).await);
}

// ============================================================================
// Failure settlement
// ============================================================================

#[tokio::test]
async fn requeue_policy_nacks_and_the_message_comes_back() {
    let h = harness(RedeliveryPolicy::Requeue, 1).await;

    h.publisher.publish(&order_created(2)).await.unwrap();

    assert!(eventually(WAIT, || h.bus.acked("OrderCreated").len() == 1).await);
    let nacked = h.bus.nacked("OrderCreated");
    assert_eq!(nacked.len(), 1);
    assert!(nacked[0].1, "nack must request requeue");
    assert_eq!(seen_count(&h.seen), 2);
    // Requeue leaves the message alone; nothing is republished.
    assert_eq!(h.bus.published("OrderCreated").len(), 1);
}

#[tokio::test]
async fn bounded_policy_retries_then_dead_letters() {
    let h = harness(RedeliveryPolicy::Bounded { max_retries: 2 }, usize::MAX).await;
    let event = order_created(3);

    h.publisher.publish(&event).await.unwrap();

    assert!(eventually(WAIT, || h.bus.acked("OrderCreated").len() == 3).await);

    let attempts: Vec<u32> = h
        .bus
        .published("OrderCreated")
        .iter()
        .map(|m| m.retry_count)
        .collect();
    assert_eq!(attempts, vec![0, 1, 2]);
    assert_eq!(seen_count(&h.seen), 3);

    let dead = &h.bus.published("OrderCreated.dead-letter")[0];
    assert_eq!(dead.body, event.to_json().unwrap());
    assert_eq!(dead.retry_count, 2);

    assert_eq!(h.bus.acked("OrderCreated").len(), 3);
    assert!(h.bus.nacked("OrderCreated").is_empty());
}

#[tokio::test]
async fn transient_failure_recovers_on_retry() {
    let h = harness(RedeliveryPolicy::Bounded { max_retries: 5 }, 1).await;

    h.publisher.publish(&order_created(4)).await.unwrap();

    assert!(eventually(WAIT, || h.bus.acked("OrderCreated").len() == 2).await);
    assert_eq!(seen_count(&h.seen), 2);
    assert!(h.bus.published("OrderCreated.dead-letter").is_empty());
}

#[tokio::test]
async fn undecodable_body_is_dead_lettered_without_reaching_the_handler() {
    let h = harness(RedeliveryPolicy::Bounded { max_retries: 1 }, 0).await;
    let garbage = vec![0xff, 0xfe, 0x00];

    h.bus
        .publish(&OutboundMessage::json("OrderCreated", garbage.clone()))
        .await
        .unwrap();

    assert!(
        eventually(WAIT, || h.bus.published("OrderCreated.dead-letter").len() == 1).await
    );
    assert_eq!(h.bus.published("OrderCreated.dead-letter")[0].body, garbage);
    assert_eq!(seen_count(&h.seen), 0);
}

#[tokio::test]
async fn panicking_handler_is_retried_and_the_queue_keeps_flowing() {
    let bus = Arc::new(InMemoryEventBus::new());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let panicked = Arc::new(AtomicUsize::new(0));

    let mut subscriber =
        EventSubscriber::new(bus.clone(), RedeliveryPolicy::Bounded { max_retries: 3 });
    let (handler_seen, handler_panicked) = (Arc::clone(&seen), Arc::clone(&panicked));
    subscriber
        .register::<OrderCreated, _, _>(move || PanicsOnce {
            seen: Arc::clone(&handler_seen),
            panicked: Arc::clone(&handler_panicked),
        })
        .unwrap();
    subscriber.start().await.unwrap();

    let publisher = EventPublisher::new(bus.clone());
    publisher.publish(&order_created(1)).await.unwrap();
    publisher.publish(&order_created(2)).await.unwrap();

    assert!(eventually(WAIT, || seen_count(&seen) == 2).await);
    assert!(eventually(WAIT, || bus.acked("OrderCreated").len() == 3).await);
    assert!(bus.nacked("OrderCreated").is_empty());
    assert!(bus.published("OrderCreated.dead-letter").is_empty());

    let mut retried: Vec<u32> = bus
        .published("OrderCreated")
        .iter()
        .map(|m| m.retry_count)
        .collect();
    retried.sort_unstable();
    assert_eq!(retried, vec![0, 0, 1]);

    let mut ids: Vec<i64> = seen.lock().unwrap().iter().map(|e| e.order_id().value()).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec![1, 2]);

    subscriber.shutdown().await.unwrap();
}

// ============================================================================
// Registry and lifecycle
// ============================================================================

#[tokio::test]
async fn second_handler_for_the_same_event_is_rejected() {
    let mut h = harness(RedeliveryPolicy::default(), 0).await;
    let seen = Arc::clone(&h.seen);

    let result = h.subscriber.register::<OrderCreated, _, _>(move || Recording {
        seen: Arc::clone(&seen),
        failures_left: Arc::new(AtomicUsize::new(0)),
    });

    assert!(matches!(
        result,
        Err(EventBusError::DuplicateRegistration(ref tag)) if tag == "OrderCreated"
    ));
    assert_eq!(h.subscriber.queues().collect::<Vec<_>>(), vec!["OrderCreated"]);
}

#[tokio::test]
async fn shutdown_stops_consuming_and_closes_the_bus() {
    let mut h = harness(RedeliveryPolicy::default(), 0).await;

    h.subscriber.shutdown().await.unwrap();

    assert!(h.bus.is_closed());
    assert!(h.publisher.publish(&order_created(5)).await.is_err());
}
