//! Typed event publisher.

use std::sync::Arc;
use stockflow_core::{EventBus, EventBusError, IntegrationEvent, OutboundMessage};

/// Publishes integration events to the queue named after their type tag.
///
/// Cheap to clone; every clone shares the same bus.
#[derive(Clone)]
pub struct EventPublisher {
    bus: Arc<dyn EventBus>,
}

impl std::fmt::Debug for EventPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventPublisher").finish_non_exhaustive()
    }
}

impl EventPublisher {
    /// Create a publisher over `bus`.
    #[must_use]
    pub fn new(bus: Arc<dyn EventBus>) -> Self {
        Self { bus }
    }

    /// Encode `event` as JSON and publish it to the `E::EVENT_TYPE` queue.
    ///
    /// Returns once the broker has accepted the message. There is no
    /// transactional link to any local write the caller made before.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::PublishFailed`] if encoding fails or the
    /// broker rejects the message.
    pub async fn publish<E: IntegrationEvent>(&self, event: &E) -> Result<(), EventBusError> {
        let body = event.to_json().map_err(|e| EventBusError::PublishFailed {
            queue: E::EVENT_TYPE.to_string(),
            reason: e.to_string(),
        })?;

        self.bus
            .publish(&OutboundMessage::json(E::EVENT_TYPE, body))
            .await?;

        metrics::counter!("stockflow_events_published_total", "event_type" => E::EVENT_TYPE)
            .increment(1);
        tracing::debug!(
            event_type = E::EVENT_TYPE,
            event_id = %event.event_id(),
            "Published integration event"
        );
        Ok(())
    }
}
