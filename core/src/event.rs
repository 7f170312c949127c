//! Integration events exchanged between the order-intake and stock services.
//!
//! An integration event is an immutable fact that already happened, published
//! for another service to react to. Every event carries an [`EventMetadata`]
//! (unique id + UTC timestamp assigned at construction) next to its payload.
//!
//! # Wire format
//!
//! Events travel as UTF-8 JSON with camelCase field names. The metadata is
//! flattened into the payload object:
//!
//! ```json
//! {
//!   "eventId": "6f1c0c1e-4f7e-4b8e-9a39-1d2c3b4a5f60",
//!   "occurredAt": "2025-01-01T00:00:00Z",
//!   "orderId": 17,
//!   "productId": 3,
//!   "quantity": 4,
//!   "unitPrice": 1999
//! }
//! ```
//!
//! # Type tag
//!
//! [`IntegrationEvent::EVENT_TYPE`] is the single source of truth for both the
//! queue an event is published to and the type a subscriber decodes into. The
//! tag is a compile-time constant, so publisher and subscriber cannot disagree
//! on it as long as they share this crate.

use crate::types::{Money, OrderId, ProductId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Error types for event encoding.
#[derive(Error, Debug)]
pub enum EventError {
    /// Failed to serialize event to JSON.
    #[error("Failed to serialize event: {0}")]
    SerializationError(String),

    /// Body was not valid UTF-8 text.
    #[error("Event body is not valid UTF-8: {0}")]
    InvalidEncoding(String),

    /// Failed to deserialize event from JSON.
    #[error("Failed to deserialize event: {0}")]
    DeserializationError(String),
}

/// Identity and creation time shared by every integration event.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventMetadata {
    event_id: Uuid,
    occurred_at: DateTime<Utc>,
}

impl EventMetadata {
    /// Fresh metadata with a new random id.
    #[must_use]
    pub fn at(occurred_at: DateTime<Utc>) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            occurred_at,
        }
    }

    /// Globally unique event id.
    #[must_use]
    pub const fn event_id(&self) -> Uuid {
        self.event_id
    }

    /// Creation timestamp (UTC).
    #[must_use]
    pub const fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }
}

/// An event published across the service boundary.
///
/// Implementors are plain data with private fields: once constructed an
/// event cannot be modified, only read and (de)serialized.
pub trait IntegrationEvent:
    Serialize + DeserializeOwned + Clone + fmt::Debug + Send + Sync + 'static
{
    /// Stable type tag. Used verbatim as the queue name on the broker.
    const EVENT_TYPE: &'static str;

    /// Identity and timestamp of this event.
    fn metadata(&self) -> &EventMetadata;

    /// Shortcut for `metadata().event_id()`.
    fn event_id(&self) -> Uuid {
        self.metadata().event_id()
    }

    /// Encode as a UTF-8 JSON body.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::SerializationError`] if serde rejects the value.
    fn to_json(&self) -> Result<Vec<u8>, EventError> {
        serde_json::to_vec(self).map_err(|e| EventError::SerializationError(e.to_string()))
    }

    /// Decode a message body: UTF-8 text first, then JSON into `Self`.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::InvalidEncoding`] for non-UTF-8 bodies and
    /// [`EventError::DeserializationError`] when the JSON does not match.
    fn from_json(body: &[u8]) -> Result<Self, EventError> {
        let text =
            std::str::from_utf8(body).map_err(|e| EventError::InvalidEncoding(e.to_string()))?;
        serde_json::from_str(text).map_err(|e| EventError::DeserializationError(e.to_string()))
    }
}

/// Published by order-intake after an order is durably persisted as `Confirmed`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCreated {
    #[serde(flatten)]
    metadata: EventMetadata,
    order_id: OrderId,
    product_id: ProductId,
    quantity: i32,
    unit_price: Money,
}

impl OrderCreated {
    /// Create the event for a persisted order.
    #[must_use]
    pub fn new(
        order_id: OrderId,
        product_id: ProductId,
        quantity: i32,
        unit_price: Money,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            metadata: EventMetadata::at(occurred_at),
            order_id,
            product_id,
            quantity,
            unit_price,
        }
    }

    /// Order the stock should be taken for.
    #[must_use]
    pub const fn order_id(&self) -> OrderId {
        self.order_id
    }

    /// Product to decrement.
    #[must_use]
    pub const fn product_id(&self) -> ProductId {
        self.product_id
    }

    /// Units ordered.
    #[must_use]
    pub const fn quantity(&self) -> i32 {
        self.quantity
    }

    /// Price per unit at order time.
    #[must_use]
    pub const fn unit_price(&self) -> Money {
        self.unit_price
    }
}

impl IntegrationEvent for OrderCreated {
    const EVENT_TYPE: &'static str = "OrderCreated";

    fn metadata(&self) -> &EventMetadata {
        &self.metadata
    }
}

/// Published by the stock service once an order's quantity was decremented.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockReserved {
    #[serde(flatten)]
    metadata: EventMetadata,
    order_id: OrderId,
    product_id: ProductId,
    quantity_reserved: i32,
}

impl StockReserved {
    /// Create the confirmation for a processed order.
    #[must_use]
    pub fn new(
        order_id: OrderId,
        product_id: ProductId,
        quantity_reserved: i32,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            metadata: EventMetadata::at(occurred_at),
            order_id,
            product_id,
            quantity_reserved,
        }
    }

    /// Order that was served.
    #[must_use]
    pub const fn order_id(&self) -> OrderId {
        self.order_id
    }

    /// Product that was decremented.
    #[must_use]
    pub const fn product_id(&self) -> ProductId {
        self.product_id
    }

    /// Units taken from stock.
    #[must_use]
    pub const fn quantity_reserved(&self) -> i32 {
        self.quantity_reserved
    }
}

impl IntegrationEvent for StockReserved {
    const EVENT_TYPE: &'static str = "StockReserved";

    fn metadata(&self) -> &EventMetadata {
        &self.metadata
    }
}

/// Published by the stock service when an order could not be served.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockInsufficient {
    #[serde(flatten)]
    metadata: EventMetadata,
    order_id: OrderId,
    product_id: ProductId,
    requested_quantity: i32,
    available_quantity: i32,
    reason: String,
}

impl StockInsufficient {
    /// Create the rejection notice for an order.
    #[must_use]
    pub fn new(
        order_id: OrderId,
        product_id: ProductId,
        requested_quantity: i32,
        available_quantity: i32,
        reason: impl Into<String>,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            metadata: EventMetadata::at(occurred_at),
            order_id,
            product_id,
            requested_quantity,
            available_quantity,
            reason: reason.into(),
        }
    }

    /// Order that could not be served.
    #[must_use]
    pub const fn order_id(&self) -> OrderId {
        self.order_id
    }

    /// Product that was short.
    #[must_use]
    pub const fn product_id(&self) -> ProductId {
        self.product_id
    }

    /// Units the order asked for.
    #[must_use]
    pub const fn requested_quantity(&self) -> i32 {
        self.requested_quantity
    }

    /// Units on hand when the event was processed.
    #[must_use]
    pub const fn available_quantity(&self) -> i32 {
        self.available_quantity
    }

    /// Human-readable explanation.
    #[must_use]
    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl IntegrationEvent for StockInsufficient {
    const EVENT_TYPE: &'static str = "StockInsufficient";

    fn metadata(&self) -> &EventMetadata {
        &self.metadata
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
    }

    fn order_created() -> OrderCreated {
        OrderCreated::new(
            OrderId::new(17),
            ProductId::new(3),
            4,
            Money::from_cents(1999),
            fixed_time(),
        )
    }

    #[test]
    fn event_types_are_distinct_queue_names() {
        let tags = [
            OrderCreated::EVENT_TYPE,
            StockReserved::EVENT_TYPE,
            StockInsufficient::EVENT_TYPE,
        ];
        assert_eq!(tags, ["OrderCreated", "StockReserved", "StockInsufficient"]);
    }

    #[test]
    fn wire_format_is_flat_camel_case_json() {
        let event = order_created();
        let value: serde_json::Value =
            serde_json::from_slice(&event.to_json().unwrap()).unwrap();

        assert_eq!(value["eventId"], event.event_id().to_string());
        assert_eq!(value["occurredAt"], "2025-01-01T00:00:00Z");
        assert_eq!(value["orderId"], 17);
        assert_eq!(value["productId"], 3);
        assert_eq!(value["quantity"], 4);
        assert_eq!(value["unitPrice"], 1999);
    }

    #[test]
    fn decoding_preserves_identity_and_payload() {
        let event = order_created();
        let decoded = OrderCreated::from_json(&event.to_json().unwrap()).unwrap();
        assert_eq!(decoded, event);
        assert_eq!(decoded.metadata().occurred_at(), fixed_time());
    }

    #[test]
    fn each_event_gets_its_own_id() {
        assert_ne!(order_created().event_id(), order_created().event_id());
    }

    #[test]
    fn non_utf8_body_is_an_encoding_error() {
        let result = OrderCreated::from_json(&[0xff, 0xfe, 0x00]);
        assert!(matches!(result, Err(EventError::InvalidEncoding(_))));
    }

    #[test]
    fn mismatched_json_is_a_deserialization_error() {
        let body = StockReserved::new(OrderId::new(1), ProductId::new(2), 3, fixed_time())
            .to_json()
            .unwrap();
        let result = StockInsufficient::from_json(&body);
        assert!(matches!(result, Err(EventError::DeserializationError(_))));
    }
}
