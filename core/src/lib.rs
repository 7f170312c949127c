//! # Stockflow Core
//!
//! Shared contract between the order-intake service and the stock service.
//!
//! Nothing in this crate performs I/O. It defines:
//!
//! - **Integration events** ([`event`]): immutable facts published on the broker,
//!   self-describing by their [`IntegrationEvent::EVENT_TYPE`] tag
//! - **Event bus seam** ([`event_bus`]): the [`EventBus`] and [`Delivery`] traits
//!   implemented by the AMQP adapter and the in-memory test broker
//! - **Handlers** ([`handler`]): the [`EventHandler`] trait subscribers implement
//! - **Domain identifiers** ([`types`]): product/order ids and money
//! - **Store errors** ([`store`]): failure vocabulary of the service-local stores
//! - **Environment** ([`environment`]): injected clock
//!
//! ## Data flow
//!
//! ```text
//! client ─► order-intake ──(POST /Products/validate)──► stock
//!              │
//!              ├─ persist order (Confirmed)
//!              │
//!              └─ publish OrderCreated ─► [queue "OrderCreated"] ─► stock handler
//!                                                                     │
//!                      order-intake ◄─ StockReserved / StockInsufficient
//! ```

pub mod environment;
pub mod event;
pub mod event_bus;
pub mod handler;
pub mod store;
pub mod types;

pub use event::{
    EventError, EventMetadata, IntegrationEvent, OrderCreated, StockInsufficient, StockReserved,
};
pub use event_bus::{
    Delivery, DeliveryStream, EventBus, EventBusError, OutboundMessage, QueueTopology,
};
pub use handler::{EventHandler, HandlerError};
pub use store::StoreError;
pub use types::{Money, OrderId, ProductId};
