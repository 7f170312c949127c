//! # Order Service
//!
//! Order intake. Placing an order runs the order side of the saga in
//! [`saga::OrderService::create_order`]: a synchronous stock check through
//! [`stock_client::HttpStockValidationClient`], then the order is stored as
//! `Confirmed` and `OrderCreated` is published for the stock service.
//!
//! The stock service answers asynchronously; [`reactions`] consumes
//! `StockInsufficient` (the order becomes `Rejected`) and `StockReserved`.

pub mod config;
pub mod handlers;
pub mod order;
pub mod reactions;
pub mod router;
pub mod saga;
pub mod stock_client;

pub use config::{Config, StockClientConfig};
pub use handlers::AppState;
pub use order::{Customer, InMemoryOrderStore, Order, OrderStatus, OrderStore};
pub use reactions::{StockInsufficientHandler, StockReservedHandler};
pub use router::order_router;
pub use saga::{OrderError, OrderRequest, OrderService};
pub use stock_client::{HttpStockValidationClient, StockValidator};
