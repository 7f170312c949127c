//! # Stock Service
//!
//! Owns product stock. Two entry points touch it:
//!
//! - `POST /Products/validate` ([`handlers::validate_stock`]): synchronous,
//!   read-only sufficiency check called by order-intake before it persists
//! - the `OrderCreated` queue ([`order_created::OrderCreatedHandler`]):
//!   re-checks and decrements, then publishes `StockReserved` or
//!   `StockInsufficient`
//!
//! Both use the rule in [`stock::check_availability`]. No reservation is
//! held between the two, so the stock seen by the consumer may differ from
//! the stock the validation answered from.

pub mod config;
pub mod handlers;
pub mod order_created;
pub mod product;
pub mod router;
pub mod stock;

pub use config::Config;
pub use handlers::AppState;
pub use order_created::OrderCreatedHandler;
pub use product::{InMemoryProductStore, NewProduct, Product, ProductStore};
pub use router::stock_router;
