//! # Stockflow AMQP
//!
//! `RabbitMQ` adapter for the stockflow [`EventBus`](stockflow_core::EventBus).
//!
//! - [`AmqpConnection`]: the process-wide broker connection, opened with
//!   exponential backoff (five attempts, waiting 1s, 2s, 4s, 8s, 16s)
//! - [`AmqpEventBus`]: one channel per publish, one retained channel per
//!   subscription, queues named after event types on the default exchange
//! - [`BrokerConfig`]: environment-driven settings shared by both services
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use stockflow_amqp::{AmqpConnection, AmqpEventBus, BrokerConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = BrokerConfig::from_env()?;
//! let connection = Arc::new(
//!     AmqpConnection::connect_with_policy(&config.url, &config.connect_policy()).await?,
//! );
//! let bus = AmqpEventBus::new(connection, "stock-service");
//! # Ok(())
//! # }
//! ```

pub mod bus;
pub mod config;
pub mod connection;

pub use bus::AmqpEventBus;
pub use config::{BrokerConfig, ConfigError};
pub use connection::{AmqpConnection, connect_with_backoff};
