//! HTTP plumbing shared by the stockflow services.
//!
//! - [`AppError`]: maps failures to a status code and a JSON `{code, message}` body
//! - [`CallerIdentity`]: the authenticated caller, as forwarded by the
//!   upstream gateway in the `X-User-Id` / `X-User-Name` headers
//! - [`health`]: liveness route
//! - [`shutdown_signal`]: resolves on Ctrl+C or SIGTERM, for graceful shutdown
//!
//! # Example
//!
//! ```ignore
//! use stockflow_web::{AppError, CallerIdentity};
//!
//! async fn place_order(
//!     caller: CallerIdentity,
//!     Json(request): Json<CreateOrderRequest>,
//! ) -> Result<Json<OrderResponse>, AppError> {
//!     let order = service.create_order(caller.into(), request.into()).await?;
//!     Ok(Json(order.into()))
//! }
//! ```

pub mod error;
pub mod extractors;
pub mod health;
pub mod shutdown;

pub use error::AppError;
pub use extractors::CallerIdentity;
pub use shutdown::shutdown_signal;
