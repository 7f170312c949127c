//! Order HTTP router.

use crate::handlers::{self, AppState};
use axum::{
    Router,
    routing::{get, post},
};
use stockflow_web::health::health_router;
use tower_http::trace::TraceLayer;

/// Create the order router.
///
/// # Routes
///
/// - `POST /orders` - Place an order
/// - `GET /orders/:id` - Get an order
/// - `POST /orders/:id/cancel` - Cancel a pending order
/// - `GET /health` - Liveness
pub fn order_router(state: AppState) -> Router {
    Router::new()
        .route("/orders", post(handlers::create_order))
        .route("/orders/:id", get(handlers::get_order))
        .route("/orders/:id/cancel", post(handlers::cancel_order))
        .merge(health_router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
