//! Stock HTTP router.

use crate::handlers::{self, AppState};
use axum::{
    Router,
    routing::{get, post},
};
use stockflow_web::health::health_router;
use tower_http::trace::TraceLayer;

/// Create the stock router.
///
/// # Routes
///
/// - `POST /Products` - Add a product
/// - `GET /Products/:id` - Get a product with its stock
/// - `POST /Products/validate` - Check stock for a quantity
/// - `GET /health` - Liveness
pub fn stock_router(state: AppState) -> Router {
    Router::new()
        .route("/Products", post(handlers::create_product))
        .route("/Products/validate", post(handlers::validate_stock))
        .route("/Products/:id", get(handlers::get_product))
        .merge(health_router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
