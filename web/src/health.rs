//! Liveness endpoint.

use axum::{Router, http::StatusCode, routing::get};

/// `GET /health`: 200 while the process is serving requests. Dependencies
/// (broker, stock service) are not checked.
#[allow(clippy::unused_async)]
pub async fn health_check() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

/// Router exposing [`health_check`] at `/health`.
pub fn health_router<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new().route("/health", get(health_check))
}
