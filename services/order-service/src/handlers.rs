//! HTTP handlers for the order API.

use crate::order::{Customer, Order};
use crate::saga::{OrderError, OrderRequest, OrderService};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use stockflow_core::{Money, OrderId, ProductId};
use stockflow_web::{AppError, CallerIdentity};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    /// Order operations
    pub service: Arc<OrderService>,
}

impl AppState {
    /// Create state over `service`.
    #[must_use]
    pub fn new(service: Arc<OrderService>) -> Self {
        Self { service }
    }
}

/// Body of `POST /orders`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    /// Product to order
    pub product_id: i64,
    /// Units wanted
    pub quantity: i32,
    /// Price per unit, in cents
    pub unit_price: i64,
}

impl From<CreateOrderRequest> for OrderRequest {
    fn from(request: CreateOrderRequest) -> Self {
        Self {
            product_id: ProductId::new(request.product_id),
            quantity: request.quantity,
            unit_price: Money::from_cents(request.unit_price),
        }
    }
}

impl From<CallerIdentity> for Customer {
    fn from(caller: CallerIdentity) -> Self {
        Self {
            user_id: caller.user_id,
            username: caller.username,
        }
    }
}

impl From<OrderError> for AppError {
    fn from(error: OrderError) -> Self {
        match error {
            OrderError::StockUnavailable { .. } => {
                Self::rejected("INSUFFICIENT_STOCK", error.to_string())
            }
            OrderError::Invalid(message) => Self::bad_request(message),
            OrderError::NotFound(id) => Self::not_found("Order", id),
            OrderError::NotOwner(_) => Self::forbidden(error.to_string()),
            OrderError::NotCancellable { .. } => Self::conflict(error.to_string()),
            OrderError::Store(store) if store.is_transient() => {
                Self::unavailable("Order store unavailable").with_source(store)
            }
            OrderError::Store(store) => Self::internal("Order store failure").with_source(store),
        }
    }
}

/// Place an order.
///
/// # Endpoint
///
/// ```text
/// POST /orders
/// X-User-Id: u-42
/// Content-Type: application/json
///
/// { "productId": 3, "quantity": 4, "unitPrice": 1999 }
/// ```
///
/// # Responses
///
/// - 201 the stored order, status `Confirmed`
/// - 400 `{"code": "INSUFFICIENT_STOCK", ...}` when stock was not confirmed
/// - 401 without `X-User-Id`
pub async fn create_order(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Json(request): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<Order>), AppError> {
    let order = state
        .service
        .create_order(caller.into(), request.into())
        .await?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// `GET /orders/:id`
pub async fn get_order(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<i64>,
) -> Result<Json<Order>, AppError> {
    let order = state
        .service
        .get_order(&caller.into(), OrderId::new(id))
        .await?;
    Ok(Json(order))
}

/// `POST /orders/:id/cancel`: 409 unless the order is `Pending`.
pub async fn cancel_order(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<i64>,
) -> Result<Json<Order>, AppError> {
    let order = state
        .service
        .cancel_order(&caller.into(), OrderId::new(id))
        .await?;
    Ok(Json(order))
}
