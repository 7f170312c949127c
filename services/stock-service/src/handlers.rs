//! HTTP handlers for the stock API.

use crate::product::{NewProduct, Product, ProductStore};
use crate::stock::{Availability, check_availability};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use stockflow_core::{ProductId, StoreError};
use stockflow_web::AppError;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    /// Product records
    pub products: Arc<dyn ProductStore>,
}

impl AppState {
    /// Create state over `products`.
    #[must_use]
    pub fn new(products: Arc<dyn ProductStore>) -> Self {
        Self { products }
    }
}

/// Body of `POST /Products/validate`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateStockRequest {
    /// Product to check
    pub product_id: i64,
    /// Units wanted
    pub quantity: i32,
}

/// 200 body: enough stock.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StockAvailable {
    /// Always `true`
    pub valid: bool,
    /// Units in stock
    pub available: i32,
}

/// 400 body: not enough stock.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StockShortfall {
    /// Human-readable reason
    pub message: String,
    /// Units in stock
    pub available: i32,
    /// Units asked for
    pub requested: i32,
}

fn store_unavailable(error: StoreError) -> AppError {
    AppError::unavailable("Product store unavailable").with_source(error)
}

/// Check whether a quantity of a product is in stock.
///
/// # Endpoint
///
/// ```text
/// POST /Products/validate
/// Content-Type: application/json
///
/// { "productId": 3, "quantity": 4 }
/// ```
///
/// # Responses
///
/// - 200 `{"valid": true, "available": 10}`
/// - 400 `{"message": "...", "available": 3, "requested": 5}`
/// - 400 `{"code": "BAD_REQUEST", ...}` for a zero or negative quantity
/// - 404 unknown product
pub async fn validate_stock(
    State(state): State<AppState>,
    Json(request): Json<ValidateStockRequest>,
) -> Result<Response, AppError> {
    let product_id = ProductId::new(request.product_id);
    let product = state
        .products
        .find(product_id)
        .await
        .map_err(store_unavailable)?;

    match check_availability(product.as_ref(), request.quantity) {
        Availability::Sufficient { available } => Ok((
            StatusCode::OK,
            Json(StockAvailable {
                valid: true,
                available,
            }),
        )
            .into_response()),
        Availability::Insufficient {
            available,
            requested,
        } => {
            tracing::info!(%product_id, available, requested, "Stock validation failed");
            Ok((
                StatusCode::BAD_REQUEST,
                Json(StockShortfall {
                    message: format!("Insufficient stock for product {product_id}"),
                    available,
                    requested,
                }),
            )
                .into_response())
        }
        Availability::InvalidQuantity { .. } => {
            Err(AppError::bad_request("Quantity must be positive"))
        }
        Availability::UnknownProduct => Err(AppError::not_found("Product", product_id)),
    }
}

/// `GET /Products/:id`
pub async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Product>, AppError> {
    state
        .products
        .find(ProductId::new(id))
        .await
        .map_err(store_unavailable)?
        .map(Json)
        .ok_or_else(|| AppError::not_found("Product", id))
}

/// `POST /Products`: add a product with its initial stock.
pub async fn create_product(
    State(state): State<AppState>,
    Json(request): Json<NewProduct>,
) -> Result<(StatusCode, Json<Product>), AppError> {
    if request.name.trim().is_empty() {
        return Err(AppError::bad_request("Product name is required"));
    }
    if request.quantity < 0 || request.price.is_negative() {
        return Err(AppError::bad_request("Quantity and price must not be negative"));
    }

    let product = state.products.add(request).await.map_err(store_unavailable)?;
    tracing::info!(product_id = %product.id, quantity = product.quantity, "Product created");
    Ok((StatusCode::CREATED, Json(product)))
}
