//! HTTP tests for the stock API.

#![allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect

use axum::http::StatusCode;
use axum_test::TestServer;
use serde_json::json;
use std::sync::Arc;
use stock_service::handlers::{StockAvailable, StockShortfall};
use stock_service::{AppState, InMemoryProductStore, Product, stock_router};
use stockflow_core::{Money, ProductId};

fn widget(id: i64, quantity: i32) -> Product {
    Product {
        id: ProductId::new(id),
        name: "Widget".to_string(),
        quantity,
        price: Money::from_cents(1999),
    }
}

fn server(products: impl IntoIterator<Item = Product>) -> TestServer {
    let store = Arc::new(InMemoryProductStore::with_products(products));
    TestServer::new(stock_router(AppState::new(store))).unwrap()
}

#[tokio::test]
async fn validate_reports_available_stock() {
    let response = server([widget(3, 10)])
        .post("/Products/validate")
        .json(&json!({ "productId": 3, "quantity": 4 }))
        .await;

    response.assert_status_ok();
    assert_eq!(
        response.json::<StockAvailable>(),
        StockAvailable {
            valid: true,
            available: 10
        }
    );
}

#[tokio::test]
async fn validate_accepts_the_exact_remaining_quantity() {
    let response = server([widget(3, 4)])
        .post("/Products/validate")
        .json(&json!({ "productId": 3, "quantity": 4 }))
        .await;

    response.assert_status_ok();
}

#[tokio::test]
async fn validate_rejects_shortfall_with_details() {
    let response = server([widget(3, 3)])
        .post("/Products/validate")
        .json(&json!({ "productId": 3, "quantity": 5 }))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body = response.json::<StockShortfall>();
    assert_eq!(body.available, 3);
    assert_eq!(body.requested, 5);
    assert!(body.message.contains("Insufficient stock"));
}

#[tokio::test]
async fn validate_unknown_product_is_not_found() {
    let response = server([])
        .post("/Products/validate")
        .json(&json!({ "productId": 99, "quantity": 1 }))
        .await;

    response.assert_status(StatusCode::NOT_FOUND);
    assert_eq!(response.json::<serde_json::Value>()["code"], "NOT_FOUND");
}

#[tokio::test]
async fn validate_rejects_non_positive_quantities() {
    let server = server([widget(3, 10)]);
    for quantity in [0, -5] {
        let response = server
            .post("/Products/validate")
            .json(&json!({ "productId": 3, "quantity": quantity }))
            .await;

        response.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(response.json::<serde_json::Value>()["code"], "BAD_REQUEST");
    }
}

#[tokio::test]
async fn validate_does_not_change_stock() {
    let server = server([widget(3, 10)]);
    for _ in 0..3 {
        server
            .post("/Products/validate")
            .json(&json!({ "productId": 3, "quantity": 4 }))
            .await
            .assert_status_ok();
    }

    let product = server.get("/Products/3").await.json::<Product>();
    assert_eq!(product.quantity, 10);
}

#[tokio::test]
async fn created_product_can_be_fetched() {
    let server = server([]);
    let response = server
        .post("/Products")
        .json(&json!({ "name": "Gadget", "quantity": 7, "price": 500 }))
        .await;

    response.assert_status(StatusCode::CREATED);
    let created = response.json::<Product>();
    assert_eq!(created.quantity, 7);

    let fetched = server
        .get(&format!("/Products/{}", created.id))
        .await
        .json::<Product>();
    assert_eq!(fetched, created);
}

#[tokio::test]
async fn product_with_negative_quantity_is_rejected() {
    let response = server([])
        .post("/Products")
        .json(&json!({ "name": "Gadget", "quantity": -1, "price": 500 }))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_product_is_not_found() {
    server([]).get("/Products/42").await.assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn health_is_served() {
    server([]).get("/health").await.assert_status_ok();
}
