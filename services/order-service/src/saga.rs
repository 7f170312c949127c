//! Order side of the order-stock saga.
//!
//! ```text
//! create_order
//!   1. validate stock over HTTP ── false ──► OrderError::StockUnavailable
//!   2. persist as Confirmed            (durability point)
//!   3. publish OrderCreated            (failure logged, order stays Confirmed)
//! ```
//!
//! Persisting strictly precedes publishing, so a stored order whose event
//! never reached the broker is possible; it is logged and not retried.

use crate::order::{Customer, NewOrder, Order, OrderStatus, OrderStore};
use crate::stock_client::StockValidator;
use std::sync::Arc;
use stockflow_core::environment::Clock;
use stockflow_core::{Money, OrderCreated, OrderId, ProductId, StoreError};
use stockflow_runtime::EventPublisher;
use thiserror::Error;

/// What a customer asks to order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderRequest {
    /// Product to order
    pub product_id: ProductId,
    /// Units wanted
    pub quantity: i32,
    /// Price per unit
    pub unit_price: Money,
}

/// Order operation errors.
#[derive(Error, Debug)]
pub enum OrderError {
    /// Stock validation did not confirm the stock
    #[error("Insufficient stock for product {product_id}")]
    StockUnavailable {
        /// Product that was checked
        product_id: ProductId,
        /// Units asked for
        quantity: i32,
    },

    /// Malformed request
    #[error("Invalid order: {0}")]
    Invalid(String),

    /// No such order
    #[error("Order {0} not found")]
    NotFound(OrderId),

    /// Caller does not own the order
    #[error("Order {0} belongs to another customer")]
    NotOwner(OrderId),

    /// Status does not allow cancellation
    #[error("Order {id} is {status}; only pending orders can be cancelled")]
    NotCancellable {
        /// Order id
        id: OrderId,
        /// Current status
        status: OrderStatus,
    },

    /// Order store failure
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Order intake: validation, persistence and the `OrderCreated` hand-off.
#[derive(Clone)]
pub struct OrderService {
    orders: Arc<dyn OrderStore>,
    stock: Arc<dyn StockValidator>,
    publisher: EventPublisher,
    clock: Arc<dyn Clock>,
}

impl OrderService {
    /// Create the service.
    #[must_use]
    pub fn new(
        orders: Arc<dyn OrderStore>,
        stock: Arc<dyn StockValidator>,
        publisher: EventPublisher,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            orders,
            stock,
            publisher,
            clock,
        }
    }

    /// Place an order.
    ///
    /// # Errors
    ///
    /// - [`OrderError::Invalid`] for a non-positive quantity, a negative
    ///   price or a total that overflows
    /// - [`OrderError::StockUnavailable`] when validation does not confirm
    ///   the stock; nothing is stored or published
    /// - [`OrderError::Store`] if the order cannot be persisted
    ///
    /// A failure to publish `OrderCreated` is not an error: the order is
    /// already stored and is returned as `Confirmed`.
    pub async fn create_order(
        &self,
        customer: Customer,
        request: OrderRequest,
    ) -> Result<Order, OrderError> {
        if request.quantity <= 0 {
            return Err(OrderError::Invalid("Quantity must be positive".to_string()));
        }
        if request.unit_price.is_negative() {
            return Err(OrderError::Invalid("Unit price must not be negative".to_string()));
        }
        let total = request
            .unit_price
            .checked_times(request.quantity)
            .ok_or_else(|| OrderError::Invalid("Order total is too large".to_string()))?;

        if !self
            .stock
            .validate_stock(request.product_id, request.quantity)
            .await
        {
            tracing::info!(
                product_id = %request.product_id,
                quantity = request.quantity,
                user_id = %customer.user_id,
                "Order rejected by stock validation"
            );
            return Err(OrderError::StockUnavailable {
                product_id: request.product_id,
                quantity: request.quantity,
            });
        }

        let order = self
            .orders
            .add(NewOrder {
                product_id: request.product_id,
                quantity: request.quantity,
                unit_price: request.unit_price,
                total,
                status: OrderStatus::Confirmed,
                customer,
                placed_at: self.clock.now(),
            })
            .await?;
        tracing::info!(
            order_id = %order.id,
            product_id = %order.product_id,
            quantity = order.quantity,
            total = %order.total,
            "Order confirmed"
        );

        let event = OrderCreated::new(
            order.id,
            order.product_id,
            order.quantity,
            order.unit_price,
            self.clock.now(),
        );
        if let Err(error) = self.publisher.publish(&event).await {
            tracing::error!(
                order_id = %order.id,
                %error,
                "Failed to publish OrderCreated; order stays Confirmed without a stock update"
            );
        }

        Ok(order)
    }

    /// Fetch an order owned by `customer`.
    ///
    /// # Errors
    ///
    /// [`OrderError::NotFound`], [`OrderError::NotOwner`] or
    /// [`OrderError::Store`].
    pub async fn get_order(&self, customer: &Customer, id: OrderId) -> Result<Order, OrderError> {
        let order = self.orders.find(id).await?.ok_or(OrderError::NotFound(id))?;
        if !order.is_owned_by(customer) {
            return Err(OrderError::NotOwner(id));
        }
        Ok(order)
    }

    /// Cancel a pending order owned by `customer`.
    ///
    /// # Errors
    ///
    /// - [`OrderError::NotFound`] / [`OrderError::NotOwner`]
    /// - [`OrderError::NotCancellable`] unless the order is `Pending`
    /// - [`OrderError::Store`]
    pub async fn cancel_order(
        &self,
        customer: &Customer,
        id: OrderId,
    ) -> Result<Order, OrderError> {
        let mut order = self.get_order(customer, id).await?;
        if !order.cancel(self.clock.now()) {
            return Err(OrderError::NotCancellable {
                id,
                status: order.status,
            });
        }
        self.orders.save(order.clone()).await?;
        tracing::info!(order_id = %id, "Order cancelled");
        Ok(order)
    }
}
