//! Handlers for the stock service's answers to `OrderCreated`.

use crate::order::OrderStore;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use stockflow_core::environment::Clock;
use stockflow_core::{EventHandler, HandlerError, StockInsufficient, StockReserved};

/// Marks a `Confirmed` order `Rejected` when the stock service could not
/// serve it.
///
/// Orders in any other status are left alone, so a redelivered notice is
/// harmless. A notice for an unknown order is logged and acked.
#[derive(Clone)]
pub struct StockInsufficientHandler {
    orders: Arc<dyn OrderStore>,
    clock: Arc<dyn Clock>,
}

impl StockInsufficientHandler {
    /// Create a handler.
    #[must_use]
    pub fn new(orders: Arc<dyn OrderStore>, clock: Arc<dyn Clock>) -> Self {
        Self { orders, clock }
    }

    async fn process(&self, event: StockInsufficient) -> Result<(), HandlerError> {
        let order_id = event.order_id();
        let Some(mut order) = self
            .orders
            .find(order_id)
            .await
            .map_err(|e| HandlerError::with_source("Failed to load order", e))?
        else {
            tracing::error!(%order_id, "StockInsufficient for unknown order, dropping message");
            return Ok(());
        };

        if !order.reject(event.reason(), self.clock.now()) {
            tracing::debug!(
                %order_id,
                status = %order.status,
                "Order not Confirmed, rejection ignored"
            );
            return Ok(());
        }

        self.orders
            .save(order)
            .await
            .map_err(|e| HandlerError::with_source("Failed to save rejected order", e))?;
        tracing::warn!(
            %order_id,
            product_id = %event.product_id(),
            requested = event.requested_quantity(),
            available = event.available_quantity(),
            reason = event.reason(),
            "Order rejected by stock service"
        );
        Ok(())
    }
}

impl EventHandler<StockInsufficient> for StockInsufficientHandler {
    fn handle(
        &self,
        event: StockInsufficient,
    ) -> Pin<Box<dyn Future<Output = Result<(), HandlerError>> + Send + '_>> {
        Box::pin(self.process(event))
    }
}

/// Logs stock confirmations. The order is already `Confirmed`.
#[derive(Clone, Copy, Debug, Default)]
pub struct StockReservedHandler;

impl EventHandler<StockReserved> for StockReservedHandler {
    fn handle(
        &self,
        event: StockReserved,
    ) -> Pin<Box<dyn Future<Output = Result<(), HandlerError>> + Send + '_>> {
        tracing::info!(
            order_id = %event.order_id(),
            product_id = %event.product_id(),
            quantity = event.quantity_reserved(),
            "Stock reserved for order"
        );
        Box::pin(async { Ok(()) })
    }
}
