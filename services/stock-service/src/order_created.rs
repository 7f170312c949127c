//! Consumer of `OrderCreated`: takes the ordered units out of stock.
//!
//! Per delivery:
//!
//! 1. quantity zero or negative: log, publish `StockInsufficient`, ack
//! 2. product missing: log, publish `StockInsufficient`, ack
//! 3. stock below the ordered quantity: log, publish `StockInsufficient`, ack
//! 4. otherwise decrement, save, publish `StockReserved`, ack
//!
//! Cases 1 to 3 are not failures: redelivering the message cannot change
//! them. Only a store or broker error fails the handler, which sends the
//! message back for redelivery.
//!
//! The re-check and the decrement are not atomic across deliveries. Two
//! orders for the same product handled concurrently can both pass the check
//! and both decrement.

use crate::product::ProductStore;
use crate::stock::{Availability, check_availability};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use stockflow_core::environment::Clock;
use stockflow_core::{
    EventHandler, HandlerError, IntegrationEvent, OrderCreated, StockInsufficient, StockReserved,
};
use stockflow_runtime::EventPublisher;

/// Handler for [`OrderCreated`].
#[derive(Clone)]
pub struct OrderCreatedHandler {
    products: Arc<dyn ProductStore>,
    publisher: EventPublisher,
    clock: Arc<dyn Clock>,
}

impl OrderCreatedHandler {
    /// Create a handler.
    #[must_use]
    pub fn new(
        products: Arc<dyn ProductStore>,
        publisher: EventPublisher,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            products,
            publisher,
            clock,
        }
    }

    async fn process(&self, event: OrderCreated) -> Result<(), HandlerError> {
        let product = self
            .products
            .find(event.product_id())
            .await
            .map_err(|e| HandlerError::with_source("Failed to load product", e))?;

        match check_availability(product.as_ref(), event.quantity()) {
            Availability::InvalidQuantity { requested } => {
                let available = product.as_ref().map_or(0, |p| p.quantity);
                tracing::error!(
                    order_id = %event.order_id(),
                    product_id = %event.product_id(),
                    requested,
                    "Created order has a non-positive quantity, dropping message"
                );
                self.reject(&event, available, "Invalid quantity").await
            }
            Availability::UnknownProduct => {
                tracing::error!(
                    order_id = %event.order_id(),
                    product_id = %event.product_id(),
                    "Product not found for created order, dropping message"
                );
                self.reject(&event, 0, "Product not found").await
            }
            Availability::Insufficient {
                available,
                requested,
            } => {
                tracing::error!(
                    order_id = %event.order_id(),
                    product_id = %event.product_id(),
                    available,
                    requested,
                    "Insufficient stock for created order, dropping message"
                );
                self.reject(&event, available, "Insufficient stock").await
            }
            Availability::Sufficient { available } => {
                let Some(mut product) = product else {
                    return Err(HandlerError::new("Product vanished during stock check"));
                };
                let Some(remaining) = available.checked_sub(event.quantity()) else {
                    tracing::error!(
                        order_id = %event.order_id(),
                        available,
                        requested = event.quantity(),
                        "Stock decrement out of range, dropping message"
                    );
                    return self.reject(&event, available, "Invalid quantity").await;
                };
                product.quantity = remaining;
                self.products
                    .save(product)
                    .await
                    .map_err(|e| HandlerError::with_source("Failed to save stock", e))?;

                tracing::info!(
                    order_id = %event.order_id(),
                    product_id = %event.product_id(),
                    quantity = event.quantity(),
                    remaining,
                    "Stock decremented"
                );

                let reserved = StockReserved::new(
                    event.order_id(),
                    event.product_id(),
                    event.quantity(),
                    self.clock.now(),
                );
                self.notify(&reserved).await
            }
        }
    }

    async fn reject(
        &self,
        event: &OrderCreated,
        available: i32,
        reason: &str,
    ) -> Result<(), HandlerError> {
        let insufficient = StockInsufficient::new(
            event.order_id(),
            event.product_id(),
            event.quantity(),
            available,
            reason,
            self.clock.now(),
        );
        self.notify(&insufficient).await
    }

    /// Publish the outcome. A failure here is logged, not retried: the stock
    /// change is already saved and redelivering `OrderCreated` would repeat it.
    async fn notify<E: IntegrationEvent>(&self, outcome: &E) -> Result<(), HandlerError> {
        if let Err(error) = self.publisher.publish(outcome).await {
            tracing::error!(event_type = E::EVENT_TYPE, %error, "Failed to publish stock outcome");
        }
        Ok(())
    }
}

impl EventHandler<OrderCreated> for OrderCreatedHandler {
    fn handle(
        &self,
        event: OrderCreated,
    ) -> Pin<Box<dyn Future<Output = Result<(), HandlerError>> + Send + '_>> {
        Box::pin(self.process(event))
    }
}
