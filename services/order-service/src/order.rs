//! Orders and their store.
//!
//! # Lifecycle
//!
//! ```text
//!  (request) ──validate──► Confirmed ──StockInsufficient──► Rejected
//!                 │
//!                 └── fails: nothing stored
//!
//!  Pending ──cancel──► Cancelled
//! ```
//!
//! Creation writes `Confirmed` directly, so nothing the service stores is
//! ever `Pending` and the cancel transition is unreachable through it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicI64, Ordering};
use stockflow_core::{Money, OrderId, ProductId, StoreError};
use tokio::sync::RwLock;

/// Order status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    /// Accepted but not confirmed
    Pending,
    /// Stock validated and order persisted
    Confirmed,
    /// Stock service could not serve the order
    Rejected,
    /// Withdrawn by its owner
    Cancelled,
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "Pending",
            Self::Confirmed => "Confirmed",
            Self::Rejected => "Rejected",
            Self::Cancelled => "Cancelled",
        };
        f.write_str(name)
    }
}

/// The authenticated caller placing or acting on an order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    /// Opaque user id from the auth layer
    pub user_id: String,
    /// Display name
    pub username: String,
}

/// A stored order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    /// Identity
    pub id: OrderId,
    /// Product ordered
    pub product_id: ProductId,
    /// Units ordered
    pub quantity: i32,
    /// Price per unit
    pub unit_price: Money,
    /// `quantity * unit_price`
    pub total: Money,
    /// Current status
    pub status: OrderStatus,
    /// Who placed it
    pub customer: Customer,
    /// When it was stored
    pub created_at: DateTime<Utc>,
    /// Last status change
    pub updated_at: DateTime<Utc>,
    /// Why it was rejected, if it was
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
}

impl Order {
    /// Whether `customer` placed this order.
    #[must_use]
    pub fn is_owned_by(&self, customer: &Customer) -> bool {
        self.customer.user_id == customer.user_id
    }

    /// Move a `Confirmed` order to `Rejected`.
    ///
    /// Returns `false` and leaves the order alone in any other status, so a
    /// duplicate rejection notice is a no-op.
    pub fn reject(&mut self, reason: impl Into<String>, at: DateTime<Utc>) -> bool {
        if self.status != OrderStatus::Confirmed {
            return false;
        }
        self.status = OrderStatus::Rejected;
        self.rejection_reason = Some(reason.into());
        self.updated_at = at;
        true
    }

    /// Move a `Pending` order to `Cancelled`.
    ///
    /// Returns `false` and leaves the order alone in any other status.
    pub fn cancel(&mut self, at: DateTime<Utc>) -> bool {
        if self.status != OrderStatus::Pending {
            return false;
        }
        self.status = OrderStatus::Cancelled;
        self.updated_at = at;
        true
    }
}

/// An order before the store has assigned its id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewOrder {
    /// Product ordered
    pub product_id: ProductId,
    /// Units ordered
    pub quantity: i32,
    /// Price per unit
    pub unit_price: Money,
    /// `quantity * unit_price`
    pub total: Money,
    /// Initial status
    pub status: OrderStatus,
    /// Who placed it
    pub customer: Customer,
    /// Creation time
    pub placed_at: DateTime<Utc>,
}

type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Persistence for orders.
pub trait OrderStore: Send + Sync {
    /// Look up an order by id.
    fn find(&self, id: OrderId) -> StoreFuture<'_, Option<Order>>;

    /// Insert a new order, assigning its id.
    fn add(&self, order: NewOrder) -> StoreFuture<'_, Order>;

    /// Overwrite an existing order.
    fn save(&self, order: Order) -> StoreFuture<'_, ()>;
}

/// [`OrderStore`] kept in process memory.
#[derive(Debug)]
pub struct InMemoryOrderStore {
    orders: RwLock<BTreeMap<OrderId, Order>>,
    next_id: AtomicI64,
}

impl Default for InMemoryOrderStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryOrderStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            orders: RwLock::new(BTreeMap::new()),
            next_id: AtomicI64::new(1),
        }
    }

    /// Number of stored orders.
    pub async fn len(&self) -> usize {
        self.orders.read().await.len()
    }

    /// Whether no order is stored.
    pub async fn is_empty(&self) -> bool {
        self.orders.read().await.is_empty()
    }
}

impl OrderStore for InMemoryOrderStore {
    fn find(&self, id: OrderId) -> StoreFuture<'_, Option<Order>> {
        Box::pin(async move { Ok(self.orders.read().await.get(&id).cloned()) })
    }

    fn add(&self, new: NewOrder) -> StoreFuture<'_, Order> {
        Box::pin(async move {
            let id = OrderId::new(self.next_id.fetch_add(1, Ordering::SeqCst));
            let order = Order {
                id,
                product_id: new.product_id,
                quantity: new.quantity,
                unit_price: new.unit_price,
                total: new.total,
                status: new.status,
                customer: new.customer,
                created_at: new.placed_at,
                updated_at: new.placed_at,
                rejection_reason: None,
            };
            self.orders.write().await.insert(id, order.clone());
            Ok(order)
        })
    }

    fn save(&self, order: Order) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let mut orders = self.orders.write().await;
            let slot = orders.get_mut(&order.id).ok_or(StoreError::NotFound {
                entity: "Order",
                id: order.id.value(),
            })?;
            *slot = order;
            Ok(())
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, hour, 0, 0).unwrap()
    }

    fn new_order(status: OrderStatus) -> NewOrder {
        NewOrder {
            product_id: ProductId::new(3),
            quantity: 2,
            unit_price: Money::from_cents(500),
            total: Money::from_cents(1000),
            status,
            customer: Customer {
                user_id: "u-1".to_string(),
                username: "ada".to_string(),
            },
            placed_at: at(9),
        }
    }

    #[tokio::test]
    async fn add_assigns_sequential_ids() {
        let store = InMemoryOrderStore::new();
        let first = store.add(new_order(OrderStatus::Confirmed)).await.unwrap();
        let second = store.add(new_order(OrderStatus::Confirmed)).await.unwrap();

        assert_eq!(first.id, OrderId::new(1));
        assert_eq!(second.id, OrderId::new(2));
        assert_eq!(store.len().await, 2);
        assert_eq!(first.created_at, first.updated_at);
    }

    #[tokio::test]
    async fn save_of_unknown_order_fails() {
        let store = InMemoryOrderStore::new();
        let mut order = store.add(new_order(OrderStatus::Confirmed)).await.unwrap();
        order.id = OrderId::new(40);

        assert_eq!(
            store.save(order).await,
            Err(StoreError::NotFound { entity: "Order", id: 40 })
        );
    }

    #[tokio::test]
    async fn confirmed_order_can_be_rejected_once() {
        let store = InMemoryOrderStore::new();
        let mut order = store.add(new_order(OrderStatus::Confirmed)).await.unwrap();

        assert!(order.reject("Insufficient stock", at(10)));
        assert!(!order.reject("again", at(11)));
        assert_eq!(order.status, OrderStatus::Rejected);
        assert_eq!(order.rejection_reason.as_deref(), Some("Insufficient stock"));
        assert_eq!(order.updated_at, at(10));
    }

    #[tokio::test]
    async fn only_pending_orders_cancel() {
        let store = InMemoryOrderStore::new();
        let mut confirmed = store.add(new_order(OrderStatus::Confirmed)).await.unwrap();
        let mut pending = store.add(new_order(OrderStatus::Pending)).await.unwrap();

        assert!(!confirmed.cancel(at(10)));
        assert_eq!(confirmed.status, OrderStatus::Confirmed);
        assert!(pending.cancel(at(10)));
        assert_eq!(pending.status, OrderStatus::Cancelled);
    }

    #[test]
    fn rejection_reason_is_omitted_until_set() {
        let order = Order {
            id: OrderId::new(1),
            product_id: ProductId::new(3),
            quantity: 2,
            unit_price: Money::from_cents(500),
            total: Money::from_cents(1000),
            status: OrderStatus::Confirmed,
            customer: Customer {
                user_id: "u-1".to_string(),
                username: "ada".to_string(),
            },
            created_at: at(9),
            updated_at: at(9),
            rejection_reason: None,
        };
        let json = serde_json::to_value(&order).unwrap();

        assert_eq!(json["status"], "Confirmed");
        assert_eq!(json["unitPrice"], 500);
        assert!(json.get("rejectionReason").is_none());
    }
}
