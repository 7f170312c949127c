//! Product stock records and their store.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicI64, Ordering};
use stockflow_core::{Money, ProductId, StoreError};
use tokio::sync::RwLock;

/// A product and the quantity currently in stock.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    /// Identity
    pub id: ProductId,
    /// Display name
    pub name: String,
    /// Units available. Not guarded against going negative.
    pub quantity: i32,
    /// Unit price
    pub price: Money,
}

/// A product before the store has assigned its id.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProduct {
    /// Display name
    pub name: String,
    /// Initial stock
    pub quantity: i32,
    /// Unit price
    pub price: Money,
}

type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Persistence for products.
pub trait ProductStore: Send + Sync {
    /// Look up a product by id.
    fn find(&self, id: ProductId) -> StoreFuture<'_, Option<Product>>;

    /// Insert a new product, assigning its id.
    fn add(&self, product: NewProduct) -> StoreFuture<'_, Product>;

    /// Overwrite an existing product.
    fn save(&self, product: Product) -> StoreFuture<'_, ()>;
}

/// [`ProductStore`] kept in process memory.
#[derive(Debug)]
pub struct InMemoryProductStore {
    products: RwLock<BTreeMap<ProductId, Product>>,
    next_id: AtomicI64,
}

impl Default for InMemoryProductStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryProductStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            products: RwLock::new(BTreeMap::new()),
            next_id: AtomicI64::new(1),
        }
    }

    /// Create a store seeded with `products`; new ids continue after the
    /// highest seeded one.
    #[must_use]
    pub fn with_products(products: impl IntoIterator<Item = Product>) -> Self {
        let products: BTreeMap<ProductId, Product> =
            products.into_iter().map(|p| (p.id, p)).collect();
        let next_id = products.keys().next_back().map_or(1, |id| id.value() + 1);
        Self {
            products: RwLock::new(products),
            next_id: AtomicI64::new(next_id),
        }
    }
}

impl ProductStore for InMemoryProductStore {
    fn find(&self, id: ProductId) -> StoreFuture<'_, Option<Product>> {
        Box::pin(async move { Ok(self.products.read().await.get(&id).cloned()) })
    }

    fn add(&self, new: NewProduct) -> StoreFuture<'_, Product> {
        Box::pin(async move {
            let id = ProductId::new(self.next_id.fetch_add(1, Ordering::SeqCst));
            let product = Product {
                id,
                name: new.name,
                quantity: new.quantity,
                price: new.price,
            };
            self.products.write().await.insert(id, product.clone());
            Ok(product)
        })
    }

    fn save(&self, product: Product) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let mut products = self.products.write().await;
            let slot = products.get_mut(&product.id).ok_or(StoreError::NotFound {
                entity: "Product",
                id: product.id.value(),
            })?;
            *slot = product;
            Ok(())
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn widget(id: i64, quantity: i32) -> Product {
        Product {
            id: ProductId::new(id),
            name: "Widget".to_string(),
            quantity,
            price: Money::from_cents(250),
        }
    }

    #[tokio::test]
    async fn seeded_ids_are_not_reused() {
        let store = InMemoryProductStore::with_products([widget(7, 1)]);
        let added = store
            .add(NewProduct {
                name: "Gadget".to_string(),
                quantity: 3,
                price: Money::from_cents(100),
            })
            .await
            .unwrap();

        assert_eq!(added.id, ProductId::new(8));
        assert_eq!(store.find(ProductId::new(8)).await.unwrap(), Some(added));
    }

    #[tokio::test]
    async fn save_overwrites_existing_product() {
        let store = InMemoryProductStore::with_products([widget(1, 10)]);
        store.save(widget(1, 6)).await.unwrap();
        assert_eq!(store.find(ProductId::new(1)).await.unwrap().unwrap().quantity, 6);
    }

    #[tokio::test]
    async fn save_of_unknown_product_fails() {
        let store = InMemoryProductStore::new();
        assert_eq!(
            store.save(widget(5, 1)).await,
            Err(StoreError::NotFound { entity: "Product", id: 5 })
        );
    }
}
