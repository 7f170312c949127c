//! The stock sufficiency rule.
//!
//! The same rule answers the synchronous validation request and the
//! asynchronous re-check when `OrderCreated` is consumed. The two evaluations
//! happen at different times against whatever the store holds then; nothing
//! is held in between.

use crate::product::Product;

/// Result of checking a request against a product's stock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    /// `available >= requested`
    Sufficient {
        /// Units in stock
        available: i32,
    },
    /// `available < requested`
    Insufficient {
        /// Units in stock
        available: i32,
        /// Units asked for
        requested: i32,
    },
    /// Zero or negative units asked for
    InvalidQuantity {
        /// Units asked for
        requested: i32,
    },
    /// No such product
    UnknownProduct,
}

impl Availability {
    /// Whether the request can be served.
    #[must_use]
    pub const fn is_sufficient(self) -> bool {
        matches!(self, Self::Sufficient { .. })
    }
}

/// Check `requested` units against `product`.
///
/// A non-positive `requested` is never served, whether or not the product
/// exists.
#[must_use]
pub fn check_availability(product: Option<&Product>, requested: i32) -> Availability {
    if requested <= 0 {
        return Availability::InvalidQuantity { requested };
    }
    match product {
        None => Availability::UnknownProduct,
        Some(product) if product.quantity >= requested => Availability::Sufficient {
            available: product.quantity,
        },
        Some(product) => Availability::Insufficient {
            available: product.quantity,
            requested,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockflow_core::{Money, ProductId};

    fn product(quantity: i32) -> Product {
        Product {
            id: ProductId::new(1),
            name: "Widget".to_string(),
            quantity,
            price: Money::from_cents(100),
        }
    }

    #[test]
    fn exact_stock_is_sufficient() {
        assert_eq!(
            check_availability(Some(&product(4)), 4),
            Availability::Sufficient { available: 4 }
        );
    }

    #[test]
    fn more_than_available_is_insufficient() {
        assert_eq!(
            check_availability(Some(&product(3)), 5),
            Availability::Insufficient { available: 3, requested: 5 }
        );
    }

    #[test]
    fn non_positive_quantities_are_invalid() {
        for requested in [0, -5, i32::MIN] {
            assert_eq!(
                check_availability(Some(&product(10)), requested),
                Availability::InvalidQuantity { requested }
            );
        }
        assert_eq!(
            check_availability(None, 0),
            Availability::InvalidQuantity { requested: 0 }
        );
    }

    #[test]
    fn unknown_product_is_never_sufficient() {
        assert!(!check_availability(None, 1).is_sufficient());
    }
}
