//! # Cart
//!
//! The open cart of one terminal session.
//!
//! ## Cart Operations
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Cart Operations                                      │
//! │                                                                         │
//! │  Operation              Effect                                          │
//! │  ─────────              ──────                                          │
//! │  add_item()  ─────────► line.qty += n, or push a new priced line        │
//! │  update_quantity() ───► line.qty = n (0 removes the line)               │
//! │  remove_item() ───────► line removed                                    │
//! │  clear() ─────────────► all lines removed                               │
//! │                                                                         │
//! │  Prices are frozen when a line is added, after the outlet override.     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::catalog::Product;
use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::pricing::price_line;
use crate::types::TransactionLine;
use crate::validation::{validate_cart_size, validate_line_quantity};

/// A line in the cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub product_id: String,
    /// Product name at time of adding (frozen).
    pub name: String,
    /// Unit price at time of adding (frozen).
    pub unit_price: Money,
    pub quantity: i64,
}

impl CartLine {
    pub fn line_total(&self) -> Money {
        self.unit_price.multiply_quantity(self.quantity)
    }

    /// Freezes the line into a sale record.
    pub fn to_transaction_line(&self) -> TransactionLine {
        TransactionLine {
            product_id: self.product_id.clone(),
            name_snapshot: self.name.clone(),
            unit_price: self.unit_price,
            quantity: self.quantity,
            line_total: self.line_total(),
        }
    }
}

/// The shopping cart.
///
/// ## Invariants
/// - Lines are unique by `product_id` (adding again increases quantity)
/// - Quantity is always in `1..=MAX_LINE_QUANTITY`
/// - At most `MAX_CART_LINES` lines
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
    pub lines: Vec<CartLine>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl Default for Cart {
    fn default() -> Self {
        Self::new()
    }
}

impl Cart {
    pub fn new() -> Self {
        Cart {
            lines: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Adds a product priced for `outlet_id`, or increases its quantity.
    ///
    /// Products switched off for the outlet are refused.
    pub fn add_item(&mut self, product: &Product, outlet_id: &str, quantity: i64) -> CoreResult<()> {
        validate_line_quantity(quantity)?;

        if !product.is_available_at(outlet_id) {
            return Err(CoreError::ProductUnavailable {
                product_id: product.id.clone(),
                outlet_id: outlet_id.to_string(),
            });
        }

        if let Some(line) = self.lines.iter_mut().find(|l| l.product_id == product.id) {
            let new_qty = line.quantity + quantity;
            validate_line_quantity(new_qty)?;
            line.quantity = new_qty;
            return Ok(());
        }

        validate_cart_size(self.lines.len())?;
        self.lines.push(CartLine {
            product_id: product.id.clone(),
            name: product.name.clone(),
            unit_price: price_line(product, outlet_id),
            quantity,
        });
        Ok(())
    }

    /// Sets a line's quantity. Zero removes the line.
    pub fn update_quantity(&mut self, product_id: &str, quantity: i64) -> CoreResult<()> {
        if quantity == 0 {
            return self.remove_item(product_id);
        }
        validate_line_quantity(quantity)?;

        match self.lines.iter_mut().find(|l| l.product_id == product_id) {
            Some(line) => {
                line.quantity = quantity;
                Ok(())
            }
            None => Err(CoreError::ProductNotFound(product_id.to_string())),
        }
    }

    pub fn remove_item(&mut self, product_id: &str) -> CoreResult<()> {
        let initial_len = self.lines.len();
        self.lines.retain(|l| l.product_id != product_id);

        if self.lines.len() == initial_len {
            Err(CoreError::ProductNotFound(product_id.to_string()))
        } else {
            Ok(())
        }
    }

    pub fn clear(&mut self) {
        self.lines.clear();
        self.created_at = Utc::now();
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// Total units across lines; the bulk-rule threshold input.
    pub fn total_quantity(&self) -> i64 {
        self.lines.iter().map(|l| l.quantity).sum()
    }

    pub fn subtotal(&self) -> Money {
        self.lines.iter().map(|l| l.line_total()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// `(product_id, quantity)` pairs for BOM resolution.
    pub fn resolution_input(&self) -> impl Iterator<Item = (&str, Decimal)> {
        self.lines
            .iter()
            .map(|l| (l.product_id.as_str(), Decimal::from(l.quantity)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::OutletSetting;

    fn product(id: &str, price: i64) -> Product {
        Product::simple(id, format!("Product {}", id), Money::from_minor(price), vec![])
    }

    #[test]
    fn test_add_item_uses_outlet_price() {
        let mut cart = Cart::new();
        let p = product("1", 10_000).with_outlet_setting(
            "o2",
            OutletSetting { price: Money::from_minor(12_000), is_available: true },
        );

        cart.add_item(&p, "o2", 2).unwrap();
        assert_eq!(cart.subtotal().minor(), 24_000);
    }

    #[test]
    fn test_add_same_product_increases_quantity() {
        let mut cart = Cart::new();
        let p = product("1", 999);

        cart.add_item(&p, "o1", 2).unwrap();
        cart.add_item(&p, "o1", 3).unwrap();

        assert_eq!(cart.line_count(), 1);
        assert_eq!(cart.total_quantity(), 5);
        assert!(cart.add_item(&p, "o1", 995).is_err());
    }

    #[test]
    fn test_unavailable_product_is_refused() {
        let mut cart = Cart::new();
        let p = product("1", 999).with_outlet_setting(
            "o1",
            OutletSetting { price: Money::from_minor(999), is_available: false },
        );

        assert!(matches!(
            cart.add_item(&p, "o1", 1),
            Err(CoreError::ProductUnavailable { .. })
        ));
        assert!(cart.is_empty());
    }

    #[test]
    fn test_update_and_remove() {
        let mut cart = Cart::new();
        cart.add_item(&product("1", 500), "o1", 1).unwrap();
        cart.add_item(&product("2", 700), "o1", 1).unwrap();

        cart.update_quantity("1", 4).unwrap();
        assert_eq!(cart.subtotal().minor(), 2_700);

        cart.update_quantity("2", 0).unwrap();
        assert_eq!(cart.line_count(), 1);
        assert!(cart.remove_item("2").is_err());

        cart.clear();
        assert!(cart.is_empty());
    }
}
