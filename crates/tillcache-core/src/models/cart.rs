//! The basket being rung up and its pricing.
//!
//! All amounts are integer cents. Discount and tax are basis points and each
//! derived amount is rounded half-up on its own, so a receipt always adds up:
//! `total = subtotal - discount + tax`.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::{apply_bps, PaymentMethod, Product, ReceiptSettings, Sale, SaleLine};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CartError {
    #[error("{0} is not available for sale")]
    InactiveProduct(String),

    #[error("Only {available} of {name} in stock")]
    InsufficientStock { name: String, available: u32 },

    #[error("Item is not in the cart: {0}")]
    UnknownItem(String),

    #[error("Cart is empty")]
    EmptyCart,

    #[error("Discount must be between 0% and 100%, got {0} bps")]
    InvalidDiscount(u32),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartItem {
    pub product_id: String,
    pub name: String,
    pub unit_price_cents: i64,
    pub quantity: u32,
    /// Stock on hand when the product was added, for quantity checks
    pub stock: Option<u32>,
}

impl CartItem {
    pub fn line_total_cents(&self) -> i64 {
        self.unit_price_cents * i64::from(self.quantity)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Cart {
    items: Vec<CartItem>,
    discount_bps: u32,
}

impl Cart {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> &[CartItem] {
        &self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn discount_bps(&self) -> u32 {
        self.discount_bps
    }

    /// Add `quantity` units of `product`, merging with an existing line.
    pub fn add(&mut self, product: &Product, quantity: u32) -> Result<(), CartError> {
        if quantity == 0 {
            return Ok(());
        }
        if !product.active {
            return Err(CartError::InactiveProduct(product.name.clone()));
        }

        let existing = self.items.iter().position(|i| i.product_id == product.id);
        let wanted = existing.map_or(0, |idx| self.items[idx].quantity) + quantity;
        if !product.can_sell(wanted) {
            return Err(CartError::InsufficientStock {
                name: product.name.clone(),
                available: product.stock.unwrap_or(0),
            });
        }

        match existing {
            Some(idx) => {
                let item = &mut self.items[idx];
                item.quantity = wanted;
                // Pick up price/stock changes from a catalogue refresh
                item.unit_price_cents = product.price_cents;
                item.stock = product.stock;
            }
            None => self.items.push(CartItem {
                product_id: product.id.clone(),
                name: product.name.clone(),
                unit_price_cents: product.price_cents,
                quantity,
                stock: product.stock,
            }),
        }
        Ok(())
    }

    /// Set the quantity of a line; zero removes it.
    pub fn set_quantity(&mut self, product_id: &str, quantity: u32) -> Result<(), CartError> {
        let idx = self
            .items
            .iter()
            .position(|i| i.product_id == product_id)
            .ok_or_else(|| CartError::UnknownItem(product_id.to_string()))?;

        if quantity == 0 {
            self.items.remove(idx);
            return Ok(());
        }

        let item = &mut self.items[idx];
        if let Some(available) = item.stock {
            if quantity > available {
                return Err(CartError::InsufficientStock {
                    name: item.name.clone(),
                    available,
                });
            }
        }
        item.quantity = quantity;
        Ok(())
    }

    /// Take one unit off a line, removing it at zero.
    pub fn decrement(&mut self, product_id: &str) -> Result<(), CartError> {
        let current = self
            .items
            .iter()
            .find(|i| i.product_id == product_id)
            .map(|i| i.quantity)
            .ok_or_else(|| CartError::UnknownItem(product_id.to_string()))?;
        self.set_quantity(product_id, current - 1)
    }

    pub fn remove(&mut self, product_id: &str) -> Result<(), CartError> {
        self.set_quantity(product_id, 0)
    }

    /// Empty the cart and reset the discount.
    pub fn clear(&mut self) {
        self.items.clear();
        self.discount_bps = 0;
    }

    pub fn set_discount_bps(&mut self, bps: u32) -> Result<(), CartError> {
        if bps > 10_000 {
            return Err(CartError::InvalidDiscount(bps));
        }
        self.discount_bps = bps;
        Ok(())
    }

    pub fn item_count(&self) -> u32 {
        self.items.iter().map(|i| i.quantity).sum()
    }

    pub fn subtotal_cents(&self) -> i64 {
        self.items.iter().map(CartItem::line_total_cents).sum()
    }

    pub fn discount_cents(&self) -> i64 {
        apply_bps(self.subtotal_cents(), self.discount_bps)
    }

    pub fn tax_cents(&self, tax_rate_bps: u32) -> i64 {
        apply_bps(self.subtotal_cents() - self.discount_cents(), tax_rate_bps)
    }

    pub fn total_cents(&self, tax_rate_bps: u32) -> i64 {
        self.subtotal_cents() - self.discount_cents() + self.tax_cents(tax_rate_bps)
    }

    /// Turn the cart into a sale priced with the store's settings and empty it.
    pub fn checkout(
        &mut self,
        settings: &ReceiptSettings,
        payment_method: PaymentMethod,
    ) -> Result<Sale, CartError> {
        if self.items.is_empty() {
            return Err(CartError::EmptyCart);
        }

        let rate = settings.tax_rate_bps;
        let sale = Sale {
            id: Uuid::new_v4(),
            store_id: settings.store_id.clone(),
            lines: self
                .items
                .iter()
                .map(|i| SaleLine {
                    product_id: i.product_id.clone(),
                    name: i.name.clone(),
                    unit_price_cents: i.unit_price_cents,
                    quantity: i.quantity,
                    line_total_cents: i.line_total_cents(),
                })
                .collect(),
            subtotal_cents: self.subtotal_cents(),
            discount_cents: self.discount_cents(),
            tax_cents: self.tax_cents(rate),
            total_cents: self.total_cents(rate),
            payment_method,
            currency: settings.currency.clone(),
            created_at: Utc::now(),
        };

        self.clear();
        Ok(sale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(id: &str, price_cents: i64, stock: Option<u32>) -> Product {
        Product {
            id: id.into(),
            sku: None,
            name: format!("Product {}", id),
            category: None,
            price_cents,
            stock,
            active: true,
            updated_at: None,
        }
    }

    fn settings(tax_rate_bps: u32) -> ReceiptSettings {
        serde_json::from_value(serde_json::json!({
            "id": "rs-1",
            "store_id": "store-1",
            "business_name": "Corner Shop",
            "tax_rate_bps": tax_rate_bps,
        }))
        .unwrap()
    }

    #[test]
    fn test_add_merges_lines() {
        let mut cart = Cart::new();
        let latte = product("latte", 450, None);
        cart.add(&latte, 1).unwrap();
        cart.add(&latte, 2).unwrap();
        assert_eq!(cart.items().len(), 1);
        assert_eq!(cart.item_count(), 3);
        assert_eq!(cart.subtotal_cents(), 1350);
    }

    #[test]
    fn test_add_rejects_over_stock_and_inactive() {
        let mut cart = Cart::new();
        let muffin = product("muffin", 300, Some(2));
        cart.add(&muffin, 2).unwrap();
        assert_eq!(
            cart.add(&muffin, 1),
            Err(CartError::InsufficientStock {
                name: "Product muffin".into(),
                available: 2
            })
        );
        assert_eq!(cart.item_count(), 2);

        let mut retired = product("retired", 100, None);
        retired.active = false;
        assert!(matches!(
            cart.add(&retired, 1),
            Err(CartError::InactiveProduct(_))
        ));
    }

    #[test]
    fn test_set_quantity_and_decrement() {
        let mut cart = Cart::new();
        cart.add(&product("a", 100, Some(5)), 2).unwrap();

        cart.set_quantity("a", 5).unwrap();
        assert_eq!(cart.item_count(), 5);
        assert!(matches!(
            cart.set_quantity("a", 6),
            Err(CartError::InsufficientStock { .. })
        ));

        cart.set_quantity("a", 1).unwrap();
        cart.decrement("a").unwrap();
        assert!(cart.is_empty());
        assert_eq!(cart.decrement("a"), Err(CartError::UnknownItem("a".into())));
    }

    #[test]
    fn test_totals_with_discount_and_tax() {
        let mut cart = Cart::new();
        cart.add(&product("a", 1000, None), 1).unwrap();
        cart.add(&product("b", 250, None), 2).unwrap();
        cart.set_discount_bps(1000).unwrap(); // 10%

        assert_eq!(cart.subtotal_cents(), 1500);
        assert_eq!(cart.discount_cents(), 150);
        // 8.25% of 1350 = 111.375 -> 111
        assert_eq!(cart.tax_cents(825), 111);
        assert_eq!(cart.total_cents(825), 1461);
        assert_eq!(
            cart.set_discount_bps(10_001),
            Err(CartError::InvalidDiscount(10_001))
        );
    }

    #[test]
    fn test_clear_is_idempotent() {
        let mut cart = Cart::new();
        cart.add(&product("a", 100, None), 3).unwrap();
        cart.set_discount_bps(500).unwrap();

        cart.clear();
        let first = cart.clone();
        cart.clear();

        assert_eq!(first, cart);
        assert_eq!(cart, Cart::default());
        assert_eq!(cart.total_cents(825), 0);
    }

    #[test]
    fn test_checkout_builds_sale_and_empties_cart() {
        let mut cart = Cart::new();
        cart.add(&product("a", 1000, None), 2).unwrap();

        let sale = cart.checkout(&settings(500), PaymentMethod::Card).unwrap();
        assert_eq!(sale.subtotal_cents, 2000);
        assert_eq!(sale.tax_cents, 100);
        assert_eq!(sale.total_cents, 2100);
        assert_eq!(sale.item_count(), 2);
        assert_eq!(sale.store_id.as_deref(), Some("store-1"));
        assert_eq!(sale.lines[0].line_total_cents, 2000);
        assert!(cart.is_empty());

        assert_eq!(
            cart.checkout(&settings(500), PaymentMethod::Cash),
            Err(CartError::EmptyCart)
        );
    }
}
