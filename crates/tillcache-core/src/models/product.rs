//! Catalogue entries.

use serde::{Deserialize, Serialize};

use crate::cache::Cacheable;

/// A sellable product (`products` table).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Product {
    pub id: String,
    #[serde(default)]
    pub sku: Option<String>,
    pub name: String,
    #[serde(default)]
    pub category: Option<String>,
    pub price_cents: i64,
    /// Units on hand; `None` means stock is not tracked for this product
    #[serde(default)]
    pub stock: Option<u32>,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub updated_at: Option<String>,
}

fn default_active() -> bool {
    true
}

impl Product {
    /// Whether `quantity` units can be sold from current stock.
    pub fn can_sell(&self, quantity: u32) -> bool {
        self.active && self.stock.map_or(true, |on_hand| quantity <= on_hand)
    }
}

/// The catalogue is cached and refreshed as one list.
impl Cacheable for Vec<Product> {
    fn cache_key() -> &'static str {
        "products"
    }

    fn label() -> &'static str {
        "products"
    }
}
