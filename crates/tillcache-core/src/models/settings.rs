//! Receipt configuration for a store.

use serde::{Deserialize, Serialize};

use crate::cache::Cacheable;

use super::Record;

/// Receipt configuration row (`receipt_settings` table).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct ReceiptSettings {
    pub id: String,
    #[serde(default)]
    pub store_id: Option<String>,
    pub business_name: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub tax_id: Option<String>,
    #[serde(default)]
    pub header_message: Option<String>,
    #[serde(default)]
    pub footer_message: Option<String>,
    #[serde(default)]
    pub show_logo: bool,
    #[serde(default = "default_paper_width")]
    pub paper_width_mm: u16,
    /// Sales tax in basis points (825 = 8.25%)
    #[serde(default)]
    pub tax_rate_bps: u32,
    #[serde(default = "default_currency")]
    pub currency: String,
    /// Server-maintained timestamp, kept verbatim so it can be echoed back
    /// as the version token on writes.
    #[serde(default)]
    pub updated_at: Option<String>,
}

fn default_paper_width() -> u16 {
    80
}

fn default_currency() -> String {
    "USD".to_string()
}

impl ReceiptSettings {
    /// Format the contact block printed under the business name.
    pub fn contact_line(&self) -> Option<String> {
        let parts: Vec<&str> = [&self.address, &self.phone, &self.email]
            .into_iter()
            .filter_map(|p| p.as_deref())
            .filter(|p| !p.is_empty())
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" · "))
        }
    }
}

impl Cacheable for ReceiptSettings {
    fn cache_key() -> &'static str {
        "receipt_settings"
    }

    fn label() -> &'static str {
        "settings"
    }
}

impl Record for ReceiptSettings {
    fn table() -> &'static str {
        "receipt_settings"
    }

    fn record_id(&self) -> String {
        self.id.clone()
    }

    fn version(&self) -> Option<&str> {
        self.updated_at.as_deref()
    }
}
