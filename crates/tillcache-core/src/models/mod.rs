//! Data models for till entities.
//!
//! This module contains the data structures shared by the cache, the sync
//! queue and the front-ends:
//!
//! - `ReceiptSettings`: per-store receipt configuration
//! - `Product`: catalogue entry with price and stock
//! - `Cart`, `CartItem`: the basket being rung up, with pricing
//! - `Sale`, `SaleLine`: the record produced by checkout
//! - `PendingMutation`: a write queued for replay against the backend
//! - `SyncState`: connectivity and queue status for the indicator

pub mod cart;
pub mod mutation;
pub mod product;
pub mod sale;
pub mod settings;
pub mod sync_state;

pub use cart::{Cart, CartError, CartItem};
pub use mutation::{MutationOp, PendingMutation};
pub use product::Product;
pub use sale::{PaymentMethod, Sale, SaleLine};
pub use settings::ReceiptSettings;
pub use sync_state::SyncState;

use crate::cache::Cacheable;

/// A single backend row that can be written back.
pub trait Record: Cacheable {
    /// Backend table the row lives in
    fn table() -> &'static str;

    /// Primary key of the row
    fn record_id(&self) -> String;

    /// Version token used to reject stale writes (the row's `updated_at`).
    fn version(&self) -> Option<&str> {
        None
    }
}

/// Round `amount * bps / 10_000` half-up, for non-negative amounts.
pub(crate) fn apply_bps(amount: i64, bps: u32) -> i64 {
    (amount * i64::from(bps) + 5_000) / 10_000
}
