//! Offline write queue and its replay.
//!
//! - `MutationQueue`: FIFO of `PendingMutation`s, persisted in the local cache
//! - `SyncManager`: the single flush pass (`sync_all`) and reconnect trigger
//! - `ReplayTarget`: receives rows the backend stored for replayed updates

pub mod manager;
pub mod queue;

pub use manager::{ReplayTarget, SyncManager, SyncReport, MAX_SYNC_ATTEMPTS};
pub use queue::{MutationQueue, QUEUE_CACHE_KEY};
