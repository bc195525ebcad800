use serde::{Deserialize, Serialize};

/// Connectivity and queue status, as shown by the sync indicator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct SyncState {
    pub is_online: bool,
    pub pending_count: usize,
    pub syncing: bool,
}

impl SyncState {
    /// Nothing to show: online with an empty queue.
    pub fn is_settled(&self) -> bool {
        self.is_online && self.pending_count == 0
    }
}
