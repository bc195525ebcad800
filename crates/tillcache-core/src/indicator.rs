//! What the sync status affordance shows.
//!
//! Pure view model: no I/O, derived entirely from `SyncState`.

use crate::models::SyncState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncIndicator {
    /// Backend out of reach; writes are kept locally
    Offline { pending_count: usize },
    /// Online with writes waiting to be pushed
    Pending {
        pending_count: usize,
        sync_enabled: bool,
    },
}

impl SyncIndicator {
    /// `None` when there is nothing to tell: online with an empty queue.
    pub fn from_state(state: &SyncState) -> Option<Self> {
        if !state.is_online {
            Some(SyncIndicator::Offline {
                pending_count: state.pending_count,
            })
        } else if state.pending_count > 0 {
            Some(SyncIndicator::Pending {
                pending_count: state.pending_count,
                sync_enabled: !state.syncing,
            })
        } else {
            None
        }
    }

    pub fn label(&self) -> String {
        match self {
            SyncIndicator::Offline { .. } => "Offline mode".to_string(),
            SyncIndicator::Pending { pending_count, .. } => {
                format!("{} pending", pending_count)
            }
        }
    }

    pub fn pending_count(&self) -> usize {
        match self {
            SyncIndicator::Offline { pending_count } | SyncIndicator::Pending { pending_count, .. } => {
                *pending_count
            }
        }
    }

    /// Label of the sync action; offline shows no action at all.
    pub fn action_label(&self) -> Option<&'static str> {
        match self {
            SyncIndicator::Offline { .. } => None,
            SyncIndicator::Pending { sync_enabled: true, .. } => Some("Sync"),
            SyncIndicator::Pending { sync_enabled: false, .. } => Some("Syncing..."),
        }
    }

    pub fn sync_enabled(&self) -> bool {
        matches!(self, SyncIndicator::Pending { sync_enabled: true, .. })
    }
}
