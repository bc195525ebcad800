use std::sync::Arc;

use crate::cache::CacheStore;
use crate::connectivity::Connectivity;
use crate::notify::Notifier;

/// Shared collaborators handed to every resource and to the sync manager.
///
/// One context is built per session; nothing in the crate reaches for a
/// global instead.
pub struct ResourceContext<S> {
    pub store: Arc<S>,
    pub connectivity: Connectivity,
    pub notifier: Notifier,
}

impl<S: CacheStore> ResourceContext<S> {
    pub fn new(store: S, connectivity: Connectivity, notifier: Notifier) -> Self {
        Self {
            store: Arc::new(store),
            connectivity,
            notifier,
        }
    }
}

impl<S> Clone for ResourceContext<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            connectivity: self.connectivity.clone(),
            notifier: self.notifier.clone(),
        }
    }
}
