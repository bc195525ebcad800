use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::watch;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::cache::CacheStore;
use crate::models::{MutationOp, PendingMutation};

/// Cache key the queue is persisted under
pub const QUEUE_CACHE_KEY: &str = "pending_mutations";

struct QueueInner {
    entries: VecDeque<PendingMutation>,
    /// Mutation currently being replayed; never coalesced into
    in_flight: Option<Uuid>,
    /// The in-flight entry was replaced while being replayed
    superseded: bool,
}

impl QueueInner {
    fn clear_in_flight(&mut self, id: Uuid) {
        if self.in_flight == Some(id) {
            self.in_flight = None;
            self.superseded = false;
        }
    }
}

/// FIFO of writes waiting for the backend.
///
/// The whole queue is written to the cache after every change. That write is
/// best-effort like any other cache write: the in-memory queue stays
/// authoritative for the session.
pub struct MutationQueue<S> {
    store: Arc<S>,
    inner: Arc<Mutex<QueueInner>>,
    count_tx: Arc<watch::Sender<usize>>,
}

impl<S> Clone for MutationQueue<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            inner: Arc::clone(&self.inner),
            count_tx: Arc::clone(&self.count_tx),
        }
    }
}

impl<S: CacheStore> MutationQueue<S> {
    /// Open the queue, restoring whatever a previous session left behind.
    pub fn restore(store: Arc<S>) -> Self {
        let entries: VecDeque<PendingMutation> =
            match store.load::<VecDeque<PendingMutation>>(QUEUE_CACHE_KEY) {
                Ok(Some(cached)) => {
                    debug!(count = cached.data.len(), "Restored pending mutations");
                    cached.data
                }
                Ok(None) => VecDeque::new(),
                Err(e) => {
                    warn!(error = %e, "Failed to restore pending mutations, starting empty");
                    VecDeque::new()
                }
            };

        let (count_tx, _rx) = watch::channel(entries.len());
        Self {
            store,
            inner: Arc::new(Mutex::new(QueueInner {
                entries,
                in_flight: None,
                superseded: false,
            })),
            count_tx: Arc::new(count_tx),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueInner> {
        // A panic while holding the lock cannot leave the deque half-updated
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn commit(&self, inner: &QueueInner) {
        if let Err(e) = self.store.save(QUEUE_CACHE_KEY, &inner.entries) {
            warn!(error = %e, "Failed to persist pending mutations");
        }
        let len = inner.entries.len();
        self.count_tx.send_if_modified(|count| {
            let changed = *count != len;
            *count = len;
            changed
        });
    }

    /// Queue a mutation and return the id it is tracked under.
    ///
    /// A mutation whose id is already queued replaces that entry; if that
    /// entry is being replayed, confirming the replay keeps the replacement
    /// queued. An update to a row that already has a queued update is folded
    /// into it: the newer payload wins, the older version token is kept
    /// since that is the version the server still has.
    pub fn enqueue(&self, mutation: PendingMutation) -> Uuid {
        let mut inner = self.lock();
        let in_flight = inner.in_flight;

        let id = if let Some(pos) = inner.entries.iter().position(|m| m.id == mutation.id) {
            let id = mutation.id;
            inner.entries[pos] = mutation;
            if in_flight == Some(id) {
                debug!(%id, "Replaced mutation while it is being replayed");
                inner.superseded = true;
            }
            id
        } else if let Some(existing) = inner.entries.iter_mut().find(|m| {
            Some(m.id) != in_flight
                && m.table == mutation.table
                && matches!(m.op, MutationOp::Update { .. })
                && m.op == mutation.op
        }) {
            debug!(mutation = %existing.describe(), "Coalescing queued update");
            existing.payload = mutation.payload;
            existing.id
        } else {
            let id = mutation.id;
            debug!(mutation = %mutation.describe(), "Queued mutation");
            inner.entries.push_back(mutation);
            id
        };

        self.commit(&inner);
        id
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    pub fn front(&self) -> Option<PendingMutation> {
        self.lock().entries.front().cloned()
    }

    pub fn snapshot(&self) -> Vec<PendingMutation> {
        self.lock().entries.iter().cloned().collect()
    }

    /// Hand out the oldest mutation for replay and mark it in flight.
    pub fn begin_next(&self) -> Option<PendingMutation> {
        let mut inner = self.lock();
        let next = inner.entries.front().cloned();
        inner.in_flight = next.as_ref().map(|m| m.id);
        inner.superseded = false;
        next
    }

    /// Drop a mutation, typically after the backend confirmed it.
    ///
    /// An in-flight entry replaced since `begin_next` stays queued, since
    /// the confirmed write was the older payload. Returns whether the entry
    /// was dropped.
    pub fn remove(&self, id: Uuid) -> bool {
        let mut inner = self.lock();
        if inner.in_flight == Some(id) && inner.superseded {
            inner.clear_in_flight(id);
            return false;
        }
        inner.clear_in_flight(id);
        let before = inner.entries.len();
        inner.entries.retain(|m| m.id != id);
        let removed = inner.entries.len() != before;
        if removed {
            self.commit(&inner);
        }
        removed
    }

    /// Record a failed replay attempt; returns the attempt count so far.
    pub fn record_failure(&self, id: Uuid, error: &str) -> Option<u32> {
        let mut inner = self.lock();
        inner.clear_in_flight(id);
        let attempts = inner.entries.iter_mut().find(|m| m.id == id).map(|m| {
            m.attempts += 1;
            m.last_error = Some(error.to_string());
            m.attempts
        });
        if attempts.is_some() {
            self.commit(&inner);
        }
        attempts
    }

    /// Clear the in-flight marker without touching the entry.
    pub fn release(&self, id: Uuid) {
        self.lock().clear_in_flight(id);
    }

    pub fn subscribe_count(&self) -> watch::Receiver<usize> {
        self.count_tx.subscribe()
    }
}
