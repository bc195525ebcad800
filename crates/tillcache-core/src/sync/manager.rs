use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::MutationQueue;
use crate::api::{MutationSink, RemoteError};
use crate::cache::CacheStore;
use crate::connectivity::Connectivity;
use crate::context::ResourceContext;
use crate::error::SyncError;
use crate::models::SyncState;
use crate::notify::Notifier;

/// Replay attempts before a transiently failing mutation is given up on.
pub const MAX_SYNC_ATTEMPTS: u32 = 5;

/// Result of one sync pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub synced: usize,
    pub discarded: usize,
    pub remaining: usize,
}

/// Something showing rows of a backend table that replayed writes can replace.
///
/// After the backend confirms a queued update, the row it stored is handed
/// to every target tracking that table.
pub trait ReplayTarget: Send + Sync {
    fn table(&self) -> &'static str;

    /// Take the row the backend stored for a replayed write to `record_id`.
    fn confirmed(&self, record_id: &str, row: Value);
}

/// Resets the syncing flag however the pass ends.
struct SyncingGuard<'a>(&'a AtomicBool);

impl Drop for SyncingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Replays the outbox against the backend.
pub struct SyncManager<K, S> {
    sink: Arc<K>,
    queue: MutationQueue<S>,
    connectivity: Connectivity,
    notifier: Notifier,
    syncing: Arc<AtomicBool>,
    targets: Arc<Mutex<Vec<Box<dyn ReplayTarget>>>>,
}

impl<K, S> Clone for SyncManager<K, S> {
    fn clone(&self) -> Self {
        Self {
            sink: Arc::clone(&self.sink),
            queue: self.queue.clone(),
            connectivity: self.connectivity.clone(),
            notifier: self.notifier.clone(),
            syncing: Arc::clone(&self.syncing),
            targets: Arc::clone(&self.targets),
        }
    }
}

impl<K: MutationSink, S: CacheStore> SyncManager<K, S> {
    pub fn new(sink: K, queue: MutationQueue<S>, ctx: &ResourceContext<S>) -> Self {
        Self {
            sink: Arc::new(sink),
            queue,
            connectivity: ctx.connectivity.clone(),
            notifier: ctx.notifier.clone(),
            syncing: Arc::new(AtomicBool::new(false)),
            targets: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Hand rows confirmed by replayed updates to `target`.
    pub fn track<G: ReplayTarget + 'static>(&self, target: G) {
        self.targets
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Box::new(target));
    }

    fn publish(&self, table: &str, record_id: &str, row: Value) {
        let targets = self.targets.lock().unwrap_or_else(|e| e.into_inner());
        for target in targets.iter().filter(|t| t.table() == table) {
            target.confirmed(record_id, row.clone());
        }
    }

    pub fn queue(&self) -> &MutationQueue<S> {
        &self.queue
    }

    pub fn state(&self) -> SyncState {
        SyncState {
            is_online: self.connectivity.is_online(),
            pending_count: self.queue.len(),
            syncing: self.syncing.load(Ordering::Acquire),
        }
    }

    /// Push queued mutations to the backend, oldest first.
    ///
    /// The pass stops at the first mutation that cannot be applied right now
    /// (backend unreachable, rate limited, server error, credentials
    /// rejected) so later writes never overtake earlier ones. Mutations the
    /// backend refuses outright are dropped with an error toast.
    pub async fn sync_all(&self) -> Result<SyncReport, SyncError> {
        if !self.connectivity.is_online() {
            return Err(SyncError::Offline);
        }
        if self
            .syncing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(SyncError::AlreadySyncing);
        }
        let _guard = SyncingGuard(&self.syncing);

        let mut report = SyncReport::default();
        while let Some(mutation) = self.queue.begin_next() {
            let description = mutation.describe();
            match self.sink.apply(&mutation).await {
                Ok(stored) => {
                    debug!(mutation = %description, "Synced");
                    self.queue.remove(mutation.id);
                    if let (Some(row), Some(record_id)) = (stored, mutation.record_id()) {
                        self.publish(&mutation.table, record_id, row);
                    }
                    report.synced += 1;
                }
                Err(e) if e.is_connectivity() => {
                    warn!(error = %e, mutation = %description, "Backend unreachable, stopping sync");
                    self.queue.release(mutation.id);
                    self.connectivity.set_online(false);
                    break;
                }
                Err(RemoteError::Unauthorized) => {
                    warn!(mutation = %description, "Credentials rejected, stopping sync");
                    self.queue.release(mutation.id);
                    self.notifier.error(RemoteError::Unauthorized.to_string());
                    break;
                }
                Err(e) if e.is_transient() => {
                    let attempts = self
                        .queue
                        .record_failure(mutation.id, &e.to_string())
                        .unwrap_or(MAX_SYNC_ATTEMPTS);
                    warn!(error = %e, mutation = %description, attempts, "Sync attempt failed");
                    if attempts >= MAX_SYNC_ATTEMPTS {
                        self.discard(&mutation.table, mutation.id, &e);
                        report.discarded += 1;
                    }
                    break;
                }
                Err(e) => {
                    warn!(error = %e, mutation = %description, "Backend refused change");
                    self.discard(&mutation.table, mutation.id, &e);
                    report.discarded += 1;
                }
            }
        }

        report.remaining = self.queue.len();
        info!(
            synced = report.synced,
            discarded = report.discarded,
            remaining = report.remaining,
            "Sync pass finished"
        );
        if report.synced > 0 {
            self.notifier.success(synced_message(report.synced));
        }
        Ok(report)
    }

    fn discard(&self, table: &str, id: Uuid, error: &RemoteError) {
        self.queue.remove(id);
        self.notifier
            .error(format!("Discarded change to {}: {}", table, error));
    }

    /// Sync whenever the backend comes back with writes waiting.
    ///
    /// The connectivity channel only wakes on transitions, so any wake-up
    /// that finds the flag set means the backend came back (possibly after
    /// a flap the task never saw).
    pub fn spawn_auto_sync(&self) -> JoinHandle<()> {
        let this = self.clone();
        let mut online = self.connectivity.subscribe();
        tokio::spawn(async move {
            while online.changed().await.is_ok() {
                let now_online = *online.borrow_and_update();
                if now_online && !this.queue.is_empty() {
                    info!(pending = this.queue.len(), "Back online, syncing");
                    if let Err(e) = this.sync_all().await {
                        debug!(error = %e, "Automatic sync skipped");
                    }
                }
            }
        })
    }
}

fn synced_message(count: usize) -> String {
    if count == 1 {
        "Synced 1 change".to_string()
    } else {
        format!("Synced {} changes", count)
    }
}
