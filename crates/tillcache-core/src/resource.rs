//! Remote-backed, locally cached resources.
//!
//! A `CachedResource` goes through the same lifecycle every time it is
//! mounted:
//!
//! ```text
//! Init -> CacheLoaded? -> RemotePending -> RemoteOk | RemoteFailed
//! ```
//!
//! The cached copy is shown as soon as it is read, the remote fetch runs in
//! the background, and a failed fetch falls back to whatever the cache holds.
//! Observers get whole-state snapshots through a `watch` channel, so they
//! never see a half-applied update.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::api::{RemoteError, RemoteSource, RemoteWriter, TableRow, TableRows};
use crate::cache::{manager, CacheStore, Cacheable};
use crate::context::ResourceContext;
use crate::error::ResourceError;
use crate::models::{PendingMutation, Product, ReceiptSettings, Record};
use crate::sync::{MutationQueue, ReplayTarget};

/// Receipt settings of the current store.
pub type SettingsResource<S> = CachedResource<ReceiptSettings, TableRow<ReceiptSettings>, S>;

/// The product catalogue.
pub type CatalogueResource<S> = CachedResource<Vec<Product>, TableRows<Product>, S>;

/// Message shown when nothing can be displayed because the backend is out of reach.
pub fn offline_message(label: &str) -> String {
    format!("Working Offline - Using cached {}", label)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    CacheLoaded,
    RemotePending,
    RemoteOk,
    RemoteFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueSource {
    Cache,
    Remote,
}

/// Everything an observer needs to render a resource.
#[derive(Debug, Clone)]
pub struct ResourceState<T> {
    pub value: Option<T>,
    pub source: Option<ValueSource>,
    /// When the shown value was written to the cache; `None` for live values
    pub cached_at: Option<DateTime<Utc>>,
    pub loading: bool,
    pub error: Option<String>,
    pub phase: Phase,
    /// Bumped on every remote-sourced apply
    revision: u64,
}

impl<T> Default for ResourceState<T> {
    fn default() -> Self {
        Self {
            value: None,
            source: None,
            cached_at: None,
            loading: true,
            error: None,
            phase: Phase::Init,
            revision: 0,
        }
    }
}

impl<T> ResourceState<T> {
    /// How old the shown value is, when it came from the cache.
    pub fn age_display(&self) -> Option<String> {
        match self.source {
            Some(ValueSource::Cache) => self.cached_at.map(manager::age_display),
            _ => None,
        }
    }

    pub fn is_from_cache(&self) -> bool {
        self.source == Some(ValueSource::Cache)
    }

    /// True when the shown value came from a cache entry older than `minutes`.
    pub fn is_stale_after(&self, minutes: i64) -> bool {
        match (self.source, self.cached_at) {
            (Some(ValueSource::Cache), Some(at)) => (Utc::now() - at).num_minutes() > minutes,
            _ => false,
        }
    }

    fn apply_remote(&mut self, value: T) {
        self.value = Some(value);
        self.source = Some(ValueSource::Remote);
        self.cached_at = None;
        self.loading = false;
        self.error = None;
        self.phase = Phase::RemoteOk;
        self.revision += 1;
    }
}

/// What happened to an update.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome<T> {
    /// The backend stored the record; this is the row it returned
    Applied(T),
    /// The backend was unreachable; the write waits in the outbox under this id
    Queued(Uuid),
}

pub struct CachedResource<T, R, S> {
    remote: Arc<R>,
    ctx: ResourceContext<S>,
    state: Arc<watch::Sender<ResourceState<T>>>,
    /// Held by the one fetch in flight
    fetch_flight: Arc<Mutex<()>>,
    /// Held for the duration of a remote fetch or write
    remote_lock: Arc<Mutex<()>>,
    outbox: Option<MutationQueue<S>>,
}

impl<T, R, S> Clone for CachedResource<T, R, S> {
    fn clone(&self) -> Self {
        Self {
            remote: Arc::clone(&self.remote),
            ctx: self.ctx.clone(),
            state: Arc::clone(&self.state),
            fetch_flight: Arc::clone(&self.fetch_flight),
            remote_lock: Arc::clone(&self.remote_lock),
            outbox: self.outbox.clone(),
        }
    }
}

impl<T, R, S> CachedResource<T, R, S>
where
    T: Cacheable,
    R: RemoteSource<T>,
    S: CacheStore,
{
    pub fn new(remote: R, ctx: ResourceContext<S>) -> Self {
        let (tx, _rx) = watch::channel(ResourceState::default());
        Self {
            remote: Arc::new(remote),
            ctx,
            state: Arc::new(tx),
            fetch_flight: Arc::new(Mutex::new(())),
            remote_lock: Arc::new(Mutex::new(())),
            outbox: None,
        }
    }

    /// Queue writes that fail for lack of connectivity instead of failing them.
    pub fn with_outbox(mut self, outbox: MutationQueue<S>) -> Self {
        self.outbox = Some(outbox);
        self
    }

    pub fn subscribe(&self) -> watch::Receiver<ResourceState<T>> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> ResourceState<T> {
        self.state.borrow().clone()
    }

    pub fn value(&self) -> Option<T> {
        self.state.borrow().value.clone()
    }

    /// Mount the resource: show the cached copy now, fetch in the background.
    ///
    /// Aborting the returned handle cancels the fetch; the state keeps
    /// whatever was applied before that.
    pub fn start(&self) -> JoinHandle<()> {
        self.load_cached();
        let this = self.clone();
        tokio::spawn(async move { this.refresh().await })
    }

    /// Same as `start`, but waits for the fetch to finish.
    pub async fn load(&self) {
        self.load_cached();
        self.refresh().await;
    }

    fn read_cache(&self) -> Option<crate::cache::CachedData<T>> {
        match self.ctx.store.load::<T>(T::cache_key()) {
            Ok(Some(cached)) => Some(cached),
            Ok(None) => {
                debug!(resource = T::label(), "No cached copy");
                None
            }
            Err(e) => {
                warn!(error = %e, resource = T::label(), "Failed to read cache");
                None
            }
        }
    }

    /// Show the cached copy, if any, without going to the backend.
    pub fn load_cached(&self) {
        let revision = self.state.borrow().revision;
        let Some(cached) = self.read_cache() else {
            return;
        };

        self.state.send_if_modified(|s| {
            // A remote value landed while the cache was being read
            if s.revision != revision {
                return false;
            }
            debug!(resource = T::label(), age = %cached.age_display(), "Showing cached copy");
            s.value = Some(cached.data);
            s.source = Some(ValueSource::Cache);
            s.cached_at = Some(cached.cached_at);
            s.loading = false;
            s.phase = Phase::CacheLoaded;
            true
        });
    }

    /// Fetch the current value from the backend.
    ///
    /// Only one fetch runs at a time; a call made while one is in flight
    /// waits for it and returns without fetching again. A fetch requested
    /// during a write starts once the write is done.
    pub async fn refresh(&self) {
        let _flight = match self.fetch_flight.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                debug!(resource = T::label(), "Joining in-flight fetch");
                let _joined = self.fetch_flight.lock().await;
                return;
            }
        };
        let _remote = self.remote_lock.lock().await;

        let started_at = self.state.borrow().revision;
        self.state.send_modify(|s| s.phase = Phase::RemotePending);

        match self.remote.fetch().await {
            Ok(value) => self.apply_remote(value),
            Err(e) => self.recover(e, started_at),
        }
    }

    fn apply_remote(&self, value: T) {
        if let Err(e) = self.ctx.store.save(T::cache_key(), &value) {
            warn!(error = %e, resource = T::label(), "Failed to cache remote value");
        }
        self.ctx.connectivity.set_online(true);
        self.state.send_modify(|s| s.apply_remote(value));
    }

    fn recover(&self, error: RemoteError, started_at: u64) {
        let offline = if error.is_connectivity() {
            self.ctx.connectivity.set_online(false);
            true
        } else {
            !self.ctx.connectivity.is_online()
        };
        warn!(error = %error, resource = T::label(), offline, "Failed to fetch");

        let cached = self.read_cache();
        self.state.send_modify(|s| {
            s.loading = false;
            s.phase = Phase::RemoteFailed;

            // A replayed write landed meanwhile and is newer than anything cached
            if s.revision != started_at {
                s.error = None;
                return;
            }

            match cached {
                Some(cached) => {
                    s.value = Some(cached.data);
                    s.source = Some(ValueSource::Cache);
                    s.cached_at = Some(cached.cached_at);
                    s.error = None;
                }
                None if s.value.is_some() => s.error = None,
                None if offline => s.error = Some(offline_message(T::label())),
                None => s.error = Some(error.to_string()),
            }
        });
    }
}

impl<T, R, S> CachedResource<T, R, S>
where
    T: Record,
    R: RemoteWriter<T>,
    S: CacheStore,
{
    /// Write an edited record through to the backend and the cache.
    ///
    /// The write carries the version of the loaded record, so it is refused
    /// if the row changed on the server in the meantime. On success the
    /// resource shows the row as the server stored it.
    pub async fn update(&self, edited: T) -> Result<UpdateOutcome<T>, ResourceError> {
        let result = self.write(edited).await;
        match &result {
            Ok(UpdateOutcome::Applied(_)) => {
                self.ctx
                    .notifier
                    .success(format!("{} Updated", capitalize(T::label())));
            }
            Ok(UpdateOutcome::Queued(_)) => {
                self.ctx
                    .notifier
                    .info("Saved offline - will sync when back online");
            }
            Err(e) => self.ctx.notifier.error(e.to_string()),
        }
        result
    }

    async fn write(&self, edited: T) -> Result<UpdateOutcome<T>, ResourceError> {
        let (record_id, expected_version) = {
            let state = self.state.borrow();
            let current = state.value.as_ref().ok_or(ResourceError::NotLoaded {
                resource: T::label(),
            })?;
            (current.record_id(), current.version().map(str::to_string))
        };

        // Serialize with fetches so a slow read cannot overwrite the write
        let _remote = self.remote_lock.lock().await;

        match self
            .remote
            .update(&record_id, &edited, expected_version.as_deref())
            .await
        {
            Ok(saved) => {
                if let Err(e) = self.ctx.store.save(T::cache_key(), &saved) {
                    warn!(error = %e, resource = T::label(), "Failed to cache saved value");
                }
                self.ctx.connectivity.set_online(true);
                self.state.send_modify(|s| s.apply_remote(saved.clone()));
                info!(resource = T::label(), record_id = %record_id, "Saved");
                Ok(UpdateOutcome::Applied(saved))
            }
            Err(RemoteError::Conflict) => Err(ResourceError::Conflict {
                resource: T::label(),
            }),
            Err(e) if e.is_connectivity() => {
                self.ctx.connectivity.set_online(false);
                let Some(outbox) = &self.outbox else {
                    return Err(e.into());
                };
                let mutation =
                    PendingMutation::update(T::table(), &record_id, &edited, expected_version)?;
                let id = outbox.enqueue(mutation);
                info!(resource = T::label(), record_id = %record_id, "Backend unreachable, update queued");
                Ok(UpdateOutcome::Queued(id))
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl<T, R, S> ReplayTarget for CachedResource<T, R, S>
where
    T: Record,
    R: RemoteSource<T>,
    S: CacheStore,
{
    fn table(&self) -> &'static str {
        T::table()
    }

    /// Show and cache the row a replayed update stored, if it is the row on display.
    fn confirmed(&self, record_id: &str, row: serde_json::Value) {
        let shows_row = self
            .state
            .borrow()
            .value
            .as_ref()
            .map_or(true, |current| current.record_id() == record_id);
        if !shows_row {
            return;
        }
        match serde_json::from_value::<T>(row) {
            Ok(stored) => {
                debug!(resource = T::label(), record_id, "Applying replayed write");
                self.apply_remote(stored);
            }
            Err(e) => warn!(error = %e, resource = T::label(), "Replayed row does not parse"),
        }
    }
}

fn capitalize(label: &str) -> String {
    let mut chars = label.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryStore;
    use crate::connectivity::Connectivity;
    use crate::notify::{Notifier, ToastLevel};
    use crate::cache::CachedData;
    use serde::{de::DeserializeOwned, Serialize};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    #[derive(Clone)]
    enum Fetch {
        Hang,
        Row(ReceiptSettings),
        Unreachable,
        Fail(&'static str),
    }

    #[derive(Clone)]
    enum Write {
        Row(ReceiptSettings),
        Conflict,
        Unreachable,
    }

    struct FakeRemote {
        fetch: std::sync::Mutex<Fetch>,
        write: std::sync::Mutex<Write>,
        gate: Option<Arc<Notify>>,
        write_gate: std::sync::Mutex<Option<Arc<Notify>>>,
        fetch_calls: AtomicUsize,
        update_calls: AtomicUsize,
        last_version: std::sync::Mutex<Option<String>>,
    }

    #[derive(Clone)]
    struct Fake(Arc<FakeRemote>);

    impl Fake {
        fn new(fetch: Fetch) -> Self {
            Self::gated(fetch, None)
        }

        fn gated(fetch: Fetch, gate: Option<Arc<Notify>>) -> Self {
            Fake(Arc::new(FakeRemote {
                fetch: std::sync::Mutex::new(fetch),
                write: std::sync::Mutex::new(Write::Unreachable),
                gate,
                write_gate: std::sync::Mutex::new(None),
                fetch_calls: AtomicUsize::new(0),
                update_calls: AtomicUsize::new(0),
                last_version: std::sync::Mutex::new(None),
            }))
        }

        fn on_write(self, write: Write) -> Self {
            *self.0.write.lock().unwrap() = write;
            self
        }

        fn with_write_gate(self, gate: Arc<Notify>) -> Self {
            *self.0.write_gate.lock().unwrap() = Some(gate);
            self
        }

        fn fetch_calls(&self) -> usize {
            self.0.fetch_calls.load(Ordering::SeqCst)
        }

        fn update_calls(&self) -> usize {
            self.0.update_calls.load(Ordering::SeqCst)
        }
    }

    impl RemoteSource<ReceiptSettings> for Fake {
        async fn fetch(&self) -> Result<ReceiptSettings, RemoteError> {
            self.0.fetch_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.0.gate {
                gate.notified().await;
            }
            let behavior = self.0.fetch.lock().unwrap().clone();
            match behavior {
                Fetch::Hang => std::future::pending().await,
                Fetch::Row(row) => Ok(row),
                Fetch::Unreachable => Err(RemoteError::Unreachable("connection refused".into())),
                Fetch::Fail(msg) => Err(RemoteError::ServerError(msg.to_string())),
            }
        }
    }

    impl RemoteWriter<ReceiptSettings> for Fake {
        async fn update(
            &self,
            _record_id: &str,
            _record: &ReceiptSettings,
            expected_version: Option<&str>,
        ) -> Result<ReceiptSettings, RemoteError> {
            self.0.update_calls.fetch_add(1, Ordering::SeqCst);
            *self.0.last_version.lock().unwrap() = expected_version.map(str::to_string);
            let gate = self.0.write_gate.lock().unwrap().clone();
            if let Some(gate) = gate {
                gate.notified().await;
            }
            let behavior = self.0.write.lock().unwrap().clone();
            match behavior {
                Write::Row(row) => Ok(row),
                Write::Conflict => Err(RemoteError::Conflict),
                Write::Unreachable => Err(RemoteError::Unreachable("connection refused".into())),
            }
        }
    }

    fn settings(name: &str, version: &str) -> ReceiptSettings {
        serde_json::from_value(serde_json::json!({
            "id": "rs-1",
            "store_id": "store-1",
            "business_name": name,
            "updated_at": version,
        }))
        .unwrap()
    }

    fn context(online: bool) -> ResourceContext<MemoryStore> {
        ResourceContext::new(MemoryStore::new(), Connectivity::new(online), Notifier::new())
    }

    type LoadHook = Box<dyn FnOnce() + Send>;

    /// Memory store that runs a hook right after the next read.
    #[derive(Default)]
    struct HookStore {
        inner: MemoryStore,
        after_load: std::sync::Mutex<Option<LoadHook>>,
    }

    impl CacheStore for HookStore {
        fn load<V: DeserializeOwned>(&self, key: &str) -> anyhow::Result<Option<CachedData<V>>> {
            let loaded = self.inner.load(key);
            let hook = self.after_load.lock().unwrap().take();
            if let Some(hook) = hook {
                hook();
            }
            loaded
        }

        fn save<V: Serialize>(&self, key: &str, data: &V) -> anyhow::Result<()> {
            self.inner.save(key, data)
        }

        fn remove(&self, key: &str) -> anyhow::Result<()> {
            self.inner.remove(key)
        }
    }

    fn cached_name(ctx: &ResourceContext<MemoryStore>) -> Option<String> {
        ctx.store
            .load::<ReceiptSettings>(ReceiptSettings::cache_key())
            .unwrap()
            .map(|c| c.data.business_name)
    }

    #[tokio::test]
    async fn test_cached_value_shown_before_remote_answers() {
        let ctx = context(true);
        ctx.store
            .save(ReceiptSettings::cache_key(), &settings("Cached Shop", "v1"))
            .unwrap();
        let remote = Fake::new(Fetch::Hang);
        let resource = CachedResource::new(remote.clone(), ctx);

        let handle = resource.start();
        let state = resource.snapshot();
        assert_eq!(state.value.as_ref().unwrap().business_name, "Cached Shop");
        assert_eq!(state.source, Some(ValueSource::Cache));
        assert!(!state.loading);
        assert!(state.error.is_none());

        tokio::task::yield_now().await;
        assert_eq!(resource.snapshot().phase, Phase::RemotePending);
        handle.abort();
    }

    #[tokio::test]
    async fn test_remote_value_supersedes_cache() {
        let ctx = context(false);
        ctx.store
            .save(ReceiptSettings::cache_key(), &settings("Old Name", "v1"))
            .unwrap();
        let resource = CachedResource::new(Fake::new(Fetch::Row(settings("New Name", "v2"))), ctx.clone());

        resource.load().await;

        let state = resource.snapshot();
        assert_eq!(state.value.as_ref().unwrap().business_name, "New Name");
        assert_eq!(state.source, Some(ValueSource::Remote));
        assert_eq!(state.phase, Phase::RemoteOk);
        assert!(state.age_display().is_none());
        assert_eq!(cached_name(&ctx).as_deref(), Some("New Name"));
        assert!(ctx.connectivity.is_online());
    }

    #[tokio::test]
    async fn test_unreachable_without_cache_reports_offline() {
        let ctx = context(true);
        let resource = CachedResource::new(Fake::new(Fetch::Unreachable), ctx.clone());

        resource.load().await;

        let state = resource.snapshot();
        assert!(state.value.is_none());
        assert!(!state.loading);
        assert_eq!(state.phase, Phase::RemoteFailed);
        assert_eq!(
            state.error.as_deref(),
            Some("Working Offline - Using cached settings")
        );
        assert!(!ctx.connectivity.is_online());
    }

    #[tokio::test]
    async fn test_any_failure_while_offline_reports_offline() {
        let ctx = context(false);
        let resource = CachedResource::new(Fake::new(Fetch::Fail("bad gateway")), ctx);

        resource.load().await;

        assert_eq!(
            resource.snapshot().error.as_deref(),
            Some("Working Offline - Using cached settings")
        );
    }

    #[tokio::test]
    async fn test_online_failure_without_cache_reports_the_failure() {
        let ctx = context(true);
        let resource = CachedResource::new(Fake::new(Fetch::Fail("bad gateway")), ctx.clone());

        resource.load().await;

        assert_eq!(
            resource.snapshot().error.as_deref(),
            Some("Server error: bad gateway")
        );
        assert!(ctx.connectivity.is_online());
    }

    #[tokio::test]
    async fn test_failure_with_cache_keeps_cached_value() {
        let ctx = context(true);
        ctx.store
            .save(ReceiptSettings::cache_key(), &settings("Cached Shop", "v1"))
            .unwrap();
        let resource = CachedResource::new(Fake::new(Fetch::Unreachable), ctx);

        resource.load().await;

        let state = resource.snapshot();
        assert_eq!(state.value.as_ref().unwrap().business_name, "Cached Shop");
        assert!(state.error.is_none());
        assert!(state.is_from_cache());
        assert_eq!(state.age_display().as_deref(), Some("just now"));
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_earlier_remote_value() {
        // Remote value in memory, cache emptied underneath
        let ctx = context(true);
        let remote = Fake::new(Fetch::Row(settings("Live Shop", "v2")));
        let resource = CachedResource::new(remote.clone(), ctx.clone());
        resource.load().await;
        ctx.store.remove(ReceiptSettings::cache_key()).unwrap();

        *remote.0.fetch.lock().unwrap() = Fetch::Fail("bad gateway");
        resource.refresh().await;

        let state = resource.snapshot();
        assert_eq!(state.value.as_ref().unwrap().business_name, "Live Shop");
        assert!(state.error.is_none());
    }

    #[tokio::test]
    async fn test_concurrent_refreshes_share_one_fetch() {
        let gate = Arc::new(Notify::new());
        let remote = Fake::gated(Fetch::Row(settings("Shop", "v1")), Some(gate.clone()));
        let resource = CachedResource::new(remote.clone(), context(true));

        tokio::join!(resource.refresh(), resource.refresh(), async {
            tokio::task::yield_now().await;
            gate.notify_one();
        });

        assert_eq!(remote.fetch_calls(), 1);
        assert_eq!(resource.value().unwrap().business_name, "Shop");
    }

    #[test]
    fn test_cache_read_never_overwrites_newer_remote_value() {
        let ctx = ResourceContext::new(HookStore::default(), Connectivity::new(true), Notifier::new());
        ctx.store
            .save(ReceiptSettings::cache_key(), &settings("Cached Shop", "v1"))
            .unwrap();
        let resource = CachedResource::new(Fake::new(Fetch::Hang), ctx.clone());

        // The remote value lands while the cache is being read
        let racing = resource.clone();
        *ctx.store.after_load.lock().unwrap() = Some(Box::new(move || {
            racing.apply_remote(settings("Live Shop", "v2"));
        }));
        resource.load_cached();

        let state = resource.snapshot();
        assert_eq!(state.value.as_ref().unwrap().business_name, "Live Shop");
        assert_eq!(state.source, Some(ValueSource::Remote));
        assert_eq!(state.phase, Phase::RemoteOk);
    }

    #[tokio::test]
    async fn test_replayed_row_survives_failed_fetch() {
        let gate = Arc::new(Notify::new());
        let ctx = context(true);
        ctx.store
            .save(ReceiptSettings::cache_key(), &settings("Cached Shop", "v1"))
            .unwrap();
        let resource = CachedResource::new(Fake::gated(Fetch::Unreachable, Some(gate.clone())), ctx);
        resource.load_cached();

        tokio::join!(resource.refresh(), async {
            tokio::task::yield_now().await;
            resource.confirmed("rs-1", serde_json::to_value(settings("Synced Shop", "v2")).unwrap());
            gate.notify_one();
        });

        let state = resource.snapshot();
        assert_eq!(state.value.as_ref().unwrap().business_name, "Synced Shop");
        assert_eq!(state.source, Some(ValueSource::Remote));
        assert_eq!(state.phase, Phase::RemoteFailed);
        assert!(state.error.is_none());
    }

    #[tokio::test]
    async fn test_refresh_during_write_fetches_afterwards() {
        let write_gate = Arc::new(Notify::new());
        let remote = Fake::new(Fetch::Row(settings("Shop", "v1")))
            .on_write(Write::Row(settings("Renamed", "v2")))
            .with_write_gate(write_gate.clone());
        let resource = CachedResource::new(remote.clone(), context(true));
        resource.load().await;
        *remote.0.fetch.lock().unwrap() = Fetch::Row(settings("Renamed Elsewhere", "v3"));

        let (updated, (), ()) = tokio::join!(
            resource.update(settings("Renamed", "v1")),
            async {
                tokio::task::yield_now().await;
                resource.refresh().await;
            },
            async {
                tokio::task::yield_now().await;
                tokio::task::yield_now().await;
                write_gate.notify_one();
            }
        );

        assert!(matches!(updated, Ok(UpdateOutcome::Applied(_))));
        assert_eq!(remote.fetch_calls(), 2);
        assert_eq!(resource.value().unwrap().business_name, "Renamed Elsewhere");
    }

    #[tokio::test]
    async fn test_replayed_update_is_shown_and_cached() {
        let ctx = context(true);
        let remote = Fake::new(Fetch::Row(settings("Shop", "v1")))
            .on_write(Write::Row(settings("Renamed Again", "v3")));
        let resource = CachedResource::new(remote.clone(), ctx.clone());
        resource.load().await;

        let mut other = settings("Other Shop", "v9");
        other.id = "rs-2".into();
        resource.confirmed("rs-2", serde_json::to_value(other).unwrap());
        assert_eq!(resource.value().unwrap().business_name, "Shop");

        resource.confirmed("rs-1", serde_json::to_value(settings("Renamed", "v2")).unwrap());

        let state = resource.snapshot();
        assert_eq!(state.value.as_ref().unwrap().business_name, "Renamed");
        assert_eq!(state.source, Some(ValueSource::Remote));
        assert_eq!(cached_name(&ctx).as_deref(), Some("Renamed"));

        // The next edit is based on the version the replay produced
        resource.update(settings("Renamed Again", "v2")).await.unwrap();
        assert_eq!(remote.0.last_version.lock().unwrap().as_deref(), Some("v2"));
    }

    #[tokio::test]
    async fn test_update_before_load_is_rejected() {
        let remote = Fake::new(Fetch::Hang).on_write(Write::Row(settings("Shop", "v2")));
        let resource = CachedResource::new(remote.clone(), context(true));

        let err = resource.update(settings("Shop", "v1")).await.unwrap_err();

        assert!(matches!(err, ResourceError::NotLoaded { .. }));
        assert_eq!(err.to_string(), "No settings found");
        assert_eq!(remote.update_calls(), 0);
    }

    #[tokio::test]
    async fn test_update_shows_the_server_row() {
        let ctx = context(true);
        let mut toasts = ctx.notifier.subscribe();
        let mut server_row = settings("Corner Shop", "v2");
        server_row.footer_message = Some("Thanks!".into());
        let remote = Fake::new(Fetch::Row(settings("Corner Shop", "v1")))
            .on_write(Write::Row(server_row.clone()));
        let resource = CachedResource::new(remote.clone(), ctx.clone());
        resource.load().await;

        let mut edited = resource.value().unwrap();
        edited.footer_message = Some("thanks".into());
        edited.show_logo = true;
        let outcome = resource.update(edited).await.unwrap();

        assert_eq!(outcome, UpdateOutcome::Applied(server_row.clone()));
        assert_eq!(resource.value().unwrap(), server_row);
        assert_eq!(remote.0.last_version.lock().unwrap().as_deref(), Some("v1"));
        let cached = ctx
            .store
            .load::<ReceiptSettings>(ReceiptSettings::cache_key())
            .unwrap()
            .unwrap();
        assert_eq!(cached.data, server_row);

        let toast = toasts.try_recv().unwrap();
        assert_eq!(toast.level, ToastLevel::Success);
        assert_eq!(toast.message, "Settings Updated");
    }

    #[tokio::test]
    async fn test_stale_update_is_a_conflict() {
        let remote = Fake::new(Fetch::Row(settings("Shop", "v1"))).on_write(Write::Conflict);
        let resource = CachedResource::new(remote, context(true));
        resource.load().await;

        let err = resource.update(settings("Renamed", "v1")).await.unwrap_err();

        assert!(matches!(err, ResourceError::Conflict { resource: "settings" }));
        assert_eq!(resource.value().unwrap().business_name, "Shop");
    }

    #[tokio::test]
    async fn test_unreachable_update_is_queued() {
        let ctx = context(true);
        let outbox = MutationQueue::restore(ctx.store.clone());
        let remote = Fake::new(Fetch::Row(settings("Shop", "v1"))).on_write(Write::Unreachable);
        let resource = CachedResource::new(remote, ctx.clone()).with_outbox(outbox.clone());
        resource.load().await;

        let outcome = resource.update(settings("Renamed", "v1")).await.unwrap();

        let UpdateOutcome::Queued(id) = outcome else {
            panic!("expected the update to be queued");
        };
        let queued = outbox.front().unwrap();
        assert_eq!(queued.id, id);
        assert_eq!(queued.table, "receipt_settings");
        assert_eq!(queued.expected_version.as_deref(), Some("v1"));
        assert_eq!(queued.payload["business_name"], "Renamed");
        assert_eq!(resource.value().unwrap().business_name, "Shop");
        assert!(!ctx.connectivity.is_online());
    }

    #[tokio::test]
    async fn test_unreachable_update_without_outbox_fails() {
        let remote = Fake::new(Fetch::Row(settings("Shop", "v1"))).on_write(Write::Unreachable);
        let resource = CachedResource::new(remote, context(true));
        resource.load().await;

        let err = resource.update(settings("Renamed", "v1")).await.unwrap_err();
        assert!(matches!(err, ResourceError::Remote(RemoteError::Unreachable(_))));
    }

    #[test]
    fn test_capitalize() {
        assert_eq!(capitalize("settings"), "Settings");
        assert_eq!(capitalize(""), "");
    }

    #[test]
    fn test_only_old_cached_values_are_stale() {
        let mut state: ResourceState<ReceiptSettings> = ResourceState::default();
        state.source = Some(ValueSource::Cache);
        state.cached_at = Some(Utc::now() - chrono::Duration::minutes(90));
        assert!(state.is_stale_after(60));
        assert!(!state.is_stale_after(120));

        state.source = Some(ValueSource::Remote);
        assert!(!state.is_stale_after(60));
    }
}
