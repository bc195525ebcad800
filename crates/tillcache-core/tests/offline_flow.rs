//! A till that loses its backend, keeps working, and catches up afterwards.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tillcache_core::api::{MutationSink, RemoteSource, RemoteWriter};
use tillcache_core::models::{Cart, MutationOp, PaymentMethod, PendingMutation, Product, ReceiptSettings};
use tillcache_core::{
    CacheStore, CachedResource, Cacheable, Connectivity, MemoryStore, MutationQueue, Notifier,
    RemoteError, ResourceContext, SyncIndicator, SyncManager, UpdateOutcome,
};

/// Backend double: one settings row plus a log of replayed mutations.
#[derive(Clone)]
struct Backend {
    up: Arc<AtomicBool>,
    row: Arc<Mutex<ReceiptSettings>>,
    replayed: Arc<Mutex<Vec<PendingMutation>>>,
}

impl Backend {
    fn new(row: ReceiptSettings) -> Self {
        Self {
            up: Arc::new(AtomicBool::new(true)),
            row: Arc::new(Mutex::new(row)),
            replayed: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn check_up(&self) -> Result<(), RemoteError> {
        if self.up.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(RemoteError::Unreachable("connection refused".into()))
        }
    }
}

impl RemoteSource<ReceiptSettings> for Backend {
    async fn fetch(&self) -> Result<ReceiptSettings, RemoteError> {
        self.check_up()?;
        Ok(self.row.lock().unwrap().clone())
    }
}

impl RemoteWriter<ReceiptSettings> for Backend {
    async fn update(
        &self,
        _record_id: &str,
        record: &ReceiptSettings,
        expected_version: Option<&str>,
    ) -> Result<ReceiptSettings, RemoteError> {
        self.check_up()?;
        let mut row = self.row.lock().unwrap();
        if expected_version != row.updated_at.as_deref() {
            return Err(RemoteError::Conflict);
        }
        let mut saved = record.clone();
        saved.updated_at = Some("v2".into());
        *row = saved.clone();
        Ok(saved)
    }
}

impl MutationSink for Backend {
    async fn apply(&self, mutation: &PendingMutation) -> Result<Option<serde_json::Value>, RemoteError> {
        self.check_up()?;
        self.replayed.lock().unwrap().push(mutation.clone());
        match (&mutation.op, mutation.table.as_str()) {
            (MutationOp::Update { .. }, "receipt_settings") => {
                let mut row = self.row.lock().unwrap();
                if mutation.expected_version != row.updated_at {
                    return Err(RemoteError::Conflict);
                }
                let mut stored: ReceiptSettings = serde_json::from_value(mutation.payload.clone())
                    .map_err(|e| RemoteError::InvalidResponse(e.to_string()))?;
                stored.updated_at = Some("v2".into());
                *row = stored.clone();
                Ok(Some(serde_json::to_value(stored).unwrap()))
            }
            _ => Ok(None),
        }
    }
}

fn settings() -> ReceiptSettings {
    serde_json::from_value(serde_json::json!({
        "id": "rs-1",
        "store_id": "store-1",
        "business_name": "Corner Shop",
        "tax_rate_bps": 825,
        "updated_at": "v1",
    }))
    .unwrap()
}

#[tokio::test]
async fn test_offline_session_catches_up_on_reconnect() {
    let backend = Backend::new(settings());
    let ctx = ResourceContext::new(MemoryStore::new(), Connectivity::new(true), Notifier::new());
    let outbox = MutationQueue::restore(ctx.store.clone());
    let sync = SyncManager::new(backend.clone(), outbox.clone(), &ctx);
    let auto_sync = sync.spawn_auto_sync();

    // First mount while online fills the cache
    let resource = CachedResource::new(backend.clone(), ctx.clone()).with_outbox(outbox.clone());
    resource.load().await;
    assert!(ctx.store.load::<ReceiptSettings>(ReceiptSettings::cache_key()).unwrap().is_some());

    // Backend goes away: a fresh mount still shows the cached row
    backend.up.store(false, Ordering::SeqCst);
    let remount = CachedResource::new(backend.clone(), ctx.clone()).with_outbox(outbox.clone());
    sync.track(remount.clone());
    remount.load().await;
    let state = remount.snapshot();
    assert_eq!(state.value.as_ref().unwrap().business_name, "Corner Shop");
    assert!(state.error.is_none());
    assert!(!ctx.connectivity.is_online());

    // Selling and editing keep working
    let mut edited = remount.value().unwrap();
    edited.footer_message = Some("See you soon".into());
    let outcome = remount.update(edited).await.unwrap();
    assert!(matches!(outcome, UpdateOutcome::Queued(_)));

    let product = Product {
        id: "p-1".into(),
        sku: None,
        name: "Coffee".into(),
        category: None,
        price_cents: 300,
        stock: None,
        active: true,
        updated_at: None,
    };
    let mut cart = Cart::new();
    cart.add(&product, 2).unwrap();
    let sale = cart.checkout(&remount.value().unwrap(), PaymentMethod::Card).unwrap();
    outbox.enqueue(PendingMutation::upsert("sales", &sale).unwrap());

    assert_eq!(
        SyncIndicator::from_state(&sync.state()),
        Some(SyncIndicator::Offline { pending_count: 2 })
    );

    // Backend returns; the reconnect pushes both writes in order
    backend.up.store(true, Ordering::SeqCst);
    ctx.connectivity.set_online(true);
    tokio::time::timeout(Duration::from_secs(5), async {
        while !outbox.is_empty() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .unwrap();

    let replayed = backend.replayed.lock().unwrap().clone();
    assert_eq!(replayed.len(), 2);
    assert!(matches!(replayed[0].op, MutationOp::Update { ref record_id } if record_id == "rs-1"));
    assert_eq!(replayed[0].expected_version.as_deref(), Some("v1"));
    assert_eq!(replayed[1].table, "sales");
    assert_eq!(replayed[1].payload["total_cents"], sale.total_cents);
    assert_eq!(SyncIndicator::from_state(&sync.state()), None);

    // The replayed edit is what the till now shows and caches
    let shown = remount.value().unwrap();
    assert_eq!(shown.footer_message.as_deref(), Some("See you soon"));
    assert_eq!(shown.updated_at.as_deref(), Some("v2"));
    let cached = ctx
        .store
        .load::<ReceiptSettings>(ReceiptSettings::cache_key())
        .unwrap()
        .unwrap();
    assert_eq!(cached.data, shown);

    // So the next edit is not mistaken for a stale one
    let mut edited = shown;
    edited.show_logo = !edited.show_logo;
    let outcome = remount.update(edited).await.unwrap();
    assert!(matches!(outcome, UpdateOutcome::Applied(_)));

    auto_sync.abort();
}

#[tokio::test]
async fn test_stale_edit_is_refused() {
    let backend = Backend::new(settings());
    let ctx = ResourceContext::new(MemoryStore::new(), Connectivity::new(true), Notifier::new());
    let resource = CachedResource::new(backend.clone(), ctx);
    resource.load().await;

    // Another till saves first
    backend.row.lock().unwrap().updated_at = Some("v9".into());

    let mut edited = resource.value().unwrap();
    edited.business_name = "Renamed".into();
    let err = resource.update(edited).await.unwrap_err();

    assert_eq!(
        err.to_string(),
        "The settings were changed elsewhere - reload and try again"
    );
    assert_eq!(backend.row.lock().unwrap().business_name, "Corner Shop");
}
