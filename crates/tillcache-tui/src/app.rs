//! Application state for the tillcache console.
//!
//! `App` owns the cached resources, the cart and the sync manager. Anything
//! that talks to the backend runs on a spawned task; results come back as
//! resource snapshots, toasts, or `BackgroundResult`s and are folded into
//! the UI state once per tick by `check_background_tasks`.

use std::collections::VecDeque;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use tillcache_core::api::{ApiClient, TableRow, TableRows};
use tillcache_core::models::{Cart, PaymentMethod, PendingMutation, Product, ReceiptSettings, Sale};
use tillcache_core::resource::{CatalogueResource, ResourceState, SettingsResource, UpdateOutcome};
use tillcache_core::utils::format_cents;
use tillcache_core::{
    CacheManager, CachedResource, Config, Connectivity, MutationQueue, Notifier, ResourceContext,
    ResourceError, SyncError, SyncIndicator, SyncManager, SyncReport, Toast,
};

// ============================================================================
// Constants
// ============================================================================

/// Buffer size for the background task message channel.
const CHANNEL_BUFFER_SIZE: usize = 16;

/// Toasts kept on screen at once.
const MAX_TOASTS: usize = 3;

/// Seconds a toast stays visible.
const TOAST_TTL_SECS: i64 = 6;

/// Backend table completed sales are written to
const SALES_TABLE: &str = "sales";

// ============================================================================
// UI State Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppState {
    Normal,
    ShowingHelp,
    ConfirmingQuit,
    Quitting,
}

/// Results of background work, delivered through the app channel
enum BackgroundResult {
    SettingsSaved(Result<UpdateOutcome<ReceiptSettings>, ResourceError>),
    Synced(Result<SyncReport, SyncError>),
}

type Settings = SettingsResource<CacheManager>;
type Catalogue = CatalogueResource<CacheManager>;

pub struct App {
    pub config: Config,
    pub state: AppState,

    // Selling
    pub selection: usize,
    pub cart: Cart,
    pub payment_method: PaymentMethod,
    pub last_sale: Option<Sale>,

    // Latest resource snapshots, refreshed every tick
    pub settings_state: ResourceState<ReceiptSettings>,
    pub catalogue_state: ResourceState<Vec<Product>>,

    pub status_message: Option<String>,
    pub toasts: VecDeque<Toast>,

    ctx: ResourceContext<CacheManager>,
    api: ApiClient,
    settings: Settings,
    catalogue: Catalogue,
    sync: SyncManager<ApiClient, CacheManager>,

    settings_rx: watch::Receiver<ResourceState<ReceiptSettings>>,
    catalogue_rx: watch::Receiver<ResourceState<Vec<Product>>>,
    toast_rx: broadcast::Receiver<Toast>,
    result_tx: mpsc::Sender<BackgroundResult>,
    result_rx: mpsc::Receiver<BackgroundResult>,
    tasks: Vec<JoinHandle<()>>,
}

impl App {
    /// Build the app. Nothing touches the network until `start`.
    pub fn new(config: Config, api: ApiClient, store: CacheManager, online: bool) -> Self {
        let ctx = ResourceContext::new(store, Connectivity::new(online), Notifier::new());
        let outbox = MutationQueue::restore(ctx.store.clone());

        let mut settings_source = TableRow::new(api.clone());
        let mut catalogue_source = TableRows::new(api.clone(), "products").order("name.asc");
        if let Some(ref store_id) = config.store_id {
            settings_source = settings_source.eq("store_id", store_id);
            catalogue_source = catalogue_source.eq("store_id", store_id);
        }

        let settings = CachedResource::new(settings_source, ctx.clone()).with_outbox(outbox.clone());
        let catalogue = CachedResource::new(catalogue_source, ctx.clone());
        let sync = SyncManager::new(api.clone(), outbox, &ctx);
        sync.track(settings.clone());

        let settings_rx = settings.subscribe();
        let catalogue_rx = catalogue.subscribe();
        let toast_rx = ctx.notifier.subscribe();
        let (result_tx, result_rx) = mpsc::channel(CHANNEL_BUFFER_SIZE);

        Self {
            config,
            state: AppState::Normal,
            selection: 0,
            cart: Cart::new(),
            payment_method: PaymentMethod::Cash,
            last_sale: None,
            settings_state: ResourceState::default(),
            catalogue_state: ResourceState::default(),
            status_message: None,
            toasts: VecDeque::new(),
            ctx,
            api,
            settings,
            catalogue,
            sync,
            settings_rx,
            catalogue_rx,
            toast_rx,
            result_tx,
            result_rx,
            tasks: Vec::new(),
        }
    }

    /// Show cached data, then (unless working offline) fetch and start probing.
    pub fn start(&mut self) {
        if self.config.offline_mode {
            info!("Offline mode - showing cached data only");
            self.settings.load_cached();
            self.catalogue.load_cached();
        } else {
            self.tasks.push(self.settings.start());
            self.tasks.push(self.catalogue.start());
            let interval = Duration::from_secs(self.config.probe_interval_secs.max(1));
            self.tasks
                .push(self.ctx.connectivity.spawn_probe(self.api.clone(), interval));
        }
        self.tasks.push(self.sync.spawn_auto_sync());
        self.check_background_tasks();
    }

    // =========================================================================
    // Background results
    // =========================================================================

    /// Fold everything background tasks produced since the last tick into the UI state.
    pub fn check_background_tasks(&mut self) {
        if self.settings_rx.has_changed().unwrap_or(false) {
            self.settings_state = self.settings_rx.borrow_and_update().clone();
        }
        if self.catalogue_rx.has_changed().unwrap_or(false) {
            self.catalogue_state = self.catalogue_rx.borrow_and_update().clone();
            self.selection = self.selection.min(self.products().len().saturating_sub(1));
        }

        loop {
            match self.toast_rx.try_recv() {
                Ok(toast) => {
                    self.toasts.push_back(toast);
                    while self.toasts.len() > MAX_TOASTS {
                        self.toasts.pop_front();
                    }
                }
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    debug!(skipped, "Toasts dropped");
                }
                Err(_) => break,
            }
        }
        let now = Utc::now();
        self.toasts
            .retain(|t| (now - t.created_at).num_seconds() < TOAST_TTL_SECS);

        while let Ok(result) = self.result_rx.try_recv() {
            self.process_result(result);
        }

        self.tasks.retain(|t| !t.is_finished());
    }

    fn process_result(&mut self, result: BackgroundResult) {
        match result {
            BackgroundResult::SettingsSaved(Ok(UpdateOutcome::Applied(_))) => {
                self.status_message = None;
            }
            BackgroundResult::SettingsSaved(Ok(UpdateOutcome::Queued(_))) => {
                self.status_message = Some("Settings change queued".to_string());
            }
            BackgroundResult::SettingsSaved(Err(e)) => {
                self.status_message = Some(e.to_string());
            }
            BackgroundResult::Synced(Ok(report)) if report.remaining > 0 => {
                self.status_message = Some(format!("{} change(s) still pending", report.remaining));
            }
            BackgroundResult::Synced(Ok(_)) => {
                self.status_message = None;
            }
            BackgroundResult::Synced(Err(e)) => {
                self.status_message = Some(e.to_string());
            }
        }
    }

    fn spawn_reporting<F>(&mut self, work: F)
    where
        F: std::future::Future<Output = BackgroundResult> + Send + 'static,
    {
        let tx = self.result_tx.clone();
        self.tasks.push(tokio::spawn(async move {
            if tx.send(work.await).await.is_err() {
                warn!("App channel closed, dropping background result");
            }
        }));
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn products(&self) -> &[Product] {
        self.catalogue_state.value.as_deref().unwrap_or(&[])
    }

    pub fn selected_product(&self) -> Option<&Product> {
        self.products().get(self.selection)
    }

    pub fn receipt_settings(&self) -> Option<&ReceiptSettings> {
        self.settings_state.value.as_ref()
    }

    pub fn tax_rate_bps(&self) -> u32 {
        self.receipt_settings().map_or(0, |s| s.tax_rate_bps)
    }

    pub fn currency(&self) -> &str {
        self.receipt_settings().map_or("USD", |s| s.currency.as_str())
    }

    pub fn money(&self, cents: i64) -> String {
        format_cents(cents, self.currency())
    }

    pub fn is_online(&self) -> bool {
        self.ctx.connectivity.is_online()
    }

    pub fn indicator(&self) -> Option<SyncIndicator> {
        SyncIndicator::from_state(&self.sync.state())
    }

    pub fn pending_count(&self) -> usize {
        self.sync.queue().len()
    }

    // =========================================================================
    // Navigation
    // =========================================================================

    pub fn select_next(&mut self) {
        let len = self.products().len();
        if len > 0 {
            self.selection = (self.selection + 1).min(len - 1);
        }
    }

    pub fn select_prev(&mut self) {
        self.selection = self.selection.saturating_sub(1);
    }

    // =========================================================================
    // Cart
    // =========================================================================

    pub fn add_selected(&mut self) {
        let Some(product) = self.selected_product().cloned() else {
            return;
        };
        self.status_message = match self.cart.add(&product, 1) {
            Ok(()) => None,
            Err(e) => Some(e.to_string()),
        };
    }

    pub fn decrement_selected(&mut self) {
        let Some(id) = self.selected_product().map(|p| p.id.clone()) else {
            return;
        };
        self.status_message = self.cart.decrement(&id).err().map(|e| e.to_string());
    }

    pub fn clear_cart(&mut self) {
        self.cart.clear();
        self.status_message = Some("Cart cleared".to_string());
    }

    pub fn cycle_payment_method(&mut self) {
        self.payment_method = self.payment_method.next();
    }

    /// Close the sale and queue it for the backend.
    pub fn checkout(&mut self) {
        let Some(settings) = self.settings_state.value.clone() else {
            self.status_message = Some("Receipt settings not loaded - cannot check out".to_string());
            return;
        };

        let sale = match self.cart.checkout(&settings, self.payment_method) {
            Ok(sale) => sale,
            Err(e) => {
                self.status_message = Some(e.to_string());
                return;
            }
        };

        match PendingMutation::upsert(SALES_TABLE, &sale) {
            Ok(mutation) => {
                self.sync.queue().enqueue(mutation);
                info!(sale_id = %sale.id, total_cents = sale.total_cents, "Sale recorded");
                self.status_message = Some(format!(
                    "Sale recorded - {} {}",
                    self.money(sale.total_cents),
                    sale.payment_method.display_name()
                ));
                self.last_sale = Some(sale);
                if self.is_online() {
                    self.sync_now();
                }
            }
            Err(e) => {
                warn!(error = %e, "Failed to encode sale");
                self.status_message = Some(format!("Failed to record sale: {}", e));
            }
        }
    }

    // =========================================================================
    // Backend actions
    // =========================================================================

    pub fn refresh_all(&mut self) {
        let settings = self.settings.clone();
        let catalogue = self.catalogue.clone();
        self.status_message = Some("Refreshing...".to_string());
        self.tasks.push(tokio::spawn(async move {
            futures::future::join(settings.refresh(), catalogue.refresh()).await;
        }));
    }

    /// Flip whether the logo prints on receipts.
    pub fn toggle_logo(&mut self) {
        let Some(mut edited) = self.settings_state.value.clone() else {
            self.status_message = Some("No settings found".to_string());
            return;
        };
        edited.show_logo = !edited.show_logo;
        let settings = self.settings.clone();
        self.spawn_reporting(async move {
            BackgroundResult::SettingsSaved(settings.update(edited).await)
        });
    }

    pub fn sync_now(&mut self) {
        match self.indicator() {
            None => {
                self.status_message = Some("Nothing to sync".to_string());
            }
            Some(SyncIndicator::Offline { .. }) => {
                self.status_message =
                    Some("Offline - changes will sync when back online".to_string());
            }
            Some(indicator) if !indicator.sync_enabled() => {}
            Some(_) => {
                let sync = self.sync.clone();
                self.spawn_reporting(async move { BackgroundResult::Synced(sync.sync_all().await) });
            }
        }
    }
}

impl Drop for App {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}
