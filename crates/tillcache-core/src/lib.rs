//! tillcache core - offline-aware data layer for a point-of-sale till.
//!
//! Reference data (receipt settings, the product catalogue) is served
//! cache-first by `CachedResource` and refreshed in the background. Writes
//! go through to the backend and the cache; writes made while the backend
//! is out of reach wait in a `MutationQueue` until `SyncManager` replays
//! them. `Connectivity` carries the online flag every component shares, and
//! `SyncIndicator` turns it into something to show.

pub mod api;
pub mod auth;
pub mod cache;
pub mod config;
pub mod connectivity;
pub mod context;
pub mod error;
pub mod indicator;
pub mod models;
pub mod notify;
pub mod resource;
pub mod sync;
pub mod utils;

pub use api::{ApiClient, RemoteError};
pub use cache::{CacheManager, CacheStore, Cacheable, CachedData, MemoryStore};
pub use config::Config;
pub use connectivity::{Connectivity, HealthProbe};
pub use context::ResourceContext;
pub use error::{ResourceError, SyncError};
pub use indicator::SyncIndicator;
pub use notify::{Notifier, Toast, ToastLevel};
pub use resource::{
    offline_message, CachedResource, CatalogueResource, Phase, ResourceState, SettingsResource,
    UpdateOutcome, ValueSource,
};
pub use sync::{MutationQueue, ReplayTarget, SyncManager, SyncReport};
