//! Core traits for the caching system.

use anyhow::Result;
use serde::{de::DeserializeOwned, Serialize};

use super::CachedData;

/// Trait for values that can be cached locally and refreshed from the backend.
pub trait Cacheable: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
    /// Key the value is stored under in the local cache (e.g., "receipt_settings")
    fn cache_key() -> &'static str;

    /// Human-readable name used in user-facing messages (e.g., "settings")
    fn label() -> &'static str;
}

/// Trait for local durable key-value stores.
///
/// A missing key is `Ok(None)`, not an error.
pub trait CacheStore: Send + Sync + 'static {
    /// Load a cached value with its metadata.
    fn load<T: DeserializeOwned>(&self, key: &str) -> Result<Option<CachedData<T>>>;

    /// Store a value, stamping it with the current time.
    fn save<T: Serialize>(&self, key: &str, data: &T) -> Result<()>;

    /// Remove a cached value. Removing a missing key succeeds.
    fn remove(&self, key: &str) -> Result<()>;
}
