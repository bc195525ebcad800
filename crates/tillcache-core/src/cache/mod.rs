//! Local caching module for offline data access.
//!
//! This module provides the `CacheStore` trait and its two backends:
//! - `CacheManager`: one JSON file per key under the cache directory
//! - `MemoryStore`: process-local map, used for ephemeral sessions and tests
//!
//! Every cached value is wrapped in `CachedData` so its age can be shown
//! while working offline. Cache writes are best-effort at every call site:
//! a failed save is logged and never fails the caller.

pub mod manager;
pub mod memory;
pub mod traits;

pub use manager::{CacheManager, CachedData};
pub use memory::MemoryStore;
pub use traits::{CacheStore, Cacheable};
