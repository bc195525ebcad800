use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use serde::{de::DeserializeOwned, Serialize};

use super::{CacheStore, CachedData};

/// In-memory cache store.
///
/// Values are kept serialized so a load behaves exactly like reading a file
/// written by `CacheManager`.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries
            .lock()
            .map(|entries| entries.contains_key(key))
            .unwrap_or(false)
    }
}

impl CacheStore for MemoryStore {
    fn load<T: DeserializeOwned>(&self, key: &str) -> Result<Option<CachedData<T>>> {
        let entries = self
            .entries
            .lock()
            .map_err(|e| anyhow!("Lock poisoned: {}", e))?;
        match entries.get(key) {
            Some(raw) => {
                let cached = serde_json::from_str(raw)
                    .with_context(|| format!("Failed to parse cached entry: {}", key))?;
                Ok(Some(cached))
            }
            None => Ok(None),
        }
    }

    fn save<T: Serialize>(&self, key: &str, data: &T) -> Result<()> {
        let raw = serde_json::to_string(&CachedData::new(data))?;
        self.entries
            .lock()
            .map_err(|e| anyhow!("Lock poisoned: {}", e))?
            .insert(key.to_string(), raw);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries
            .lock()
            .map_err(|e| anyhow!("Lock poisoned: {}", e))?
            .remove(key);
        Ok(())
    }
}
