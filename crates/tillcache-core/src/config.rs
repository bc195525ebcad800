//! Application configuration management.
//!
//! This module handles loading and saving the till configuration: which
//! backend to talk to, which store this till belongs to, and how eagerly to
//! probe connectivity.
//!
//! Configuration is stored at `~/.config/tillcache/config.json`. The
//! `TILLCACHE_URL` and `TILLCACHE_STORE_ID` environment variables override
//! the file.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::cache::manager::CACHE_STALE_MINUTES;

/// Application name used for config/cache directory paths
const APP_NAME: &str = "tillcache";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Seconds between reachability probes
const DEFAULT_PROBE_INTERVAL_SECS: u64 = 30;

pub const ENV_URL: &str = "TILLCACHE_URL";
pub const ENV_STORE_ID: &str = "TILLCACHE_STORE_ID";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub backend_url: Option<String>,
    #[serde(default)]
    pub store_id: Option<String>,
    /// Start without touching the network
    #[serde(default)]
    pub offline_mode: bool,
    #[serde(default = "default_probe_interval")]
    pub probe_interval_secs: u64,
    #[serde(default = "default_stale_minutes")]
    pub cache_stale_minutes: i64,
}

fn default_probe_interval() -> u64 {
    DEFAULT_PROBE_INTERVAL_SECS
}

fn default_stale_minutes() -> i64 {
    CACHE_STALE_MINUTES
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend_url: None,
            store_id: None,
            offline_mode: false,
            probe_interval_secs: DEFAULT_PROBE_INTERVAL_SECS,
            cache_stale_minutes: CACHE_STALE_MINUTES,
        }
    }
}

impl Config {
    /// Load the config file (defaults when missing) and apply environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path()?)?;
        config.apply_overrides(std::env::var(ENV_URL).ok(), std::env::var(ENV_STORE_ID).ok());
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config: {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config: {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Non-empty values replace what the file says.
    pub fn apply_overrides(&mut self, backend_url: Option<String>, store_id: Option<String>) {
        if let Some(url) = backend_url.filter(|v| !v.trim().is_empty()) {
            self.backend_url = Some(url);
        }
        if let Some(store) = store_id.filter(|v| !v.trim().is_empty()) {
            self.store_id = Some(store);
        }
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Cache directory, one subdirectory per store so tills never mix data.
    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(self.cache_dir_under(&cache_dir.join(APP_NAME)))
    }

    fn cache_dir_under(&self, root: &Path) -> PathBuf {
        match self.store_id {
            Some(ref store) => root.join(store),
            None => root.to_path_buf(),
        }
    }
}
