use anyhow::{Context, Result};
use keyring::Entry;

const SERVICE_NAME: &str = "tillcache";

pub const ENV_API_KEY: &str = "TILLCACHE_API_KEY";

/// API keys in the OS keychain, one entry per backend.
pub struct CredentialStore;

impl CredentialStore {
    fn entry(backend_url: &str) -> Result<Entry> {
        Entry::new(SERVICE_NAME, &account_for(backend_url)).context("Failed to create keyring entry")
    }

    /// Store the API key for a backend in the OS keychain
    pub fn store_api_key(backend_url: &str, api_key: &str) -> Result<()> {
        Self::entry(backend_url)?
            .set_password(api_key)
            .context("Failed to store API key in keychain")?;
        Ok(())
    }

    pub fn api_key(backend_url: &str) -> Result<String> {
        Self::entry(backend_url)?
            .get_password()
            .context("Failed to retrieve API key from keychain")
    }

    pub fn delete_api_key(backend_url: &str) -> Result<()> {
        Self::entry(backend_url)?
            .delete_credential()
            .context("Failed to delete API key from keychain")?;
        Ok(())
    }

    pub fn has_api_key(backend_url: &str) -> bool {
        Self::entry(backend_url)
            .and_then(|entry| Ok(entry.get_password()?))
            .is_ok()
    }

    /// The environment variable wins over the keychain.
    pub fn resolve_api_key(backend_url: &str) -> Result<String> {
        match std::env::var(ENV_API_KEY) {
            Ok(key) if !key.trim().is_empty() => Ok(key),
            _ => Self::api_key(backend_url).with_context(|| {
                format!("No API key for {} - run with --set-api-key or set {}", backend_url, ENV_API_KEY)
            }),
        }
    }
}

/// Keychain account name for a backend: its URL without scheme or trailing slash.
fn account_for(backend_url: &str) -> String {
    let url = backend_url.trim();
    let url = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .unwrap_or(url);
    url.trim_end_matches('/').to_lowercase()
}
