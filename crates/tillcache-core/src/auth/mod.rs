//! Credential handling.
//!
//! The till authenticates to the backend with the project's API key, kept in
//! the OS keychain via `CredentialStore` and overridable with the
//! `TILLCACHE_API_KEY` environment variable. Sign-in flows live elsewhere.

pub mod credentials;

pub use credentials::{CredentialStore, ENV_API_KEY};
