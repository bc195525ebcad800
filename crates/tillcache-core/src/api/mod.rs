//! REST API module for the hosted backend.
//!
//! This module provides the `ApiClient` for talking to a PostgREST-style
//! table API, the `RemoteError` taxonomy, and the traits the cache and sync
//! layers consume instead of the concrete client:
//!
//! - `RemoteSource`: fetch the current value of a resource
//! - `RemoteWriter`: write a record back, guarded by a version token
//! - `MutationSink`: replay a queued `PendingMutation`

pub mod client;
pub mod error;

use std::future::Future;

pub use client::{ApiClient, TableRow, TableRows};
pub use error::RemoteError;

use crate::models::PendingMutation;

/// Read side of a remote-backed resource.
pub trait RemoteSource<T>: Send + Sync + 'static {
    fn fetch(&self) -> impl Future<Output = Result<T, RemoteError>> + Send;
}

/// Write side of a remote-backed record.
pub trait RemoteWriter<T>: RemoteSource<T> {
    /// Replace the record and return the row as stored by the server.
    ///
    /// When `expected_version` is set the write only applies if the server
    /// row still has that version; otherwise `RemoteError::Conflict`.
    fn update(
        &self,
        record_id: &str,
        record: &T,
        expected_version: Option<&str>,
    ) -> impl Future<Output = Result<T, RemoteError>> + Send;
}

/// Destination for queued mutations.
pub trait MutationSink: Send + Sync + 'static {
    /// Replay one mutation.
    ///
    /// Returns the row as the server stored it when the backend sends one
    /// back (updates do; upserts and deletes return `None`).
    fn apply(
        &self,
        mutation: &PendingMutation,
    ) -> impl Future<Output = Result<Option<serde_json::Value>, RemoteError>> + Send;
}
