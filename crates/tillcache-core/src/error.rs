use thiserror::Error;

use crate::api::RemoteError;

/// Errors from writing through a cached resource.
#[derive(Error, Debug)]
pub enum ResourceError {
    /// A write was attempted before any value was loaded
    #[error("No {resource} found")]
    NotLoaded { resource: &'static str },

    #[error("The {resource} were changed elsewhere - reload and try again")]
    Conflict { resource: &'static str },

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("Failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Errors from a sync pass.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum SyncError {
    #[error("Cannot sync while offline")]
    Offline,

    #[error("A sync is already in progress")]
    AlreadySyncing,
}
