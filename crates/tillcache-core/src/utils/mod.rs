//! Utility functions for display formatting.

pub mod format;

pub use format::{format_bps, format_cents, truncate_string};
