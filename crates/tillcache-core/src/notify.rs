//! User-visible toasts.
//!
//! Sending is fire-and-forget: a toast with nobody listening is dropped.

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tracing::debug;

/// How many toasts a slow subscriber may fall behind before losing some.
const TOAST_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastLevel {
    Info,
    Success,
    Error,
}

#[derive(Debug, Clone)]
pub struct Toast {
    pub level: ToastLevel,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct Notifier {
    tx: broadcast::Sender<Toast>,
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(TOAST_CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Toast> {
        self.tx.subscribe()
    }

    pub fn notify(&self, level: ToastLevel, message: impl Into<String>) {
        let toast = Toast {
            level,
            message: message.into(),
            created_at: Utc::now(),
        };
        if self.tx.send(toast).is_err() {
            debug!("Toast dropped - no subscribers");
        }
    }

    pub fn info(&self, message: impl Into<String>) {
        self.notify(ToastLevel::Info, message);
    }

    pub fn success(&self, message: impl Into<String>) {
        self.notify(ToastLevel::Success, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.notify(ToastLevel::Error, message);
    }
}
