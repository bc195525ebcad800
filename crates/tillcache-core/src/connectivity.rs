//! Process-wide online/offline signal.
//!
//! `Connectivity` is a cheap-to-clone handle over a `tokio::sync::watch`
//! channel. Every cached resource and the sync manager hold a clone, so they
//! all observe the same transition at the same time. The flag is fed by a
//! periodic reachability probe and by the outcome of real requests.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Something that can tell whether the backend is reachable right now.
pub trait HealthProbe: Send + Sync + 'static {
    fn is_reachable(&self) -> impl Future<Output = bool> + Send;
}

#[derive(Clone)]
pub struct Connectivity {
    tx: Arc<watch::Sender<bool>>,
}

impl Connectivity {
    pub fn new(initially_online: bool) -> Self {
        let (tx, _rx) = watch::channel(initially_online);
        Self { tx: Arc::new(tx) }
    }

    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    /// Update the flag. Subscribers are only woken on an actual transition.
    pub fn set_online(&self, online: bool) {
        let changed = self.tx.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });
        if changed {
            if online {
                info!("Backend reachable - back online");
            } else {
                info!("Backend unreachable - working offline");
            }
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    /// Poll `probe` every `interval` and feed the result into the flag.
    ///
    /// The task runs until aborted through the returned handle.
    pub fn spawn_probe<P: HealthProbe>(&self, probe: P, interval: Duration) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let reachable = probe.is_reachable().await;
                debug!(reachable, "Connectivity probe");
                this.set_online(reachable);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct FlagProbe(Arc<AtomicBool>);

    impl HealthProbe for FlagProbe {
        async fn is_reachable(&self) -> bool {
            self.0.load(Ordering::SeqCst)
        }
    }

    #[tokio::test]
    async fn test_subscribers_see_transitions_only() {
        let connectivity = Connectivity::new(true);
        let mut rx = connectivity.subscribe();

        connectivity.set_online(true);
        assert!(!rx.has_changed().unwrap());

        connectivity.set_online(false);
        assert!(rx.has_changed().unwrap());
        assert!(!*rx.borrow_and_update());
        assert!(!connectivity.is_online());
    }

    #[tokio::test]
    async fn test_clones_share_one_flag() {
        let a = Connectivity::new(true);
        let b = a.clone();
        b.set_online(false);
        assert!(!a.is_online());
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_drives_flag() {
        let reachable = Arc::new(AtomicBool::new(false));
        let connectivity = Connectivity::new(true);
        let mut rx = connectivity.subscribe();

        let handle = connectivity.spawn_probe(FlagProbe(reachable.clone()), Duration::from_secs(30));
        rx.changed().await.unwrap();
        assert!(!connectivity.is_online());

        reachable.store(true, Ordering::SeqCst);
        rx.changed().await.unwrap();
        assert!(connectivity.is_online());

        handle.abort();
    }
}
