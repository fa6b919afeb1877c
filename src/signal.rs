//! Signal coordinator (§4.11): a single-shot abort broadcast plus a periodic
//! cleanup ticker.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

/// Idempotent-close abort signal plus the cleanup ticker task handle.
pub struct SignalCoordinator {
    abort_tx: watch::Sender<bool>,
    abort_rx: watch::Receiver<bool>,
}

impl SignalCoordinator {
    pub fn new() -> Self {
        let (abort_tx, abort_rx) = watch::channel(false);
        Self { abort_tx, abort_rx }
    }

    /// Close the abort signal. Idempotent: a second call is a no-op.
    pub fn abort(&self) {
        let _ = self.abort_tx.send(true);
    }

    pub fn is_aborted(&self) -> bool {
        *self.abort_rx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.abort_rx.clone()
    }

    /// Wait until the abort signal fires.
    pub async fn aborted(&self) {
        let mut rx = self.abort_rx.clone();
        while !*rx.borrow() {
            if rx.changed().await.is_err() {
                break;
            }
        }
    }

    /// Spawn the periodic cleanup task (§4.11). The interval is validated
    /// positive by the caller (`CrawlerConfig::validated_cleanup_interval`).
    /// The loop exits on abort, checked *inside* the loop body so it never
    /// blocks indefinitely on the ticker.
    pub fn spawn_cleanup_ticker<F, Fut>(
        self: &Arc<Self>,
        interval: Duration,
        mut cleanup: F,
    ) -> JoinHandle<()>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let coordinator = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // first tick fires immediately; skip it
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if coordinator.is_aborted() {
                            debug!("signal coordinator: aborted, exiting cleanup loop");
                            break;
                        }
                        cleanup().await;
                    }
                    _ = coordinator.aborted() => {
                        debug!("signal coordinator: abort received, exiting cleanup loop");
                        break;
                    }
                }
            }
        })
    }
}

impl Default for SignalCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
