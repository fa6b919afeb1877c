//! Crawler façade (§4.13): the public handle a caller holds for one crawl.
//! Thin by design — it delegates lifecycle transitions to [`Lifecycle`],
//! events to [`EventBus`], and metrics to [`JobMetrics`], exposing exactly
//! the §6 outward interface.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;

use crate::error::CrawlError;
use crate::events::{CrawlEvent, EventBus, EventHandler};
use crate::frontier::Frontier;
use crate::lifecycle::{Lifecycle, LifecycleState};
use crate::ports::{JobLogger, TracingJobLogger};
use crate::state::{JobMetrics, MetricsSnapshot};

/// Default grace period `Stop` gives the drain loop beyond the post-cancel
/// window before reporting a timeout, absent a caller-supplied one.
const DEFAULT_STOP_CLEANUP_TIMEOUT: Duration = Duration::from_secs(5);

/// One crawl job. Created by [`crate::factory::Factory::create`]; not
/// constructed directly outside the crate.
pub struct Crawler {
    source_id: String,
    lifecycle: Arc<Lifecycle>,
    events: Arc<EventBus>,
    metrics: Arc<JobMetrics>,
    start_url_hashes: Arc<RwLock<HashMap<String, String>>>,
    logger: RwLock<Arc<dyn JobLogger>>,
}

impl Crawler {
    pub(crate) fn new(
        source_id: String,
        lifecycle: Arc<Lifecycle>,
        events: Arc<EventBus>,
        metrics: Arc<JobMetrics>,
        start_url_hashes: Arc<RwLock<HashMap<String, String>>>,
    ) -> Self {
        let logger: Arc<dyn JobLogger> = Arc::new(TracingJobLogger {
            source_id: source_id.clone(),
        });
        Self {
            source_id,
            lifecycle,
            events,
            metrics,
            start_url_hashes,
            logger: RwLock::new(logger),
        }
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    /// Begin crawling `source_id`. Returns once the seed has been admitted
    /// and the initial page either completed or timed out with a warning
    /// (§4.10); the drain to completion continues in the background and is
    /// observed via [`Crawler::wait`] / [`Crawler::done`].
    pub async fn start(self: &Arc<Self>) -> Result<(), CrawlError> {
        self.lifecycle.start(self.source_id.clone()).await
    }

    /// Request cancellation and wait up to the post-cancel grace window
    /// plus `cleanup_timeout` for the drain to settle.
    pub async fn stop(&self, cleanup_timeout: Duration) -> Result<(), CrawlError> {
        self.lifecycle.stop(cleanup_timeout).await
    }

    /// `Stop` with the default cleanup timeout (§5).
    pub async fn stop_default(&self) -> Result<(), CrawlError> {
        self.lifecycle.stop(DEFAULT_STOP_CLEANUP_TIMEOUT).await
    }

    /// Blocks until the current (or most recently started) run reaches
    /// `Stopped`.
    pub async fn wait(&self) {
        self.lifecycle.wait().await
    }

    /// A receiver that resolves once the run is done, for callers who don't
    /// want to block on [`Crawler::wait`] directly.
    pub fn done(&self) -> tokio::sync::watch::Receiver<bool> {
        self.lifecycle.done_receiver()
    }

    pub fn is_running(&self) -> bool {
        self.lifecycle.is_running()
    }

    pub async fn state(&self) -> LifecycleState {
        self.lifecycle.state().await
    }

    pub fn frontier(&self) -> Arc<Frontier> {
        self.lifecycle.frontier()
    }

    /// Register a handler invoked synchronously on every emitted event
    /// (§6 `Subscribe`).
    pub async fn subscribe(&self, handler: EventHandler) {
        self.events.subscribe(handler).await;
    }

    /// A broadcast receiver for consumers that prefer polling a channel
    /// over registering a synchronous callback.
    pub fn subscribe_channel(&self) -> tokio::sync::broadcast::Receiver<CrawlEvent> {
        self.events.subscribe_channel()
    }

    pub async fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot().await
    }

    /// SHA-256 hex digest of every seed URL's response body captured so far
    /// for this source, keyed by source id (§3 `GetStartURLHashes`).
    pub async fn start_url_hashes(&self) -> HashMap<String, String> {
        self.start_url_hashes.read().await.clone()
    }

    pub async fn set_job_logger(&self, logger: Arc<dyn JobLogger>) {
        *self.logger.write().await = logger;
    }

    /// Tune the per-host delay at runtime without restarting the crawl
    /// (§6 `SetRateLimit`). Always succeeds today; the `Result` is kept so
    /// a future validating implementation doesn't break the signature.
    pub async fn set_rate_limit(&self, delay: Duration) -> Result<(), CrawlError> {
        self.lifecycle.scheduler().set_rate_limit(delay).await;
        Ok(())
    }

    pub async fn log(&self, category: crate::ports::LogCategory, message: &str) {
        self.logger.read().await.log(category, message, &HashMap::new());
    }
}
