//! Crawler factory (§4.14): mints isolated [`Crawler`] instances from one
//! immutable parameter set. Each instance gets its own frontier, visited
//! set, scheduler, and metrics; all instances share the parent's
//! `start_url_hashes` map so a caller can look up any past or in-flight
//! source's seed hash regardless of which instance handled it.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::config::CrawlerConfig;
use crate::crawler::Crawler;
use crate::error::CrawlError;
use crate::events::EventBus;
use crate::frontier::Frontier;
use crate::lifecycle::Lifecycle;
use crate::ports::{Archiver, LinkSink, Processor, SourceStore};
use crate::scheduler::Scheduler;
use crate::state::JobMetrics;
use crate::visited::build_visited_store;

/// Shared, immutable collaborators handed to every [`Crawler`] the factory
/// mints. Mirrors the constructor-injection pattern of this codebase's own
/// service wiring: one parameter bag assembled once at startup.
pub struct Factory {
    source_store: Arc<dyn SourceStore>,
    archiver: Option<Arc<dyn Archiver>>,
    processors: Vec<Arc<dyn Processor>>,
    link_sink: Option<Arc<dyn LinkSink>>,
    config: CrawlerConfig,
    start_url_hashes: Arc<RwLock<HashMap<String, String>>>,
}

impl Factory {
    pub fn new(
        source_store: Arc<dyn SourceStore>,
        archiver: Option<Arc<dyn Archiver>>,
        processors: Vec<Arc<dyn Processor>>,
        link_sink: Option<Arc<dyn LinkSink>>,
        config: CrawlerConfig,
    ) -> Self {
        Self {
            source_store,
            archiver,
            processors,
            link_sink,
            config,
            start_url_hashes: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Build a new, independent [`Crawler`] for `source_id`. Safe to call
    /// concurrently; each call gets its own frontier, visited set, and
    /// scheduler so crawls never share in-flight state, only the start-URL
    /// hash map.
    pub async fn create(&self, source_id: impl Into<String>) -> Result<Arc<Crawler>, CrawlError> {
        let source_id = source_id.into();
        let frontier = Arc::new(Frontier::new());
        let visited = build_visited_store(&self.config.external_store, &source_id).await;
        let metrics = Arc::new(JobMetrics::new());
        let events = Arc::new(EventBus::new());

        let scheduler = Arc::new(Scheduler::new(
            self.config.clone(),
            frontier.clone(),
            visited,
            metrics.clone(),
            events.clone(),
            self.start_url_hashes.clone(),
            self.archiver.clone(),
            self.processors.clone(),
            self.link_sink.clone(),
        )?);

        let lifecycle = Arc::new(Lifecycle::new(
            scheduler,
            frontier,
            metrics.clone(),
            self.source_store.clone(),
            self.config.clone(),
        ));

        Ok(Arc::new(Crawler::new(
            source_id,
            lifecycle,
            events,
            metrics,
            self.start_url_hashes.clone(),
        )))
    }

    /// The seed-URL body hash recorded for `source_id` by any crawler this
    /// factory has minted, or `None` if that source hasn't completed a seed
    /// fetch yet.
    pub async fn start_url_hash(&self, source_id: &str) -> Option<String> {
        self.start_url_hashes.read().await.get(source_id).cloned()
    }
}
