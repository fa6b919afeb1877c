//! Lifecycle controller (§4.10): the Idle → Validating → Warming → Draining
//! → Stopped state machine driving one crawl from `Start` to `Done`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use tokio::sync::{watch, Notify, RwLock};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::config::CrawlerConfig;
use crate::error::CrawlError;
use crate::frontier::Frontier;
use crate::link_handler::Admitter;
use crate::ports::SourceStore;
use crate::redirect_guard;
use crate::scheduler::Scheduler;
use crate::signal::SignalCoordinator;
use crate::state::JobMetrics;
use crate::types::{CrawlContext, FrontierEntry, Rule};
use crate::url_classifier;

/// How long `Start` waits for the "initial page ready" signal before
/// logging a warning and proceeding anyway (§5).
const INITIAL_PAGE_WARN_TIMEOUT: Duration = Duration::from_secs(30);

/// Grace window given to in-flight fetches after an abort before `Stop`
/// gives up waiting (§5).
const POST_CANCEL_GRACE: Duration = Duration::from_secs(2);

/// A configured `max_depth` above this value gets a warn log at start (§3).
const MAX_DEPTH_WARN_THRESHOLD: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Idle,
    Validating,
    Warming,
    Draining,
    Stopped,
}

/// Drives one `Start`/`Stop` cycle of a crawl. Owned by the `Crawler` façade
/// (§4.13); not exposed outside the crate.
pub struct Lifecycle {
    scheduler: Arc<Scheduler>,
    frontier: Arc<Frontier>,
    metrics: Arc<JobMetrics>,
    source_store: Arc<dyn SourceStore>,
    config: CrawlerConfig,
    state: RwLock<LifecycleState>,
    signal: RwLock<Arc<SignalCoordinator>>,
    done_tx: RwLock<watch::Sender<bool>>,
    done_rx: watch::Receiver<bool>,
    running: AtomicBool,
}

impl Lifecycle {
    pub fn new(
        scheduler: Arc<Scheduler>,
        frontier: Arc<Frontier>,
        metrics: Arc<JobMetrics>,
        source_store: Arc<dyn SourceStore>,
        config: CrawlerConfig,
    ) -> Self {
        let (done_tx, done_rx) = watch::channel(false);
        Self {
            scheduler,
            frontier,
            metrics,
            source_store,
            config,
            state: RwLock::new(LifecycleState::Idle),
            signal: RwLock::new(Arc::new(SignalCoordinator::new())),
            done_tx: RwLock::new(done_tx),
            done_rx,
            running: AtomicBool::new(false),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn done_receiver(&self) -> watch::Receiver<bool> {
        self.done_rx.clone()
    }

    pub async fn state(&self) -> LifecycleState {
        *self.state.read().await
    }

    /// Steps 1-6 of §4.10's start sequence run inline so a bad source id or a
    /// cross-domain seed redirect surfaces synchronously to the caller; the
    /// drain (steps 7-8) is spawned in the background and observed via
    /// [`Lifecycle::done_receiver`] / [`Lifecycle::stop`]. Each instance is
    /// single-start (§4.14); a second call always fails.
    pub async fn start(self: &Arc<Self>, source_id: String) -> Result<(), CrawlError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(CrawlError::InvalidConfig {
                message: "crawler already running".to_string(),
                source: None,
            });
        }

        *self.state.write().await = LifecycleState::Validating;
        let signal = Arc::new(SignalCoordinator::new());
        *self.signal.write().await = signal.clone();

        self.metrics.reset().await;
        self.metrics.start().await;

        let cleanup_signal = signal.clone();
        let metrics_for_ticker = self.metrics.clone();
        cleanup_signal.spawn_cleanup_ticker(self.config.validated_cleanup_interval(), move || {
            let metrics = metrics_for_ticker.clone();
            async move {
                let pages = metrics.snapshot().await.pages_crawled;
                debug!(pages, "cleanup tick");
            }
        });

        let source = match self.source_store.by_id(&source_id).await {
            Ok(s) => s,
            Err(e) => {
                self.fail_start(&signal).await;
                return Err(e);
            }
        };

        if let Err(e) = redirect_guard::check(self.scheduler.redirect_guard_client(), &source).await {
            self.fail_start(&signal).await;
            return Err(e);
        }

        if source.max_depth > MAX_DEPTH_WARN_THRESHOLD {
            warn!(
                source_id = %source_id,
                max_depth = source.max_depth,
                "configured max depth is unusually high"
            );
        }

        let article_regexes: Vec<Regex> =
            url_classifier::compile_article_patterns(&source.article_url_patterns);
        let rules: Vec<Rule> = source
            .rule_patterns
            .iter()
            .filter_map(|(pattern, action)| match Regex::new(pattern) {
                Ok(re) => Some(Rule {
                    pattern: re,
                    action: *action,
                }),
                Err(e) => {
                    warn!(pattern = %pattern, error = %e, "dropping invalid rule pattern");
                    None
                }
            })
            .collect();

        let ctx = CrawlContext {
            source_id: source_id.clone(),
            source: Arc::new(source.clone()),
            article_regexes: Arc::new(article_regexes),
            rules: Arc::new(rules),
        };
        self.scheduler.set_context(ctx).await;

        *self.state.write().await = LifecycleState::Warming;

        let seed = source.url.clone();
        let initial_page_ready = Arc::new(Notify::new());
        let waiter = initial_page_ready.clone();
        let watched_seed = seed.clone();
        self.scheduler
            .set_on_page_complete(Arc::new(move |url: &Url| {
                if *url == watched_seed {
                    waiter.notify_waiters();
                }
            }))
            .await;

        if let Err(e) = self
            .scheduler
            .try_admit(FrontierEntry::seed(seed))
            .await
        {
            error!(error = %e, "seed admission failed");
            self.fail_start(&signal).await;
            return Err(e);
        }

        // The driver loop has to be running *before* we wait on initial-page-ready,
        // otherwise nothing would ever pop the seed off the frontier to fetch it.
        let run_handle = {
            let scheduler = self.scheduler.clone();
            let abort_rx = signal.subscribe();
            tokio::spawn(async move {
                scheduler.run(abort_rx).await;
            })
        };

        let this = self.clone();
        let drain_signal = signal.clone();
        let done_tx_for_task = self.done_tx.read().await.clone();
        tokio::spawn(async move {
            let mut abort_rx = drain_signal.subscribe();
            tokio::select! {
                _ = initial_page_ready.notified() => {
                    debug!("initial page ready");
                }
                _ = abort_rx.changed() => {
                    debug!("aborted before initial page ready");
                }
                _ = tokio::time::sleep(INITIAL_PAGE_WARN_TIMEOUT) => {
                    warn!("initial page not ready after {:?}, continuing", INITIAL_PAGE_WARN_TIMEOUT);
                }
            }

            *this.state.write().await = LifecycleState::Draining;
            let _ = run_handle.await;
            *this.state.write().await = LifecycleState::Stopped;
            drain_signal.abort();
            this.metrics.stop().await;
            this.scheduler.clear_context().await;
            this.running.store(false, Ordering::SeqCst);
            let _ = done_tx_for_task.send(true);
        });

        Ok(())
    }

    async fn fail_start(&self, signal: &Arc<SignalCoordinator>) {
        *self.state.write().await = LifecycleState::Stopped;
        signal.abort();
        self.metrics.stop().await;
        self.scheduler.clear_context().await;
        self.running.store(false, Ordering::SeqCst);
        let _ = self.done_tx.read().await.send(true);
    }

    /// No-op if not running. Otherwise requests abort and waits up to
    /// `grace + cleanup timeout` for the drain task to settle (§4.10, §5).
    pub async fn stop(&self, cleanup_timeout: Duration) -> Result<(), CrawlError> {
        if !self.is_running() {
            return Ok(());
        }

        let signal = self.signal.read().await.clone();
        signal.abort();

        let mut done_rx = self.done_tx.read().await.subscribe();
        let wait = tokio::time::timeout(POST_CANCEL_GRACE + cleanup_timeout, async {
            while !*done_rx.borrow() {
                if done_rx.changed().await.is_err() {
                    break;
                }
            }
        })
        .await;

        match wait {
            Ok(()) => Ok(()),
            Err(_) => Err(CrawlError::Timeout {
                message: "timed out waiting for crawl to stop".to_string(),
            }),
        }
    }

    /// Blocks until the current (or most recent) run's `Done` closes.
    pub async fn wait(&self) {
        let mut rx = self.done_tx.read().await.subscribe();
        while !*rx.borrow() {
            if rx.changed().await.is_err() {
                break;
            }
        }
    }

    pub fn frontier(&self) -> Arc<Frontier> {
        self.frontier.clone()
    }

    pub fn scheduler(&self) -> Arc<Scheduler> {
        self.scheduler.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventBus;
    use crate::types::{Selectors, Source};
    use crate::visited::InMemoryVisitedStore;
    use async_trait::async_trait;
    use std::time::Duration as StdDuration;

    struct StaticSourceStore(Source);

    #[async_trait]
    impl SourceStore for StaticSourceStore {
        async fn by_id(&self, _id: &str) -> Result<Source, CrawlError> {
            Ok(self.0.clone())
        }
    }

    fn make_lifecycle(seed: Url) -> Arc<Lifecycle> {
        let config = CrawlerConfig {
            respect_robots_txt: false,
            ..CrawlerConfig::default()
        };
        let frontier = Arc::new(Frontier::new());
        let visited = Arc::new(InMemoryVisitedStore::new());
        let metrics = Arc::new(JobMetrics::new());
        let events = Arc::new(EventBus::new());
        let hashes = Arc::new(RwLock::new(HashMap::new()));
        let scheduler = Arc::new(
            Scheduler::new(
                config.clone(),
                frontier.clone(),
                visited,
                metrics.clone(),
                events,
                hashes,
                None,
                vec![],
                None,
            )
            .unwrap(),
        );

        let source = Source {
            id: "s1".to_string(),
            name: "s1".to_string(),
            url: seed,
            start_urls: vec![],
            allowed_domains: vec![],
            rule_patterns: vec![],
            rate_limit: StdDuration::from_millis(1),
            max_depth: 1,
            selectors: Selectors::default(),
            article_url_patterns: vec![],
        };
        let source_store = Arc::new(StaticSourceStore(source));

        Arc::new(Lifecycle::new(scheduler, frontier, metrics, source_store, config))
    }

    #[tokio::test]
    async fn rejects_concurrent_start() {
        let lifecycle = make_lifecycle(Url::parse("https://no-such-host.invalid/").unwrap());
        lifecycle.start("s1".to_string()).await.unwrap();
        let second = lifecycle.start("s1".to_string()).await;
        assert!(matches!(second, Err(CrawlError::InvalidConfig { .. })));
        lifecycle.stop(StdDuration::from_secs(1)).await.unwrap();
    }

    #[tokio::test]
    async fn stop_is_a_no_op_when_not_running() {
        let lifecycle = make_lifecycle(Url::parse("https://no-such-host.invalid/").unwrap());
        assert!(lifecycle.stop(StdDuration::from_secs(1)).await.is_ok());
    }
}
