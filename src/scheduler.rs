//! Fetch scheduler (§4.9): asynchronous workers consuming the frontier,
//! with per-host concurrency via the rate limiter, robots/domain/depth
//! admission, and the response pipeline wired in as a sequence of stages
//! (§9 "callback-driven fetch engine → typed event pipeline").

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use scraper::{Html, Selector};
use tokio::sync::{Notify, RwLock};
use tracing::{debug, info, warn};
use url::Url;

use crate::config::{CrawlerConfig, USER_AGENT_POOL};
use crate::error::CrawlError;
use crate::events::{CrawlEvent, EventBus};
use crate::frontier::Frontier;
use crate::html_classifier;
use crate::link_handler::{self, Admitter};
use crate::ports::{Archiver, LinkSink, Processor};
use crate::response_pipeline::{self, HeaderGateDecision};
use crate::retry;
use crate::robots::RobotsManager;
use crate::rate_limiter::RateLimiter;
use crate::redirect_guard;
use crate::state::JobMetrics;
use crate::types::{ArchiveTask, CrawlContext, FetchResult, FrontierEntry, Page};
use crate::url_classifier;
use crate::visited::VisitedStore;

/// Every 50 pages, emit a milestone log line (§4.5 post-scrape hook).
const MILESTONE_INTERVAL: u64 = 50;

/// Parses `TLS { MinVersion, MaxVersion }` (§6) into reqwest's version enum.
/// An unrecognised string is dropped with a warning rather than failing
/// client construction.
fn parse_tls_version(raw: &str) -> Option<reqwest::tls::Version> {
    match raw.trim() {
        "1.0" => Some(reqwest::tls::Version::TLS_1_0),
        "1.1" => Some(reqwest::tls::Version::TLS_1_1),
        "1.2" => Some(reqwest::tls::Version::TLS_1_2),
        "1.3" => Some(reqwest::tls::Version::TLS_1_3),
        other => {
            warn!(value = %other, "unrecognised TLS version, ignoring");
            None
        }
    }
}

enum FetchOutcome {
    Gated,
    Body(FetchResult),
}

/// Wires every crawl-time collaborator together and drives the frontier.
pub struct Scheduler {
    config: CrawlerConfig,
    clients: Vec<Client>,
    client_idx: AtomicUsize,
    redirect_guard_client: Client,
    robots: Arc<RobotsManager>,
    rate_limiter: Arc<RateLimiter>,
    visited: Arc<dyn VisitedStore>,
    frontier: Arc<Frontier>,
    metrics: Arc<JobMetrics>,
    events: Arc<EventBus>,
    ctx: RwLock<Option<CrawlContext>>,
    admitted_count: AtomicU64,
    in_flight: AtomicU64,
    drained: Notify,
    start_url_hashes: Arc<RwLock<HashMap<String, String>>>,
    archiver: Option<Arc<dyn Archiver>>,
    processors: Vec<Arc<dyn Processor>>,
    link_sink: Option<Arc<dyn LinkSink>>,
    ua_idx: AtomicUsize,
    on_page_complete: RwLock<Option<Arc<dyn Fn(&Url) + Send + Sync>>>,
}

impl Scheduler {
    pub fn new(
        config: CrawlerConfig,
        frontier: Arc<Frontier>,
        visited: Arc<dyn VisitedStore>,
        metrics: Arc<JobMetrics>,
        events: Arc<EventBus>,
        start_url_hashes: Arc<RwLock<HashMap<String, String>>>,
        archiver: Option<Arc<dyn Archiver>>,
        processors: Vec<Arc<dyn Processor>>,
        link_sink: Option<Arc<dyn LinkSink>>,
    ) -> Result<Self, CrawlError> {
        let robots = RobotsManager::new(crate::robots::RobotsConfig {
            respect_robots: config.respect_robots_txt,
            user_agent: config.user_agent.clone(),
            ..Default::default()
        })
        .map_err(|e| CrawlError::invalid_config("failed to build robots manager", e))?;

        let clients = Self::build_clients(&config)?;
        let mut guard_builder = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(redirect_guard::REDIRECT_GUARD_TIMEOUT)
            .danger_accept_invalid_certs(config.tls.insecure_skip_verify)
            .redirect(reqwest::redirect::Policy::none());
        guard_builder = Self::apply_tls_versions(guard_builder, &config.tls);
        let redirect_guard_client = guard_builder
            .build()
            .map_err(|e| CrawlError::invalid_config("failed to build redirect-guard client", e.into()))?;
        if config.tls.insecure_skip_verify {
            warn!("TLS certificate verification disabled by configuration");
        }

        let rate_limiter = Arc::new(RateLimiter::new(
            config.rate_limit,
            config.parallelism,
        ));

        Ok(Self {
            config,
            clients,
            client_idx: AtomicUsize::new(0),
            redirect_guard_client,
            robots: Arc::new(robots),
            rate_limiter,
            visited,
            frontier,
            metrics,
            events,
            ctx: RwLock::new(None),
            admitted_count: AtomicU64::new(0),
            in_flight: AtomicU64::new(0),
            drained: Notify::new(),
            start_url_hashes,
            archiver,
            processors,
            link_sink,
            ua_idx: AtomicUsize::new(0),
            on_page_complete: RwLock::new(None),
        })
    }

    fn apply_tls_versions(
        mut builder: reqwest::ClientBuilder,
        tls: &crate::config::TlsConfig,
    ) -> reqwest::ClientBuilder {
        if let Some(v) = tls.min_version.as_deref().and_then(parse_tls_version) {
            builder = builder.min_tls_version(v);
        }
        if let Some(v) = tls.max_version.as_deref().and_then(parse_tls_version) {
            builder = builder.max_tls_version(v);
        }
        builder
    }

    fn build_clients(config: &CrawlerConfig) -> Result<Vec<Client>, CrawlError> {
        let build = |proxy: Option<&str>| -> Result<Client, CrawlError> {
            let mut builder = Client::builder()
                .user_agent(&config.user_agent)
                .timeout(config.request_timeout)
                .danger_accept_invalid_certs(config.tls.insecure_skip_verify)
                .redirect(reqwest::redirect::Policy::limited(10))
                .gzip(true)
                .brotli(true);
            builder = Self::apply_tls_versions(builder, &config.tls);
            if let Some(proxy_url) = proxy {
                let proxy = reqwest::Proxy::all(proxy_url)
                    .map_err(|e| CrawlError::invalid_config("invalid proxy url", e.into()))?;
                builder = builder.proxy(proxy);
            }
            builder
                .build()
                .map_err(|e| CrawlError::invalid_config("failed to build http client", e.into()))
        };

        if config.proxies_enabled && !config.proxy_urls.is_empty() {
            config.proxy_urls.iter().map(|p| build(Some(p))).collect()
        } else {
            Ok(vec![build(None)?])
        }
    }

    /// The first configured HTTP client; used for anything that doesn't need
    /// per-request rotation across the proxy pool.
    pub fn primary_client(&self) -> &Client {
        &self.clients[0]
    }

    /// A client with redirect-following disabled, dedicated to the seed
    /// redirect guard (§4.3) — the regular pool follows redirects
    /// transparently (`FetchResult.final_url`), so the guard needs its own
    /// client to see the raw 3xx and inspect `Location` itself.
    pub fn redirect_guard_client(&self) -> &Client {
        &self.redirect_guard_client
    }

    fn next_client(&self) -> &Client {
        let idx = self.client_idx.fetch_add(1, Ordering::Relaxed) % self.clients.len();
        &self.clients[idx]
    }

    fn user_agent_for_request(&self) -> Option<String> {
        if !self.config.use_random_user_agent {
            return None;
        }
        let idx = self.ua_idx.fetch_add(1, Ordering::Relaxed) % USER_AGENT_POOL.len();
        Some(USER_AGENT_POOL[idx].to_string())
    }

    pub async fn set_context(&self, ctx: CrawlContext) {
        *self.ctx.write().await = Some(ctx);
    }

    pub async fn clear_context(&self) {
        *self.ctx.write().await = None;
    }

    pub async fn set_on_page_complete(&self, cb: Arc<dyn Fn(&Url) + Send + Sync>) {
        *self.on_page_complete.write().await = Some(cb);
    }

    pub fn metrics(&self) -> Arc<JobMetrics> {
        self.metrics.clone()
    }

    pub async fn set_rate_limit(&self, delay: Duration) {
        self.rate_limiter.set_delay(delay).await;
    }

    /// Drive the frontier until it is empty and no fetch is in flight, or
    /// the abort signal fires. This is the `Wait()` drain point (§4.9).
    pub async fn run(self: &Arc<Self>, abort: tokio::sync::watch::Receiver<bool>) {
        loop {
            if *abort.borrow() {
                break;
            }
            match self.frontier.pop().await {
                Some(entry) => {
                    self.in_flight.fetch_add(1, Ordering::SeqCst);
                    let scheduler = self.clone();
                    let mut abort_rx = abort.clone();
                    tokio::spawn(async move {
                        tokio::select! {
                            _ = scheduler.fetch_one(entry) => {}
                            _ = abort_rx.changed() => {}
                        }
                        scheduler.in_flight.fetch_sub(1, Ordering::SeqCst);
                        scheduler.drained.notify_waiters();
                    });
                }
                None => {
                    if self.in_flight.load(Ordering::SeqCst) == 0 {
                        break;
                    }
                    tokio::select! {
                        _ = self.drained.notified() => {}
                        _ = tokio::time::sleep(Duration::from_millis(25)) => {}
                    }
                }
            }
        }
        // Final settle: wait for any still in-flight fetches.
        while self.in_flight.load(Ordering::SeqCst) > 0 {
            tokio::select! {
                _ = self.drained.notified() => {}
                _ = tokio::time::sleep(Duration::from_millis(25)) => {}
            }
        }
    }

    pub async fn frontier_len(&self) -> usize {
        self.frontier.len().await
    }

    async fn fetch_one(self: &Arc<Self>, entry: FrontierEntry) {
        let Some(host) = entry.url.host_str().map(|h| h.to_string()) else {
            return;
        };
        let _permit = self.rate_limiter.acquire(&host).await;

        let config = self.config.clone();
        let result = retry::with_http_retry(
            config.http_retry_max,
            config.http_retry_delay,
            &self.metrics,
            |_attempt| self.send_once(&entry),
        )
        .await;

        let fetch_result = match result {
            Ok(FetchOutcome::Gated) => return,
            Ok(FetchOutcome::Body(r)) => r,
            Err(_) => return,
        };

        self.process_body(&entry, fetch_result).await;
    }

    async fn send_once(&self, entry: &FrontierEntry) -> Result<FetchOutcome, CrawlError> {
        self.metrics.increment_requests_total();

        let started = Instant::now();
        let client = self.next_client();
        let mut request = client.get(entry.url.clone());
        if let Some(ua) = self.user_agent_for_request() {
            request = request.header(reqwest::header::USER_AGENT, ua);
        }
        if self.config.use_referer {
            if let Some(referer) = &entry.referer {
                request = request.header(reqwest::header::REFERER, referer.as_str());
            }
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                CrawlError::Timeout {
                    message: e.to_string(),
                }
            } else {
                CrawlError::classify_message(&e.to_string())
            }
        })?;

        let connect_time = started.elapsed();
        let status = response.status();
        let headers = response.headers().clone();

        let content_type = headers
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        let content_length = response.content_length();

        let decision = response_pipeline::header_gate(
            content_type.as_deref(),
            content_length,
            self.config.max_body_size,
        );
        if decision != HeaderGateDecision::Proceed {
            self.metrics.increment_skipped_non_html();
            self.metrics.record_status(status.as_u16()).await;
            return Ok(FetchOutcome::Gated);
        }

        if status.is_server_error() {
            return Err(CrawlError::HttpServer {
                status: status.as_u16(),
            });
        }

        let first_byte_time = started.elapsed();
        let final_url = response.url().clone();
        let body = response
            .bytes()
            .await
            .map_err(|e| CrawlError::classify_message(&e.to_string()))?;

        if self.config.max_body_size > 0 && body.len() as u64 > self.config.max_body_size {
            self.metrics.increment_skipped_non_html();
            return Ok(FetchOutcome::Gated);
        }

        self.metrics.record_status(status.as_u16()).await;
        self.metrics.record_response_time(connect_time).await;
        self.metrics.record_body_size(body.len()).await;

        if self.config.trace_http {
            debug!(
                url = %entry.url,
                status = status.as_u16(),
                connect_time = ?connect_time,
                first_byte_time = ?first_byte_time,
                body_bytes = body.len(),
                "http timing"
            );
        }

        Ok(FetchOutcome::Body(FetchResult {
            status: status.as_u16(),
            headers,
            body,
            connect_time,
            first_byte_time,
            final_url,
            proxy_used: None,
        }))
    }

    async fn process_body(self: &Arc<Self>, entry: &FrontierEntry, fetch: FetchResult) {
        let body_snippet: String = String::from_utf8_lossy(&fetch.body[..fetch.body.len().min(4096)]).to_string();

        if response_pipeline::detect_cloudflare_challenge(&fetch.headers, &body_snippet) {
            self.metrics.increment_cloudflare();
        }
        if response_pipeline::is_rate_limited(fetch.status) {
            self.metrics.increment_rate_limit_hits();
        }

        let Some(ctx) = self.ctx.read().await.clone() else {
            return;
        };

        if response_pipeline::is_seed_url(&ctx.source, &entry.url) {
            let hash = response_pipeline::sha256_hex(&fetch.body);
            self.start_url_hashes
                .write()
                .await
                .insert(ctx.source_id.clone(), hash);
        }

        if let Some(archiver) = &self.archiver {
            let task = ArchiveTask {
                html: fetch.body.clone(),
                url: entry.url.clone(),
                source_name: ctx.source.name.clone(),
                status: fetch.status,
                headers: response_pipeline::first_value_headers(&fetch.headers),
                timestamp: chrono::Utc::now(),
            };
            if let Err(e) = archiver.archive(task).await {
                warn!(url = %entry.url, error = %e, "archive failed");
            }
        }

        let html_text = String::from_utf8_lossy(&fetch.body).to_string();
        let document = Html::parse_document(&html_text);

        // html_classifier decides article-vs-page; when it says article, the
        // URL-fragment tagger can still sharpen that into a more specific
        // content type (press release, event, ...) per §4.1/§4.2.
        let content_type = match html_classifier::classify(&document, Some(&ctx.source.selectors)) {
            crate::types::ContentType::Article => {
                match url_classifier::classify_url_content_type(&entry.url) {
                    crate::types::ContentType::Unknown => crate::types::ContentType::Article,
                    specific => specific,
                }
            }
            other => other,
        };

        let title = ctx
            .source
            .selectors
            .title
            .as_deref()
            .and_then(|sel| Selector::parse(sel).ok())
            .and_then(|sel| document.select(&sel).next())
            .map(|el| el.text().collect::<Vec<_>>().join(" "));

        let body_text = ctx
            .source
            .selectors
            .body
            .as_deref()
            .and_then(|sel| Selector::parse(sel).ok())
            .and_then(|sel| document.select(&sel).next())
            .map(|el| el.text().collect::<Vec<_>>().join(" "));

        let page = Page {
            url: entry.url.clone(),
            source_id: ctx.source_id.clone(),
            content_type,
            title,
            body_text,
            html: html_text.clone(),
            depth: entry.depth,
        };

        // Link discovery always runs; the depth bound is enforced at
        // admission (`try_admit` rejects with `MaxDepth`, tallying
        // `skipped_max_depth`), not here — a page exactly at `max_depth` is
        // still discoverable, it just never gets its own links re-enqueued
        // because every child entry fails that admission check (§8 boundary:
        // "Depth equal to MaxDepth -> discoverable, not re-enqueued").
        //
        // Extracted here, before any `.await` below, because `scraper::Html`
        // is not `Send` and this function runs inside a spawned task.
        let link_selector = Selector::parse("a[href]").expect("static selector is valid");
        let hrefs: Vec<String> = document
            .select(&link_selector)
            .filter_map(|el| el.value().attr("href").map(|s| s.to_string()))
            .collect();
        drop(document);

        let mut dispatched = false;
        for processor in &self.processors {
            if processor.can_process(content_type) {
                dispatched = true;
                match processor.process(page.clone()).await {
                    Ok(()) => self.metrics.increment_items_extracted(),
                    Err(e) => {
                        warn!(url = %entry.url, error = %e, "processor failed");
                        self.metrics.increment_errors();
                    }
                }
                break;
            }
        }
        if !dispatched {
            debug!(url = %entry.url, content_type = content_type.as_str(), "no processor implements this content type");
        }

        for href in hrefs {
            link_handler::handle(
                &href,
                entry,
                &ctx,
                self.as_ref(),
                self.link_sink.as_deref(),
                self.config.save_discovered_links,
                self.config.validate_urls,
                self.config.max_retries,
                self.config.retry_delay,
            )
            .await;
        }

        let pages = self.metrics.increment_pages_crawled();
        if pages % MILESTONE_INTERVAL == 0 {
            info!(pages_crawled = pages, "crawl milestone");
        }
        self.events
            .emit(
                CrawlEvent::new("page_crawled", ctx.source_id.clone())
                    .with_url(entry.url.as_str()),
            )
            .await;

        if let Some(cb) = self.on_page_complete.read().await.as_ref() {
            cb(&entry.url);
        }
    }
}

#[async_trait]
impl Admitter for Scheduler {
    async fn try_admit(&self, entry: FrontierEntry) -> Result<(), CrawlError> {
        let Some(host) = entry.url.host_str().map(|h| h.to_string()) else {
            return Err(CrawlError::MissingUrl);
        };

        if self.config.max_requests > 0
            && self.admitted_count.load(Ordering::SeqCst) >= self.config.max_requests
        {
            return Err(CrawlError::ForbiddenDomain { host });
        }

        let ctx_guard = self.ctx.read().await;
        let Some(ctx) = ctx_guard.as_ref() else {
            return Err(CrawlError::CollectorNil);
        };

        if !ctx.source.allows_host(&host) {
            return Err(CrawlError::ForbiddenDomain { host });
        }

        for rule in ctx.rules.iter() {
            if rule.pattern.is_match(entry.url.as_str())
                && rule.action == crate::types::RuleAction::Disallow
            {
                return Err(CrawlError::ForbiddenDomain { host });
            }
        }

        if entry.depth > ctx.source.max_depth {
            self.metrics.increment_skipped_max_depth();
            return Err(CrawlError::MaxDepth {
                depth: entry.depth,
                max_depth: ctx.source.max_depth,
            });
        }

        if self.config.respect_robots_txt && !self.robots.is_allowed(&entry.url).await {
            return Err(CrawlError::ForbiddenDomain { host });
        }
        drop(ctx_guard);

        if !self.visited.check_and_insert(entry.url.as_str()).await {
            return Err(CrawlError::AlreadyVisited {
                url: entry.url.to_string(),
            });
        }

        self.admitted_count.fetch_add(1, Ordering::SeqCst);
        self.frontier.push(entry).await;
        Ok(())
    }
}
