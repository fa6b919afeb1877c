//! State & metrics (§4.12, §3): counters, durations, and timestamps under a
//! single reader-writer lock (many reads during heartbeat logging, few
//! writes).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

use crate::error::ErrorCategory;

/// Point-in-time snapshot returned by [`JobMetrics::snapshot`].
#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    pub requests_total: u64,
    pub requests_failed: u64,
    pub pages_crawled: u64,
    pub items_extracted: u64,
    pub errors: u64,
    pub cloudflare: u64,
    pub rate_limit_hits: u64,
    pub skipped_non_html: u64,
    pub skipped_max_depth: u64,
    pub status_histogram: HashMap<u16, u64>,
    pub response_time_histogram_ms: Vec<u64>,
    pub body_size_histogram: Vec<u64>,
    pub error_category_tally: HashMap<&'static str, u64>,
    pub running: bool,
    pub processing_duration: Duration,
}

#[derive(Default)]
struct Histograms {
    status: HashMap<u16, u64>,
    response_time_ms: Vec<u64>,
    body_size: Vec<u64>,
    error_category: HashMap<&'static str, u64>,
}

/// Monotonic counters plus histograms for one crawl run (§3 `JobMetrics`).
pub struct JobMetrics {
    requests_total: AtomicU64,
    requests_failed: AtomicU64,
    pages_crawled: AtomicU64,
    items_extracted: AtomicU64,
    errors: AtomicU64,
    cloudflare: AtomicU64,
    rate_limit_hits: AtomicU64,
    skipped_non_html: AtomicU64,
    skipped_max_depth: AtomicU64,
    running: AtomicBool,
    started_at: RwLock<Option<Instant>>,
    histograms: RwLock<Histograms>,
}

impl JobMetrics {
    pub fn new() -> Self {
        Self {
            requests_total: AtomicU64::new(0),
            requests_failed: AtomicU64::new(0),
            pages_crawled: AtomicU64::new(0),
            items_extracted: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            cloudflare: AtomicU64::new(0),
            rate_limit_hits: AtomicU64::new(0),
            skipped_non_html: AtomicU64::new(0),
            skipped_max_depth: AtomicU64::new(0),
            running: AtomicBool::new(false),
            started_at: RwLock::new(None),
            histograms: RwLock::new(Histograms::default()),
        }
    }

    pub async fn start(&self) {
        *self.started_at.write().await = Some(Instant::now());
        self.running.store(true, Ordering::SeqCst);
    }

    pub async fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub async fn reset(&self) {
        self.requests_total.store(0, Ordering::SeqCst);
        self.requests_failed.store(0, Ordering::SeqCst);
        self.pages_crawled.store(0, Ordering::SeqCst);
        self.items_extracted.store(0, Ordering::SeqCst);
        self.errors.store(0, Ordering::SeqCst);
        self.cloudflare.store(0, Ordering::SeqCst);
        self.rate_limit_hits.store(0, Ordering::SeqCst);
        self.skipped_non_html.store(0, Ordering::SeqCst);
        self.skipped_max_depth.store(0, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);
        *self.started_at.write().await = None;
        *self.histograms.write().await = Histograms::default();
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn increment_requests_total(&self) {
        self.requests_total.fetch_add(1, Ordering::SeqCst);
    }

    pub fn increment_requests_failed(&self) {
        self.requests_failed.fetch_add(1, Ordering::SeqCst);
    }

    pub fn increment_pages_crawled(&self) -> u64 {
        self.pages_crawled.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn increment_items_extracted(&self) {
        self.items_extracted.fetch_add(1, Ordering::SeqCst);
    }

    pub fn increment_errors(&self) {
        self.errors.fetch_add(1, Ordering::SeqCst);
    }

    pub fn increment_cloudflare(&self) {
        self.cloudflare.fetch_add(1, Ordering::SeqCst);
    }

    pub fn increment_rate_limit_hits(&self) {
        self.rate_limit_hits.fetch_add(1, Ordering::SeqCst);
    }

    pub fn increment_skipped_non_html(&self) {
        self.skipped_non_html.fetch_add(1, Ordering::SeqCst);
    }

    pub fn increment_skipped_max_depth(&self) {
        self.skipped_max_depth.fetch_add(1, Ordering::SeqCst);
    }

    pub async fn record_status(&self, status: u16) {
        *self.histograms.write().await.status.entry(status).or_insert(0) += 1;
    }

    pub async fn record_response_time(&self, elapsed: Duration) {
        self.histograms
            .write()
            .await
            .response_time_ms
            .push(elapsed.as_millis() as u64);
    }

    pub async fn record_body_size(&self, size: usize) {
        self.histograms.write().await.body_size.push(size as u64);
    }

    pub async fn record_error_category(&self, category: ErrorCategory) {
        *self
            .histograms
            .write()
            .await
            .error_category
            .entry(category.as_str())
            .or_insert(0) += 1;
    }

    /// 0 whenever not running — covers both never-started and post-stop
    /// (§4.12).
    pub async fn processing_duration(&self) -> Duration {
        if !self.is_running() {
            return Duration::ZERO;
        }
        match *self.started_at.read().await {
            Some(start) => start.elapsed(),
            None => Duration::ZERO,
        }
    }

    pub async fn snapshot(&self) -> MetricsSnapshot {
        let histograms = self.histograms.read().await;
        MetricsSnapshot {
            requests_total: self.requests_total.load(Ordering::SeqCst),
            requests_failed: self.requests_failed.load(Ordering::SeqCst),
            pages_crawled: self.pages_crawled.load(Ordering::SeqCst),
            items_extracted: self.items_extracted.load(Ordering::SeqCst),
            errors: self.errors.load(Ordering::SeqCst),
            cloudflare: self.cloudflare.load(Ordering::SeqCst),
            rate_limit_hits: self.rate_limit_hits.load(Ordering::SeqCst),
            skipped_non_html: self.skipped_non_html.load(Ordering::SeqCst),
            skipped_max_depth: self.skipped_max_depth.load(Ordering::SeqCst),
            status_histogram: histograms.status.clone(),
            response_time_histogram_ms: histograms.response_time_ms.clone(),
            body_size_histogram: histograms.body_size.clone(),
            error_category_tally: histograms.error_category.clone(),
            running: self.is_running(),
            processing_duration: self.processing_duration().await,
        }
    }
}

impl Default for JobMetrics {
    fn default() -> Self {
        Self::new()
    }
}
