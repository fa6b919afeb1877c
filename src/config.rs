//! Crawler-wide configuration (§6). Follows the `ReliabilityConfig::from_env()`
//! idiom: one `std::env::var(...).ok().and_then(...).unwrap_or(default)` line
//! per field, `SENTRY_CRAWL_`-prefixed.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::rate_limiter::DEFAULT_RATE_LIMIT;

/// TLS knobs applied at HTTP client construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TlsConfig {
    pub insecure_skip_verify: bool,
    pub min_version: Option<String>,
    pub max_version: Option<String>,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            insecure_skip_verify: false,
            min_version: None,
            max_version: None,
        }
    }
}

/// External (Redis-backed) visited-set configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalStoreConfig {
    pub enabled: bool,
    pub address: String,
    pub password: Option<String>,
    pub db: i64,
    pub expires: Duration,
}

impl Default for ExternalStoreConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            address: "redis://127.0.0.1:6379".to_string(),
            password: None,
            db: 0,
            expires: Duration::from_secs(24 * 3600),
        }
    }
}

/// The full set of recognised configuration knobs from §6.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerConfig {
    pub rate_limit: Duration,
    pub parallelism: usize,
    pub max_depth: u32,
    pub max_body_size: u64,
    pub max_requests: u64,
    pub respect_robots_txt: bool,
    pub user_agent: String,
    pub use_random_user_agent: bool,
    pub use_referer: bool,
    pub detect_charset: bool,
    pub trace_http: bool,
    pub request_timeout: Duration,
    pub http_retry_max: u32,
    pub http_retry_delay: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub validate_urls: bool,
    pub tls: TlsConfig,
    pub proxies_enabled: bool,
    pub proxy_urls: Vec<String>,
    pub external_store: ExternalStoreConfig,
    pub save_discovered_links: bool,
    pub cleanup_interval: Duration,
}

/// Default user-agent pool used when `use_random_user_agent` is set.
pub const USER_AGENT_POOL: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 SentryCrawl/1.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 SentryCrawl/1.0",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 SentryCrawl/1.0",
];

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            rate_limit: DEFAULT_RATE_LIMIT,
            parallelism: 2,
            max_depth: 3,
            max_body_size: 0,
            max_requests: 0,
            respect_robots_txt: true,
            user_agent: "SentryCrawl/1.0".to_string(),
            use_random_user_agent: false,
            use_referer: true,
            detect_charset: true,
            trace_http: false,
            request_timeout: Duration::from_secs(30),
            http_retry_max: 3,
            http_retry_delay: Duration::from_millis(500),
            max_retries: 3,
            retry_delay: Duration::from_millis(200),
            validate_urls: true,
            tls: TlsConfig::default(),
            proxies_enabled: false,
            proxy_urls: Vec::new(),
            external_store: ExternalStoreConfig::default(),
            save_discovered_links: false,
            cleanup_interval: Duration::from_secs(60),
        }
    }
}

impl CrawlerConfig {
    /// Load a configuration from `SENTRY_CRAWL_*` environment variables,
    /// falling back to [`CrawlerConfig::default`] for anything unset or
    /// unparsable.
    pub fn from_env() -> Self {
        let default = Self::default();

        let rate_limit = std::env::var("SENTRY_CRAWL_RATE_LIMIT")
            .ok()
            .and_then(|s| crate::rate_limiter::parse_rate_limit(&s).ok())
            .unwrap_or(default.rate_limit);

        let parallelism = std::env::var("SENTRY_CRAWL_PARALLELISM")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(default.parallelism);

        let max_depth = std::env::var("SENTRY_CRAWL_MAX_DEPTH")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(default.max_depth);

        let max_body_size = std::env::var("SENTRY_CRAWL_MAX_BODY_SIZE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(default.max_body_size);

        let max_requests = std::env::var("SENTRY_CRAWL_MAX_REQUESTS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(default.max_requests);

        let respect_robots_txt = std::env::var("SENTRY_CRAWL_RESPECT_ROBOTS_TXT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(default.respect_robots_txt);

        let user_agent = std::env::var("SENTRY_CRAWL_USER_AGENT").unwrap_or(default.user_agent);

        let use_random_user_agent = std::env::var("SENTRY_CRAWL_USE_RANDOM_USER_AGENT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(default.use_random_user_agent);

        let use_referer = std::env::var("SENTRY_CRAWL_USE_REFERER")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(default.use_referer);

        let detect_charset = std::env::var("SENTRY_CRAWL_DETECT_CHARSET")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(default.detect_charset);

        let trace_http = std::env::var("SENTRY_CRAWL_TRACE_HTTP")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(default.trace_http);

        let request_timeout = std::env::var("SENTRY_CRAWL_REQUEST_TIMEOUT")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(default.request_timeout);

        let http_retry_max = std::env::var("SENTRY_CRAWL_HTTP_RETRY_MAX")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(default.http_retry_max);

        let http_retry_delay = std::env::var("SENTRY_CRAWL_HTTP_RETRY_DELAY_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(default.http_retry_delay);

        let max_retries = std::env::var("SENTRY_CRAWL_MAX_RETRIES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(default.max_retries);

        let retry_delay = std::env::var("SENTRY_CRAWL_RETRY_DELAY_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(default.retry_delay);

        let validate_urls = std::env::var("SENTRY_CRAWL_VALIDATE_URLS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(default.validate_urls);

        let insecure_skip_verify = std::env::var("SENTRY_CRAWL_TLS_INSECURE_SKIP_VERIFY")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(default.tls.insecure_skip_verify);

        let min_version = std::env::var("SENTRY_CRAWL_TLS_MIN_VERSION")
            .ok()
            .or(default.tls.min_version.clone());

        let max_version = std::env::var("SENTRY_CRAWL_TLS_MAX_VERSION")
            .ok()
            .or(default.tls.max_version.clone());

        let proxies_enabled = std::env::var("SENTRY_CRAWL_PROXIES_ENABLED")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(default.proxies_enabled);

        let proxy_urls = std::env::var("SENTRY_CRAWL_PROXY_URLS")
            .ok()
            .map(|s| s.split(',').map(|p| p.trim().to_string()).collect())
            .unwrap_or(default.proxy_urls);

        let save_discovered_links = std::env::var("SENTRY_CRAWL_SAVE_DISCOVERED_LINKS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(default.save_discovered_links);

        let cleanup_interval = std::env::var("SENTRY_CRAWL_CLEANUP_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(default.cleanup_interval);

        Self {
            rate_limit,
            parallelism,
            max_depth,
            max_body_size,
            max_requests,
            respect_robots_txt,
            user_agent,
            use_random_user_agent,
            use_referer,
            detect_charset,
            trace_http,
            request_timeout,
            http_retry_max,
            http_retry_delay,
            max_retries,
            retry_delay,
            validate_urls,
            tls: TlsConfig {
                insecure_skip_verify,
                min_version,
                max_version,
            },
            proxies_enabled,
            proxy_urls,
            external_store: default.external_store,
            save_discovered_links,
            cleanup_interval,
        }
    }

    /// §4.11: cleanup interval must be strictly positive; falls back to the
    /// default (1 min) otherwise.
    pub fn validated_cleanup_interval(&self) -> Duration {
        if self.cleanup_interval.is_zero() {
            Duration::from_secs(60)
        } else {
            self.cleanup_interval
        }
    }
}
