//! robots.txt compliance (§4.9): respected by default, opt-out allowed.
//! Adapted from this codebase's existing robots-manager idiom, trimmed to
//! compliance checking only — per-host pacing is the rate limiter's job
//! (§4.7, `rate_limiter.rs`), not robots.txt's.

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use dashmap::DashMap;
use reqwest::Client;
use robotstxt::DefaultMatcher;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RobotsConfig {
    /// Respect robots.txt; can be disabled for development (§6 `RespectRobotsTxt`).
    pub respect_robots: bool,
    /// TTL for cached robots.txt files.
    pub cache_ttl: Duration,
    /// User agent string used for robots.txt compliance checks.
    pub user_agent: String,
    /// Timeout for fetching robots.txt.
    pub fetch_timeout: Duration,
}

impl Default for RobotsConfig {
    fn default() -> Self {
        Self {
            respect_robots: true,
            cache_ttl: Duration::from_secs(3600),
            user_agent: "SentryCrawl/1.0".to_string(),
            fetch_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone)]
struct CachedRobots {
    content: String,
    cached_at: Instant,
}

impl CachedRobots {
    fn is_expired(&self, ttl: Duration) -> bool {
        self.cached_at.elapsed() > ttl
    }
}

/// Per-host robots.txt cache and compliance checker.
pub struct RobotsManager {
    config: RobotsConfig,
    cache: DashMap<String, CachedRobots>,
    http_client: Client,
}

impl RobotsManager {
    pub fn new(config: RobotsConfig) -> Result<Self> {
        let http_client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.fetch_timeout)
            .gzip(true)
            .build()
            .context("failed to build robots.txt HTTP client")?;

        Ok(Self {
            config,
            cache: DashMap::new(),
            http_client,
        })
    }

    /// Is `url` allowed by its host's robots.txt? Always `true` when
    /// `respect_robots` is disabled. Fetch failures are treated as
    /// permissive (allow) with a warn log.
    pub async fn is_allowed(&self, url: &Url) -> bool {
        if !self.config.respect_robots {
            debug!(url = %url, "robots.txt respect disabled");
            return true;
        }

        let Some(host) = url.host_str() else {
            return true;
        };
        let host = host.to_string();

        let content = self.get_robots_for_host(&host, url.scheme()).await;
        let mut matcher = DefaultMatcher::default();
        let allowed = matcher.one_agent_allowed_by_robots(&content, &self.config.user_agent, url.as_str());
        debug!(url = %url, allowed, "robots.txt check");
        allowed
    }

    async fn get_robots_for_host(&self, host: &str, scheme: &str) -> String {
        if let Some(cached) = self.cache.get(host) {
            if !cached.is_expired(self.config.cache_ttl) {
                return cached.content.clone();
            }
        }

        let robots_url = format!("{scheme}://{host}/robots.txt");
        let content = match self.fetch(&robots_url).await {
            Ok(c) => c,
            Err(e) => {
                warn!(host = %host, error = %e, "failed to fetch robots.txt, allowing all");
                String::new()
            }
        };

        self.cache.insert(
            host.to_string(),
            CachedRobots {
                content: content.clone(),
                cached_at: Instant::now(),
            },
        );
        content
    }

    async fn fetch(&self, robots_url: &str) -> Result<String> {
        let response = self
            .http_client
            .get(robots_url)
            .send()
            .await
            .context("failed to fetch robots.txt")?;

        if response.status().is_success() {
            response
                .text()
                .await
                .context("failed to read robots.txt body")
        } else {
            Ok(String::new())
        }
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn development_mode_bypass() {
        let config = RobotsConfig {
            respect_robots: false,
            ..Default::default()
        };
        let manager = RobotsManager::new(config).unwrap();
        let url = Url::parse("https://ex.com/blocked").unwrap();
        assert!(manager.is_allowed(&url).await);
    }

    #[tokio::test]
    async fn disallowed_path_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /admin\n"))
            .mount(&server)
            .await;

        let manager = RobotsManager::new(RobotsConfig::default()).unwrap();
        let url = Url::parse(&format!("{}/admin/page", server.uri())).unwrap();
        assert!(!manager.is_allowed(&url).await);
    }

    #[tokio::test]
    async fn missing_robots_txt_is_permissive() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let manager = RobotsManager::new(RobotsConfig::default()).unwrap();
        let url = Url::parse(&format!("{}/anything", server.uri())).unwrap();
        assert!(manager.is_allowed(&url).await);
    }
}
