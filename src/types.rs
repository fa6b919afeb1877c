//! Shared data model (§3).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

/// An allow/deny rule evaluated against a discovered URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuleAction {
    Allow,
    Disallow,
}

/// A compiled regex rule paired with its action. Regexes don't implement
/// `Serialize`; sources are constructed from their string form and compiled
/// once at `CrawlContext` setup.
#[derive(Debug, Clone)]
pub struct Rule {
    pub pattern: Regex,
    pub action: RuleAction,
}

/// DOM selectors used by the HTML classifier and extractor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Selectors {
    pub title: Option<String>,
    pub body: Option<String>,
}

/// A configured crawl target, owned by the source registry (out of scope,
/// §1) and read-only for the duration of a crawl.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub id: String,
    pub name: String,
    pub url: Url,
    #[serde(default)]
    pub start_urls: Vec<Url>,
    #[serde(default)]
    pub allowed_domains: Vec<String>,
    #[serde(default)]
    pub rule_patterns: Vec<(String, RuleAction)>,
    pub rate_limit: Duration,
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,
    #[serde(default)]
    pub selectors: Selectors,
    #[serde(default)]
    pub article_url_patterns: Vec<String>,
}

fn default_max_depth() -> u32 {
    3
}

impl Source {
    /// Every start URL for this source: the seed plus any additional
    /// `start_urls`, in order (§GLOSSARY "Seed").
    pub fn seeds(&self) -> Vec<Url> {
        let mut seeds = vec![self.url.clone()];
        seeds.extend(self.start_urls.iter().cloned());
        seeds
    }

    /// True if `url` is one of this source's seed URLs, modulo a trailing
    /// slash (§4.5 "on body").
    pub fn is_seed_url(&self, url: &Url) -> bool {
        self.seeds().iter().any(|seed| urls_equal_modulo_slash(seed, url))
    }

    /// Host allow-list check supporting both exact and `*.suffix` forms
    /// (§4.4 step 4).
    pub fn allows_host(&self, host: &str) -> bool {
        if self.allowed_domains.is_empty() {
            return true;
        }
        let host = host.to_ascii_lowercase();
        self.allowed_domains.iter().any(|d| {
            let d = d.to_ascii_lowercase();
            if let Some(suffix) = d.strip_prefix("*.") {
                host == suffix || host.ends_with(&format!(".{suffix}"))
            } else {
                host == d
            }
        })
    }
}

fn urls_equal_modulo_slash(a: &Url, b: &Url) -> bool {
    let trim = |u: &Url| u.as_str().trim_end_matches('/').to_string();
    trim(a) == trim(b)
}

/// Per-run context: source id, resolved source, and compiled article-URL
/// regexes. Readable by all workers; replaced atomically between crawls.
#[derive(Clone)]
pub struct CrawlContext {
    pub source_id: String,
    pub source: Arc<Source>,
    pub article_regexes: Arc<Vec<Regex>>,
    pub rules: Arc<Vec<Rule>>,
}

/// A URL awaiting dispatch in the frontier (§GLOSSARY).
#[derive(Debug, Clone)]
pub struct FrontierEntry {
    pub url: Url,
    pub depth: u32,
    pub referer: Option<Url>,
    pub retry_count: u32,
}

impl FrontierEntry {
    pub fn seed(url: Url) -> Self {
        Self {
            url,
            depth: 0,
            referer: None,
            retry_count: 0,
        }
    }

    pub fn child(&self, url: Url) -> Self {
        Self {
            url,
            depth: self.depth + 1,
            referer: Some(self.url.clone()),
            retry_count: 0,
        }
    }
}

/// The outcome of one HTTP fetch (§3).
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub status: u16,
    pub headers: reqwest::header::HeaderMap,
    pub body: bytes::Bytes,
    pub connect_time: Duration,
    pub first_byte_time: Duration,
    pub final_url: Url,
    pub proxy_used: Option<String>,
}

/// Secondary content classification (§4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Article,
    Page,
    PressRelease,
    Event,
    Advisory,
    Report,
    Blotter,
    CompanyAnnouncement,
    Unknown,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Article => "article",
            ContentType::Page => "page",
            ContentType::PressRelease => "press_release",
            ContentType::Event => "event",
            ContentType::Advisory => "advisory",
            ContentType::Report => "report",
            ContentType::Blotter => "blotter",
            ContentType::CompanyAnnouncement => "company_announcement",
            ContentType::Unknown => "unknown",
        }
    }
}

/// A link discovered on a page, queued for persistence via `LinkSink`
/// (§4.4 step 4, §6 wire contract).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveredLink {
    pub source_id: String,
    pub source_name: String,
    pub url: String,
    pub parent_url: Option<String>,
    pub depth: u32,
    pub status: String,
    pub priority: i32,
}

/// An archive task handed to the `Archiver` collaborator (§4.5, §6).
#[derive(Debug, Clone)]
pub struct ArchiveTask {
    pub html: bytes::Bytes,
    pub url: Url,
    pub source_name: String,
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// A parsed page handed to a `Processor` collaborator (§6).
#[derive(Debug, Clone)]
pub struct Page {
    pub url: Url,
    pub source_id: String,
    pub content_type: ContentType,
    pub title: Option<String>,
    pub body_text: Option<String>,
    pub html: String,
    pub depth: u32,
}
