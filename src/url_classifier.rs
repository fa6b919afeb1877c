//! URL classifier (§4.1): decides whether a URL is *likely* an article page
//! without fetching it, plus a parallel URL → [`ContentType`] tagger.

use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

use crate::types::ContentType;

/// Single-segment paths need at least this many hyphen-separated words in
/// their slug to be accepted (§4.1 step 3, §9 open question: kept as a
/// tunable constant rather than inlined).
pub const MIN_SLUG_WORDS: usize = 4;

/// Path segments that disqualify a URL from being an article, regardless of
/// slug shape.
pub const NON_ARTICLE_SEGMENTS: &[&str] = &[
    "login", "signin", "signup", "register", "search", "contact", "about", "privacy", "terms",
    "tag", "category", "author", "page", "feed", "rss", "sitemap", "admin", "wp-admin", "account",
    "cart", "checkout",
];

/// File extensions that disqualify a URL from being an article.
pub const NON_ARTICLE_EXTENSIONS: &[&str] = &[
    ".pdf", ".xml", ".json", ".css", ".js", ".png", ".jpg", ".jpeg", ".gif", ".svg", ".ico",
    ".woff", ".zip", ".mp3", ".mp4",
];

/// Segment names that, when not the final path segment, mark an article URL.
const ARTICLE_SEGMENT_NAMES: &[&str] = &["article", "story", "post", "news"];

static DATE_PATH_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^/\d{4}/\d{2}(/\d{2})?/[^/]+/?$").expect("static date pattern is valid")
});

/// Compile a source's configured article-URL patterns, silently dropping any
/// that fail to compile (§4.1, §8 law: idempotent union with the valid set).
pub fn compile_article_patterns(patterns: &[String]) -> Vec<Regex> {
    patterns
        .iter()
        .filter_map(|p| match Regex::new(p) {
            Ok(re) => Some(re),
            Err(e) => {
                tracing::debug!(pattern = %p, error = %e, "dropping invalid article-url pattern");
                None
            }
        })
        .collect()
}

/// Is `url` likely an article? Authoritative if `patterns` is non-empty;
/// otherwise falls back to the heuristic (§4.1).
pub fn is_article(url: &Url, patterns: &[Regex]) -> bool {
    if !patterns.is_empty() {
        let s = url.as_str();
        return patterns.iter().any(|p| p.is_match(s));
    }
    is_article_heuristic(url)
}

fn is_article_heuristic(url: &Url) -> bool {
    let path = url.path();
    if path.is_empty() || path == "/" {
        return false;
    }
    let lower = path.to_ascii_lowercase();

    let segments: Vec<&str> = lower.split('/').filter(|s| !s.is_empty()).collect();
    if segments.is_empty() {
        return false;
    }
    if segments
        .iter()
        .any(|seg| NON_ARTICLE_SEGMENTS.contains(seg))
    {
        return false;
    }
    if NON_ARTICLE_EXTENSIONS.iter().any(|ext| lower.ends_with(ext)) {
        return false;
    }

    if segments.len() == 1 {
        return slug_word_count(segments[0]) >= MIN_SLUG_WORDS;
    }

    if DATE_PATH_PATTERN.is_match(&lower) {
        return true;
    }
    let last_index = segments.len() - 1;
    if segments
        .iter()
        .enumerate()
        .any(|(i, seg)| i != last_index && ARTICLE_SEGMENT_NAMES.contains(seg))
    {
        return true;
    }
    segments.iter().any(|seg| slug_word_count(seg) >= MIN_SLUG_WORDS)
}

fn slug_word_count(segment: &str) -> usize {
    segment.split('-').filter(|w| !w.is_empty()).count()
}

/// Secondary content-type tagging from path fragments (§4.1). First match
/// wins in the fixed order below.
pub fn classify_url_content_type(url: &Url) -> ContentType {
    let path = url.path().to_ascii_lowercase();

    if path.contains("/press/") {
        ContentType::PressRelease
    } else if path.contains("/events/") {
        ContentType::Event
    } else if ["alert", "advisory", "bulletin"]
        .iter()
        .any(|f| path.contains(f))
    {
        ContentType::Advisory
    } else if (path.contains("/report") || path.contains("/docs")) && path.ends_with(".pdf") {
        ContentType::Report
    } else if ["blotter", "incidents", "arrests"]
        .iter()
        .any(|f| path.contains(f))
    {
        ContentType::Blotter
    } else if path.contains("/investors") || path.contains("/updates") {
        ContentType::CompanyAnnouncement
    } else {
        ContentType::Unknown
    }
}
