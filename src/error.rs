//! Error taxonomy for the crawl engine.
//!
//! `CrawlError` is the boundary type returned across component seams (scheduler
//! callbacks, lifecycle `Start`/`Stop`). Setup-time plumbing (HTTP client
//! construction, regex compilation) uses `anyhow::Result` internally and is
//! converted to [`CrawlError::InvalidConfig`] at the boundary.

use thiserror::Error;

/// Error category fed into the `errors` histogram (§3, §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Timeout,
    Network,
    HttpServer,
    HttpClient,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Timeout => "timeout",
            ErrorCategory::Network => "network",
            ErrorCategory::HttpServer => "http_server",
            ErrorCategory::HttpClient => "http_client",
        }
    }
}

/// The full error taxonomy of §7.
#[derive(Error, Debug)]
pub enum CrawlError {
    #[error("seed redirected cross-domain to {location}")]
    CrossDomainRedirect { location: String },

    #[error("url already visited: {url}")]
    AlreadyVisited { url: String },

    #[error("max depth exceeded: depth {depth} > max {max_depth}")]
    MaxDepth { depth: u32, max_depth: u32 },

    #[error("domain not allowed: {host}")]
    ForbiddenDomain { host: String },

    #[error("missing url")]
    MissingUrl,

    #[error("invalid url: {input}")]
    InvalidUrl { input: String },

    #[error("rate limit exceeded for host {host}")]
    RateLimitExceeded { host: String },

    #[error("content processing failed: {message}")]
    ContentProcessingFailed {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("request timed out: {message}")]
    Timeout { message: String },

    #[error("transient network error: {message}")]
    TransientNetwork { message: String },

    #[error("http client error: {status}")]
    HttpClient { status: u16 },

    #[error("http server error: {status}")]
    HttpServer { status: u16 },

    #[error("invalid configuration: {message}")]
    InvalidConfig {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    #[error("collector is nil")]
    CollectorNil,
}

impl CrawlError {
    pub fn invalid_config(message: impl Into<String>, source: anyhow::Error) -> Self {
        CrawlError::InvalidConfig {
            message: message.into(),
            source: Some(source),
        }
    }

    pub fn content_processing_failed<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        CrawlError::ContentProcessingFailed {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// §4.6's three-way split: expected (no retry, debug), timeout (no retry,
    /// warn), transient (retry, bounded). Anything not covered here is
    /// permanent and non-retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CrawlError::TransientNetwork { .. } | CrawlError::HttpServer { .. }
        )
    }

    /// True for the "expected" bucket of §4.6 — logged at debug, never retried.
    pub fn is_expected(&self) -> bool {
        matches!(
            self,
            CrawlError::AlreadyVisited { .. }
                | CrawlError::MaxDepth { .. }
                | CrawlError::ForbiddenDomain { .. }
        )
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            CrawlError::Timeout { .. } => ErrorCategory::Timeout,
            CrawlError::TransientNetwork { .. } => ErrorCategory::Network,
            CrawlError::HttpServer { .. } => ErrorCategory::HttpServer,
            CrawlError::HttpClient { .. } => ErrorCategory::HttpClient,
            _ => ErrorCategory::Network,
        }
    }

    /// Classifies a raw error message the way §4.6 describes: substring
    /// matching against known transient/timeout phrases.
    pub fn classify_message(message: &str) -> Self {
        let lower = message.to_lowercase();
        const TIMEOUT_PHRASES: &[&str] = &["timeout", "deadline exceeded"];
        const TRANSIENT_PHRASES: &[&str] = &[
            "connection refused",
            "connection reset",
            "temporary failure",
            "eof",
            "broken pipe",
            "no such host",
            "i/o timeout",
            "connection timed out",
        ];
        if TIMEOUT_PHRASES.iter().any(|p| lower.contains(p)) {
            CrawlError::Timeout {
                message: message.to_string(),
            }
        } else if TRANSIENT_PHRASES.iter().any(|p| lower.contains(p)) {
            CrawlError::TransientNetwork {
                message: message.to_string(),
            }
        } else {
            CrawlError::ContentProcessingFailed {
                message: message.to_string(),
                source: None,
            }
        }
    }

    pub fn from_status(status: u16) -> Option<Self> {
        if status == 429 {
            Some(CrawlError::RateLimitExceeded {
                host: String::new(),
            })
        } else if (500..600).contains(&status) {
            Some(CrawlError::HttpServer { status })
        } else if (400..500).contains(&status) {
            Some(CrawlError::HttpClient { status })
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_timeout_messages() {
        let err = CrawlError::classify_message("operation timeout after 10s");
        assert!(matches!(err, CrawlError::Timeout { .. }));
        assert!(!err.is_retryable());
    }

    #[test]
    fn classifies_transient_messages() {
        let err = CrawlError::classify_message("connection reset by peer");
        assert!(matches!(err, CrawlError::TransientNetwork { .. }));
        assert!(err.is_retryable());
    }

    #[test]
    fn expected_errors_are_not_retryable() {
        let err = CrawlError::MaxDepth {
            depth: 4,
            max_depth: 3,
        };
        assert!(err.is_expected());
        assert!(!err.is_retryable());
    }

    #[test]
    fn http_server_status_is_retryable() {
        let err = CrawlError::from_status(503).unwrap();
        assert!(matches!(err, CrawlError::HttpServer { status: 503 }));
        assert!(err.is_retryable());
        assert_eq!(err.category().as_str(), "http_server");
    }

    #[test]
    fn http_client_status_is_not_retryable() {
        let err = CrawlError::from_status(404).unwrap();
        assert!(matches!(err, CrawlError::HttpClient { status: 404 }));
        assert!(!err.is_retryable());
    }
}
