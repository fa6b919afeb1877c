//! Link handler (§4.4): invoked once per `<a href>` element on a fetched
//! page. Normalises, filters, enqueues, and optionally persists externally
//! discovered links.

use async_trait::async_trait;
use tokio::time::sleep;
use tracing::{debug, warn};
use url::Url;

use crate::error::CrawlError;
use crate::ports::LinkSink;
use crate::types::{CrawlContext, DiscoveredLink, FrontierEntry};

/// Admission capability the link handler enqueues against; implemented by
/// the fetch scheduler (§4.9). Kept as a narrow trait so the handler doesn't
/// need to know about rate limiting, robots, or the visited set directly.
#[async_trait]
pub trait Admitter: Send + Sync {
    async fn try_admit(&self, entry: FrontierEntry) -> Result<(), CrawlError>;
}

const ALLOWED_SCHEMES: &[&str] = &["", "http", "https"];

/// Process one `<a href="...">` discovered on `parent`. `href` is the raw
/// attribute value (possibly empty, relative, or a non-HTTP scheme).
pub async fn handle(
    href: &str,
    parent: &FrontierEntry,
    ctx: &CrawlContext,
    admitter: &dyn Admitter,
    link_sink: Option<&dyn LinkSink>,
    save_discovered_links: bool,
    validate_urls: bool,
    max_retries: u32,
    retry_delay: std::time::Duration,
) {
    if href.trim().is_empty() {
        return;
    }

    // Step 1: scheme filter. A bare fragment/relative href parses with an
    // empty scheme when resolved relative to itself, so we check the scheme
    // *after* resolution instead of pre-filtering on the raw string, except
    // for the unambiguous non-http schemes.
    let lower = href.trim().to_ascii_lowercase();
    if lower.starts_with("mailto:")
        || lower.starts_with("tel:")
        || lower.starts_with("javascript:")
        || (lower.starts_with('#') && !lower.contains('/'))
    {
        return;
    }

    // Step 2: resolve to absolute against the request URL. A malformed href
    // can never become a `FrontierEntry` regardless of `validate_urls` — the
    // flag only controls whether the skip is logged as an expected outcome
    // of validation or stays silent.
    let absolute = match parent.url.join(href) {
        Ok(u) => u,
        Err(e) => {
            if validate_urls {
                debug!(href = %href, error = %e, "failed to resolve link, skipping");
            }
            return;
        }
    };

    if !ALLOWED_SCHEMES.contains(&absolute.scheme()) {
        return;
    }

    // Step 3: URL validation already happened via `Url::join` succeeding;
    // nothing further needed here beyond checking it actually has a host.
    if absolute.host_str().is_none() {
        return;
    }

    // Step 4: optional external-link persistence.
    if save_discovered_links {
        if let Some(sink) = link_sink {
            if let Some(host) = absolute.host_str() {
                if !ctx.source.allows_host(host) {
                    let link = DiscoveredLink {
                        source_id: ctx.source_id.clone(),
                        source_name: ctx.source.name.clone(),
                        url: absolute.to_string(),
                        parent_url: Some(parent.url.to_string()),
                        depth: parent.depth + 1,
                        status: "pending".to_string(),
                        priority: 0,
                    };
                    if let Err(e) = sink.create_or_update(link).await {
                        warn!(url = %absolute, error = %e, "failed to persist discovered link");
                    }
                }
            }
        }
    }

    // Step 5: enqueue with bounded enqueue-retries.
    let entry = parent.child(absolute.clone());
    let mut attempt = 0;
    loop {
        match admitter.try_admit(entry.clone()).await {
            Ok(()) => return,
            Err(e) if !e.is_retryable() => {
                debug!(url = %absolute, error = %e, "link admission rejected, not retrying");
                return;
            }
            Err(e) => {
                if attempt >= max_retries {
                    warn!(url = %absolute, error = %e, attempts = attempt, "link admission retries exhausted");
                    return;
                }
                attempt += 1;
                sleep(retry_delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Rule, Selectors, Source};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    struct CountingAdmitter {
        admitted: Arc<AtomicUsize>,
        result: fn() -> Result<(), CrawlError>,
    }

    #[async_trait]
    impl Admitter for CountingAdmitter {
        async fn try_admit(&self, _entry: FrontierEntry) -> Result<(), CrawlError> {
            self.admitted.fetch_add(1, Ordering::SeqCst);
            (self.result)()
        }
    }

    fn ctx() -> CrawlContext {
        CrawlContext {
            source_id: "s1".to_string(),
            source: Arc::new(Source {
                id: "s1".to_string(),
                name: "s1".to_string(),
                url: Url::parse("https://ex.com/").unwrap(),
                start_urls: vec![],
                allowed_domains: vec!["ex.com".to_string()],
                rule_patterns: vec![],
                rate_limit: Duration::from_secs(1),
                max_depth: 3,
                selectors: Selectors::default(),
                article_url_patterns: vec![],
            }),
            article_regexes: Arc::new(vec![]),
            rules: Arc::new(Vec::<Rule>::new()),
        }
    }

    fn parent() -> FrontierEntry {
        FrontierEntry::seed(Url::parse("https://ex.com/").unwrap())
    }

    #[tokio::test]
    async fn skips_mailto_and_tel() {
        let admitted = Arc::new(AtomicUsize::new(0));
        let admitter = CountingAdmitter {
            admitted: admitted.clone(),
            result: || Ok(()),
        };
        handle("mailto:a@b.com", &parent(), &ctx(), &admitter, None, false, true, 0, Duration::ZERO).await;
        handle("tel:12345", &parent(), &ctx(), &admitter, None, false, true, 0, Duration::ZERO).await;
        assert_eq!(admitted.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn resolves_relative_and_admits() {
        let admitted = Arc::new(AtomicUsize::new(0));
        let admitter = CountingAdmitter {
            admitted: admitted.clone(),
            result: || Ok(()),
        };
        handle("/about-the-team", &parent(), &ctx(), &admitter, None, false, true, 0, Duration::ZERO).await;
        assert_eq!(admitted.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stops_retrying_on_non_retryable_admission_error() {
        let admitted = Arc::new(AtomicUsize::new(0));
        let admitter = CountingAdmitter {
            admitted: admitted.clone(),
            result: || {
                Err(CrawlError::ForbiddenDomain {
                    host: "evil.com".to_string(),
                })
            },
        };
        handle("https://evil.com/x", &parent(), &ctx(), &admitter, None, false, true, 3, Duration::from_millis(1)).await;
        assert_eq!(admitted.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_transient_admission_errors_up_to_max() {
        let admitted = Arc::new(AtomicUsize::new(0));
        let admitter = CountingAdmitter {
            admitted: admitted.clone(),
            result: || Err(CrawlError::TransientNetwork { message: "boom".into() }),
        };
        handle("/x-y-z-w", &parent(), &ctx(), &admitter, None, false, true, 2, Duration::from_millis(1)).await;
        assert_eq!(admitted.load(Ordering::SeqCst), 3);
    }
}
