//! End-to-end crawl scenarios driven against a real `wiremock::MockServer`,
//! covering the literal inputs/effects of §8's scenario list: seed + link
//! discovery, cross-domain redirect abort, transient-error retry, non-HTML
//! filtering, and the max-depth cap.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sentry_crawl::error::CrawlError;
use sentry_crawl::ports::SourceStore;
use sentry_crawl::{CrawlerConfig, Factory};
use sentry_crawl::types::{Selectors, Source};
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct StaticSourceStore(Source);

#[async_trait]
impl SourceStore for StaticSourceStore {
    async fn by_id(&self, id: &str) -> Result<Source, CrawlError> {
        if id == self.0.id {
            Ok(self.0.clone())
        } else {
            Err(CrawlError::InvalidConfig {
                message: format!("unknown source {id}"),
                source: None,
            })
        }
    }
}

fn source_for(id: &str, seed: Url, allowed_host: &str, max_depth: u32) -> Source {
    Source {
        id: id.to_string(),
        name: id.to_string(),
        url: seed,
        start_urls: vec![],
        allowed_domains: vec![allowed_host.to_string()],
        rule_patterns: vec![],
        rate_limit: Duration::from_millis(1),
        max_depth,
        selectors: Selectors::default(),
        article_url_patterns: vec![],
    }
}

fn no_robots_config() -> CrawlerConfig {
    CrawlerConfig {
        respect_robots_txt: false,
        http_retry_delay: Duration::from_millis(5),
        ..CrawlerConfig::default()
    }
}

/// §8 scenario 1: seed + one internal link, both HTML, robots off.
#[tokio::test]
async fn seed_plus_one_internal_link_both_fetched() {
    let server = MockServer::start().await;
    let host = Url::parse(&server.uri()).unwrap().host_str().unwrap().to_string();

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html")
                .set_body_string(r#"<html><body><a href="/a-b-c-d-headline">link</a></body></html>"#),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/a-b-c-d-headline"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html")
                .set_body_string("<html><body>article body</body></html>"),
        )
        .mount(&server)
        .await;

    let seed = Url::parse(&server.uri()).unwrap();
    let source = source_for("s1", seed, &host, 3);
    let factory = Factory::new(
        Arc::new(StaticSourceStore(source)),
        None,
        vec![],
        None,
        no_robots_config(),
    );

    let crawler = factory.create("s1").await.unwrap();
    crawler.start().await.unwrap();
    crawler.wait().await;

    let metrics = crawler.metrics().await;
    assert_eq!(metrics.pages_crawled, 2);
    assert_eq!(metrics.errors, 0);
    assert!(crawler.start_url_hashes().await.contains_key("s1"));
}

/// §8 scenario 2: cross-domain redirect on the seed aborts `Start`.
#[tokio::test]
async fn cross_domain_seed_redirect_aborts_start() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .respond_with(ResponseTemplate::new(301).insert_header("Location", "https://evil.example/"))
        .mount(&server)
        .await;

    let seed = Url::parse(&server.uri()).unwrap();
    let host = seed.host_str().unwrap().to_string();
    let source = source_for("s1", seed, &host, 3);
    let factory = Factory::new(
        Arc::new(StaticSourceStore(source)),
        None,
        vec![],
        None,
        no_robots_config(),
    );

    let crawler = factory.create("s1").await.unwrap();
    let result = crawler.start().await;
    assert!(matches!(result, Err(CrawlError::CrossDomainRedirect { .. })));

    // Done still closes even on a failed start (§8).
    let mut done = crawler.done();
    tokio::time::timeout(Duration::from_secs(1), done.changed())
        .await
        .expect("done should close promptly")
        .unwrap();
    assert!(*done.borrow());
}

/// §8 scenario 3: transient 503s retried, third attempt succeeds.
#[tokio::test]
async fn transient_error_retried_then_succeeds() {
    let server = MockServer::start().await;
    let host = Url::parse(&server.uri()).unwrap().host_str().unwrap().to_string();

    // First two GETs to "/" 503, third 200 with no further links.
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html")
                .set_body_string("<html><body>no links here</body></html>"),
        )
        .mount(&server)
        .await;

    let seed = Url::parse(&server.uri()).unwrap();
    let source = source_for("s1", seed, &host, 3);
    let config = CrawlerConfig {
        http_retry_max: 2,
        http_retry_delay: Duration::from_millis(5),
        respect_robots_txt: false,
        ..CrawlerConfig::default()
    };
    let factory = Factory::new(Arc::new(StaticSourceStore(source)), None, vec![], None, config);

    let crawler = factory.create("s1").await.unwrap();
    crawler.start().await.unwrap();
    crawler.wait().await;

    let metrics = crawler.metrics().await;
    assert_eq!(metrics.pages_crawled, 1);
    assert_eq!(metrics.requests_failed, 0);
    assert_eq!(metrics.errors, 0);
}

/// §8 scenario 4: non-HTML links are header-gated before the body is read.
#[tokio::test]
async fn non_html_links_are_filtered_at_the_header_gate() {
    let server = MockServer::start().await;
    let host = Url::parse(&server.uri()).unwrap().host_str().unwrap().to_string();

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html")
                .set_body_string(
                    r#"<html><body><a href="/file.pdf">pdf</a><a href="/img.png">img</a></body></html>"#,
                ),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/file.pdf"))
        .respond_with(ResponseTemplate::new(200).insert_header("content-type", "application/pdf"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/img.png"))
        .respond_with(ResponseTemplate::new(200).insert_header("content-type", "image/png"))
        .mount(&server)
        .await;

    let seed = Url::parse(&server.uri()).unwrap();
    let source = source_for("s1", seed, &host, 3);
    let factory = Factory::new(
        Arc::new(StaticSourceStore(source)),
        None,
        vec![],
        None,
        no_robots_config(),
    );

    let crawler = factory.create("s1").await.unwrap();
    crawler.start().await.unwrap();
    crawler.wait().await;

    let metrics = crawler.metrics().await;
    assert_eq!(metrics.skipped_non_html, 2);
    assert_eq!(metrics.pages_crawled, 1);
}

/// §8 scenario 5: a depth-1 cap rejects links discovered two hops out.
#[tokio::test]
async fn max_depth_cap_rejects_the_second_hop() {
    let server = MockServer::start().await;
    let host = Url::parse(&server.uri()).unwrap().host_str().unwrap().to_string();

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html")
                .set_body_string(r#"<html><body><a href="/a/b-c-d-e">one hop</a></body></html>"#),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/a/b-c-d-e"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html")
                .set_body_string(r#"<html><body><a href="/deep/f-g-h-i">two hops</a></body></html>"#),
        )
        .mount(&server)
        .await;

    let seed = Url::parse(&server.uri()).unwrap();
    let source = source_for("s1", seed, &host, 1);
    let factory = Factory::new(
        Arc::new(StaticSourceStore(source)),
        None,
        vec![],
        None,
        no_robots_config(),
    );

    let crawler = factory.create("s1").await.unwrap();
    crawler.start().await.unwrap();
    crawler.wait().await;

    let metrics = crawler.metrics().await;
    assert_eq!(metrics.pages_crawled, 2);
    assert_eq!(metrics.skipped_max_depth, 1);
}

/// §8 scenario 6: two factory-minted crawlers share the start-URL-hash map
/// but never share frontiers, and their hashes differ when the bodies do.
#[tokio::test]
async fn concurrent_factory_crawls_share_distinct_hashes() {
    let server_a = MockServer::start().await;
    let server_b = MockServer::start().await;
    let host_a = Url::parse(&server_a.uri()).unwrap().host_str().unwrap().to_string();
    let host_b = Url::parse(&server_b.uri()).unwrap().host_str().unwrap().to_string();

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html")
                .set_body_string("<html><body>body A</body></html>"),
        )
        .mount(&server_a)
        .await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html")
                .set_body_string("<html><body>body B, totally different</body></html>"),
        )
        .mount(&server_b)
        .await;

    struct TwoSourceStore {
        a: Source,
        b: Source,
    }

    #[async_trait]
    impl SourceStore for TwoSourceStore {
        async fn by_id(&self, id: &str) -> Result<Source, CrawlError> {
            match id {
                "s1" => Ok(self.a.clone()),
                "s2" => Ok(self.b.clone()),
                other => Err(CrawlError::InvalidConfig {
                    message: format!("unknown source {other}"),
                    source: None,
                }),
            }
        }
    }

    let store = Arc::new(TwoSourceStore {
        a: source_for("s1", Url::parse(&server_a.uri()).unwrap(), &host_a, 1),
        b: source_for("s2", Url::parse(&server_b.uri()).unwrap(), &host_b, 1),
    });

    let factory = Arc::new(Factory::new(store, None, vec![], None, no_robots_config()));

    let crawler_a = factory.create("s1").await.unwrap();
    let crawler_b = factory.create("s2").await.unwrap();

    let (ra, rb) = tokio::join!(
        async {
            crawler_a.start().await.unwrap();
            crawler_a.wait().await;
        },
        async {
            crawler_b.start().await.unwrap();
            crawler_b.wait().await;
        }
    );
    let _ = (ra, rb);

    let hash_a = factory.start_url_hash("s1").await.expect("s1 hash recorded");
    let hash_b = factory.start_url_hash("s2").await.expect("s2 hash recorded");
    assert_ne!(hash_a, hash_b);
    assert_eq!(
        crawler_a.start_url_hashes().await.get("s1"),
        Some(&hash_a)
    );
}
