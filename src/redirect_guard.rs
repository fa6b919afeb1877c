//! Redirect guard (§4.3): a pre-crawl HEAD check on the seed URL that aborts
//! the crawl if it redirects off-domain.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use tracing::warn;
use url::Url;

use crate::error::CrawlError;
use crate::types::Source;

/// Timeout for the redirect-guard HEAD request (§5).
pub const REDIRECT_GUARD_TIMEOUT: Duration = Duration::from_secs(10);

const REDIRECT_STATUSES: &[StatusCode] = &[
    StatusCode::MOVED_PERMANENTLY,
    StatusCode::FOUND,
    StatusCode::SEE_OTHER,
    StatusCode::TEMPORARY_REDIRECT,
    StatusCode::PERMANENT_REDIRECT,
];

/// Issue a HEAD request to the seed with redirect-following disabled. Any
/// transport error is non-fatal (logged at warn, crawl continues); a
/// same-domain or relative redirect passes; a cross-domain redirect aborts
/// the crawl with [`CrawlError::CrossDomainRedirect`].
pub async fn check(client: &Client, source: &Source) -> Result<(), CrawlError> {
    let response = match client
        .head(source.url.clone())
        .timeout(REDIRECT_GUARD_TIMEOUT)
        .send()
        .await
    {
        Ok(r) => r,
        Err(e) => {
            warn!(url = %source.url, error = %e, "redirect guard: transport error, continuing");
            return Ok(());
        }
    };

    if !REDIRECT_STATUSES.contains(&response.status()) {
        return Ok(());
    }

    let Some(location) = response
        .headers()
        .get(reqwest::header::LOCATION)
        .and_then(|v| v.to_str().ok())
    else {
        return Ok(());
    };

    let resolved = match Url::parse(location) {
        Ok(u) => u,
        Err(_) => match source.url.join(location) {
            Ok(u) => u,
            Err(_) => return Ok(()),
        },
    };

    let Some(host) = resolved.host_str() else {
        return Ok(());
    };

    if !source.allows_host(host) {
        return Err(CrawlError::CrossDomainRedirect {
            location: resolved.to_string(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn source_for(url: Url, allowed: Vec<&str>) -> Source {
        Source {
            id: "s1".to_string(),
            name: "s1".to_string(),
            url,
            start_urls: vec![],
            allowed_domains: allowed.into_iter().map(String::from).collect(),
            rule_patterns: vec![],
            rate_limit: Duration::from_secs(1),
            max_depth: 3,
            selectors: Default::default(),
            article_url_patterns: vec![],
        }
    }

    #[tokio::test]
    async fn cross_domain_redirect_aborts() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(
                ResponseTemplate::new(301).insert_header("Location", "https://evil.com/"),
            )
            .mount(&server)
            .await;

        let client = Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap();
        let seed = Url::parse(&server.uri()).unwrap();
        let source = source_for(seed, vec!["ex.com"]);

        let result = check(&client, &source).await;
        assert!(matches!(result, Err(CrawlError::CrossDomainRedirect { .. })));
    }

    #[tokio::test]
    async fn same_domain_redirect_passes() {
        let server = MockServer::start().await;
        let location = format!("{}/elsewhere", server.uri());
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(302).insert_header("Location", location.as_str()))
            .mount(&server)
            .await;

        let client = Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap();
        let seed = Url::parse(&server.uri()).unwrap();
        let host = seed.host_str().unwrap().to_string();
        let source = source_for(seed, vec![&host]);

        assert!(check(&client, &source).await.is_ok());
    }

    #[tokio::test]
    async fn non_redirect_status_passes() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let client = Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap();
        let seed = Url::parse(&server.uri()).unwrap();
        let source = source_for(seed, vec!["ex.com"]);

        assert!(check(&client, &source).await.is_ok());
    }
}
