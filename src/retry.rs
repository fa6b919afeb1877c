//! Retry policy (§4.6): classifies fetch errors into expected / timeout /
//! transient buckets and drives the bounded retry loop. The attempt count
//! lives on the stack of the fetch call itself, not in a side table keyed
//! by URL (§9 design notes) — a frontier entry is popped once and every
//! retry for it happens inline before the next entry is dispatched.

use std::time::Duration;

use tracing::{debug, error, warn};

use crate::error::CrawlError;
use crate::state::JobMetrics;

/// Outcome of evaluating one fetch error against the retry policy.
pub enum RetryDecision {
    /// Log at debug, do not retry, do not count as a failed request.
    Expected,
    /// Log at warn, do not retry; counts as a failed request.
    Timeout,
    /// Retry if `attempt < max_attempts`, else exhausted.
    Retry,
    /// Retries exhausted or the error is permanent; counts as a failed
    /// request and bumps the error-category histogram.
    Exhausted,
}

/// Classify `err` and record the appropriate metrics/log line (§4.6).
/// `attempt` is the number of attempts already made (0 on the first try).
pub async fn classify(err: &CrawlError, attempt: u32, max_attempts: u32, metrics: &JobMetrics) -> RetryDecision {
    if err.is_expected() {
        debug!(error = %err, "expected error, not retrying");
        if matches!(err, CrawlError::MaxDepth { .. }) {
            metrics.increment_skipped_max_depth();
        }
        return RetryDecision::Expected;
    }

    if matches!(err, CrawlError::Timeout { .. }) {
        warn!(error = %err, "request timed out, not retrying");
        metrics.increment_requests_failed();
        metrics.increment_errors();
        metrics.record_error_category(err.category()).await;
        return RetryDecision::Timeout;
    }

    if err.is_retryable() {
        if attempt < max_attempts {
            debug!(error = %err, attempt, max_attempts, "transient error, scheduling retry");
            return RetryDecision::Retry;
        }
        error!(error = %err, attempts = attempt, "retries exhausted");
        metrics.increment_requests_failed();
        metrics.increment_errors();
        metrics.record_error_category(err.category()).await;
        return RetryDecision::Exhausted;
    }

    error!(error = %err, "permanent error");
    metrics.increment_requests_failed();
    metrics.increment_errors();
    metrics.record_error_category(err.category()).await;
    RetryDecision::Exhausted
}

/// Drive a fallible fetch operation through the bounded HTTP retry policy,
/// sleeping `retry_delay` between attempts (§4.6).
pub async fn with_http_retry<F, Fut, T>(
    max_attempts: u32,
    retry_delay: Duration,
    metrics: &JobMetrics,
    mut op: F,
) -> Result<T, CrawlError>
where
    F: FnMut(u32) -> Fut,
    Fut: std::future::Future<Output = Result<T, CrawlError>>,
{
    let mut attempt = 0;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) => match classify(&err, attempt, max_attempts, metrics).await {
                RetryDecision::Retry => {
                    attempt += 1;
                    tokio::time::sleep(retry_delay).await;
                    continue;
                }
                _ => return Err(err),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retries_until_success() {
        let metrics = JobMetrics::new();
        let attempts = AtomicU32::new(0);
        let result: Result<&str, CrawlError> = with_http_retry(
            2,
            Duration::from_millis(1),
            &metrics,
            |_attempt| {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(CrawlError::HttpServer { status: 503 })
                    } else {
                        Ok("ok")
                    }
                }
            },
        )
        .await;

        assert_eq!(result.unwrap(), "ok");
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausts_after_max_attempts() {
        let metrics = JobMetrics::new();
        let attempts = AtomicU32::new(0);
        let result: Result<(), CrawlError> = with_http_retry(
            2,
            Duration::from_millis(1),
            &metrics,
            |_attempt| {
                attempts.fetch_add(1, Ordering::SeqCst);
                async move { Err(CrawlError::HttpServer { status: 503 }) }
            },
        )
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert_eq!(metrics.snapshot().await.errors, 1);
    }

    #[tokio::test]
    async fn expected_errors_do_not_retry() {
        let metrics = JobMetrics::new();
        let attempts = AtomicU32::new(0);
        let result: Result<(), CrawlError> = with_http_retry(
            5,
            Duration::from_millis(1),
            &metrics,
            |_attempt| {
                attempts.fetch_add(1, Ordering::SeqCst);
                async move {
                    Err(CrawlError::MaxDepth {
                        depth: 4,
                        max_depth: 3,
                    })
                }
            },
        )
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert_eq!(metrics.snapshot().await.skipped_max_depth, 1);
    }
}
