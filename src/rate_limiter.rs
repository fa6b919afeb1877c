//! Rate limiter (§4.7): per-domain delay with jitter, plus bounded in-flight
//! parallelism, used by the fetch scheduler at pop time.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use rand::Rng;
use tokio::sync::{Mutex, RwLock, Semaphore};
use tracing::error;

/// Fallback rate limit when parsing fails (§4.7).
pub const DEFAULT_RATE_LIMIT: Duration = Duration::from_secs(2);

/// Jitter is uniform in `[0, delay / RANDOM_DELAY_DIVISOR]` (§4.7, §9 open
/// question: made an explicit named constant rather than an implicit `2`).
pub const RANDOM_DELAY_DIVISOR: u32 = 2;

/// Default bounded in-flight parallelism per host.
pub const DEFAULT_PARALLELISM: usize = 2;

/// Parse a flexible textual rate-limit form: duration strings ("10s", "1m")
/// or bare integers interpreted as seconds ("10"). Falls back to
/// [`DEFAULT_RATE_LIMIT`] with an error log on parse failure (§4.7).
pub fn parse_rate_limit(input: &str) -> Result<Duration> {
    let trimmed = input.trim();
    if let Ok(secs) = trimmed.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    if let Some(stripped) = trimmed.strip_suffix("ms") {
        if let Ok(ms) = stripped.parse::<u64>() {
            return Ok(Duration::from_millis(ms));
        }
    }
    if let Some(stripped) = trimmed.strip_suffix('s') {
        if let Ok(secs) = stripped.parse::<f64>() {
            return Ok(Duration::from_secs_f64(secs));
        }
    }
    if let Some(stripped) = trimmed.strip_suffix('m') {
        if let Ok(mins) = stripped.parse::<f64>() {
            return Ok(Duration::from_secs_f64(mins * 60.0));
        }
    }
    if let Some(stripped) = trimmed.strip_suffix('h') {
        if let Ok(hours) = stripped.parse::<f64>() {
            return Ok(Duration::from_secs_f64(hours * 3600.0));
        }
    }
    Err(anyhow!("unparseable rate limit: {input}"))
}

/// Parse with the spec's fallback-on-failure behaviour baked in (logs at
/// error and returns the default rather than propagating).
pub fn parse_rate_limit_or_default(input: &str) -> Duration {
    match parse_rate_limit(input) {
        Ok(d) => d,
        Err(e) => {
            error!(input = %input, error = %e, "failed to parse rate limit, using default");
            DEFAULT_RATE_LIMIT
        }
    }
}

struct HostState {
    last_dispatch: Mutex<Option<Instant>>,
    semaphore: Arc<Semaphore>,
}

/// Per-domain delay + jitter + bounded in-flight parallelism. Domain-keyed,
/// though the uniform `"*"` entry is what's actually consulted today (§4.7).
pub struct RateLimiter {
    delay: RwLock<Duration>,
    parallelism: usize,
    hosts: RwLock<HashMap<String, Arc<HostState>>>,
}

impl RateLimiter {
    pub fn new(delay: Duration, parallelism: usize) -> Self {
        Self {
            delay: RwLock::new(delay),
            parallelism: parallelism.max(1),
            hosts: RwLock::new(HashMap::new()),
        }
    }

    /// Non-jittered delay setter for runtime tuning (§6 `SetRateLimit`).
    pub async fn set_delay(&self, delay: Duration) {
        *self.delay.write().await = delay;
    }

    pub async fn delay(&self) -> Duration {
        *self.delay.read().await
    }

    async fn host_state(&self, host: &str) -> Arc<HostState> {
        if let Some(state) = self.hosts.read().await.get(host) {
            return state.clone();
        }
        let mut hosts = self.hosts.write().await;
        if let Some(state) = hosts.get(host) {
            return state.clone();
        }
        let state = Arc::new(HostState {
            last_dispatch: Mutex::new(None),
            semaphore: Arc::new(Semaphore::new(self.parallelism)),
        });
        hosts.insert(host.to_string(), state.clone());
        state
    }

    /// Acquire a dispatch slot for `host`: waits out the per-domain delay
    /// (plus jitter) since the last dispatch, then acquires one of the
    /// bounded in-flight permits. The returned guard releases the permit on
    /// drop.
    pub async fn acquire(&self, host: &str) -> tokio::sync::OwnedSemaphorePermit {
        let state = self.host_state(host).await;

        {
            let mut last = state.last_dispatch.lock().await;
            if let Some(prev) = *last {
                let base = self.delay().await;
                let jitter_max_nanos = (base.as_nanos() / RANDOM_DELAY_DIVISOR as u128).max(1);
                let jitter_nanos = rand::thread_rng().gen_range(0..jitter_max_nanos as u64);
                let wait = base + Duration::from_nanos(jitter_nanos);
                let elapsed = prev.elapsed();
                if elapsed < wait {
                    tokio::time::sleep(wait - elapsed).await;
                }
            }
            *last = Some(Instant::now());
        }

        state
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .expect("semaphore is never closed")
    }

    /// Current available in-flight slots for `host` (for tests/metrics).
    pub async fn available_permits(&self, host: &str) -> usize {
        self.host_state(host).await.semaphore.available_permits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_seconds() {
        assert_eq!(parse_rate_limit("10").unwrap(), Duration::from_secs(10));
    }

    #[test]
    fn parses_duration_strings() {
        assert_eq!(parse_rate_limit("10s").unwrap(), Duration::from_secs(10));
        assert_eq!(parse_rate_limit("1m").unwrap(), Duration::from_secs(60));
    }

    #[test]
    fn falls_back_to_default_on_parse_failure() {
        assert_eq!(parse_rate_limit_or_default("not-a-duration"), DEFAULT_RATE_LIMIT);
    }

    #[tokio::test]
    async fn bounds_in_flight_parallelism() {
        let limiter = RateLimiter::new(Duration::from_millis(1), 2);
        let _p1 = limiter.acquire("ex.com").await;
        let _p2 = limiter.acquire("ex.com").await;
        assert_eq!(limiter.available_permits("ex.com").await, 0);
    }

    #[tokio::test]
    async fn releasing_a_permit_frees_a_slot() {
        let limiter = RateLimiter::new(Duration::from_millis(1), 1);
        {
            let _p = limiter.acquire("ex.com").await;
            assert_eq!(limiter.available_permits("ex.com").await, 0);
        }
        assert_eq!(limiter.available_permits("ex.com").await, 1);
    }
}
