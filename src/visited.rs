//! Visited set (§4.8): de-dup of absolute URLs. A URL is added *before*
//! dispatch; re-insertion is rejected. Two implementations share one
//! capability trait: in-memory (per-crawl) and an external K/V store.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::warn;

/// `{checkAndInsert, size}` capability (§9 design notes). Implementations
/// must be atomic: concurrent workers racing on the same URL must not both
/// observe a fresh insert.
#[async_trait]
pub trait VisitedStore: Send + Sync {
    /// Returns `true` if `url` was newly inserted, `false` if already present.
    async fn check_and_insert(&self, url: &str) -> bool;

    async fn size(&self) -> usize;
}

/// In-memory variant: a hash set behind a mutex.
#[derive(Default)]
pub struct InMemoryVisitedStore {
    seen: Mutex<HashSet<String>>,
}

impl InMemoryVisitedStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VisitedStore for InMemoryVisitedStore {
    async fn check_and_insert(&self, url: &str) -> bool {
        self.seen.lock().await.insert(url.to_string())
    }

    async fn size(&self) -> usize {
        self.seen.lock().await.len()
    }
}

/// External (Redis-backed) variant. Key prefix `crawler:{source_id}:visited:{url}`
/// with a configured TTL (§3, §4.8). Gated behind the `external-visited-store`
/// feature since it pulls in a live connection at setup.
#[cfg(feature = "external-visited-store")]
pub struct RedisVisitedStore {
    conn: Mutex<redis::aio::MultiplexedConnection>,
    key_prefix: String,
    ttl: Duration,
}

#[cfg(feature = "external-visited-store")]
impl RedisVisitedStore {
    pub async fn connect(
        address: &str,
        password: Option<&str>,
        db: i64,
        source_id: &str,
        ttl: Duration,
    ) -> anyhow::Result<Self> {
        let mut url = address.to_string();
        if let Some(pw) = password {
            url = url.replacen("redis://", &format!("redis://:{pw}@"), 1);
        }
        let client = redis::Client::open(url)?;
        let mut conn = client.get_multiplexed_async_connection().await?;
        if db != 0 {
            redis::cmd("SELECT")
                .arg(db)
                .query_async::<_, ()>(&mut conn)
                .await?;
        }
        Ok(Self {
            conn: Mutex::new(conn),
            key_prefix: format!("crawler:{source_id}"),
            ttl,
        })
    }

    fn key(&self, url: &str) -> String {
        format!("{}:visited:{}", self.key_prefix, url)
    }
}

#[cfg(feature = "external-visited-store")]
#[async_trait]
impl VisitedStore for RedisVisitedStore {
    async fn check_and_insert(&self, url: &str) -> bool {
        use redis::AsyncCommands;
        let key = self.key(url);
        let mut conn = self.conn.lock().await;
        let ttl_secs = self.ttl.as_secs().max(1) as usize;
        let result: redis::RedisResult<bool> = conn.set_nx(&key, 1).await;
        match result {
            Ok(true) => {
                let _: redis::RedisResult<()> = conn.expire(&key, ttl_secs as i64).await;
                true
            }
            Ok(false) => false,
            Err(e) => {
                warn!(url = %url, error = %e, "redis visited-store error, treating as not-visited");
                true
            }
        }
    }

    async fn size(&self) -> usize {
        0
    }
}

/// Build the configured visited store, degrading to in-memory with a warn
/// log on any external-store setup failure — **never fails the crawl**
/// (§4.8, §5).
#[cfg(feature = "external-visited-store")]
pub async fn build_visited_store(
    config: &crate::config::ExternalStoreConfig,
    source_id: &str,
) -> Arc<dyn VisitedStore> {
    if !config.enabled {
        return Arc::new(InMemoryVisitedStore::new());
    }
    match RedisVisitedStore::connect(
        &config.address,
        config.password.as_deref(),
        config.db,
        source_id,
        config.expires,
    )
    .await
    {
        Ok(store) => Arc::new(store),
        Err(e) => {
            warn!(error = %e, "external visited-store setup failed, falling back to in-memory");
            Arc::new(InMemoryVisitedStore::new())
        }
    }
}

#[cfg(not(feature = "external-visited-store"))]
pub async fn build_visited_store(
    config: &crate::config::ExternalStoreConfig,
    _source_id: &str,
) -> Arc<dyn VisitedStore> {
    if config.enabled {
        warn!("external visited-store requested but the `external-visited-store` feature is not compiled in; falling back to in-memory");
    }
    Arc::new(InMemoryVisitedStore::new())
}
