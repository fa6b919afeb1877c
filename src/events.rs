//! Event bus (§6 wire contract): `{type, source_id, url, timestamp, extra}`.
//! A thin broadcast wrapper consumers `Subscribe` against (§6 `Crawler::Subscribe`).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub source_id: String,
    pub url: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub extra: HashMap<String, String>,
}

impl CrawlEvent {
    pub fn new(event_type: impl Into<String>, source_id: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            source_id: source_id.into(),
            url: None,
            timestamp: Utc::now(),
            extra: HashMap::new(),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Render the `{type, source_id, url, timestamp, extra}` wire contract
    /// (§6) as JSON, for consumers that subscribe over a network transport
    /// rather than an in-process channel.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

pub type EventHandler = std::sync::Arc<dyn Fn(CrawlEvent) + Send + Sync>;

/// Fan-out event bus backed by a `tokio::sync::broadcast` channel. Handlers
/// registered via `Subscribe` (§6) run synchronously on emit; a broadcast
/// receiver is also exposed for async consumers.
pub struct EventBus {
    tx: broadcast::Sender<CrawlEvent>,
    handlers: tokio::sync::Mutex<Vec<EventHandler>>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(256);
        Self {
            tx,
            handlers: tokio::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn subscribe_channel(&self) -> broadcast::Receiver<CrawlEvent> {
        self.tx.subscribe()
    }

    pub async fn subscribe(&self, handler: EventHandler) {
        self.handlers.lock().await.push(handler);
    }

    pub async fn emit(&self, event: CrawlEvent) {
        let _ = self.tx.send(event.clone());
        for handler in self.handlers.lock().await.iter() {
            handler(event.clone());
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn emitted_events_reach_subscribers() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        bus.subscribe(Arc::new(move |_event| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        }))
        .await;

        bus.emit(CrawlEvent::new("page_crawled", "s1").with_url("https://ex.com/")).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn broadcast_channel_receives_events() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe_channel();
        bus.emit(CrawlEvent::new("started", "s1")).await;
        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_type, "started");
    }

    #[test]
    fn renders_wire_contract_as_json() {
        let event = CrawlEvent::new("page_crawled", "s1").with_url("https://ex.com/");
        let json = event.to_json().unwrap();
        assert!(json.contains("\"type\":\"page_crawled\""));
        assert!(json.contains("\"source_id\":\"s1\""));
    }
}
