//! Frontier (§GLOSSARY): the queue of URLs awaiting dispatch. Per-domain
//! rate limiting and bounded parallelism are applied at *pop* time by the
//! fetch scheduler (§4.9); the frontier itself is a plain FIFO queue of
//! [`FrontierEntry`] values.

use tokio::sync::Mutex;
use std::collections::VecDeque;

use crate::types::FrontierEntry;

/// An unbounded FIFO frontier. Ordering across workers is not guaranteed by
/// the spec (§5); FIFO keeps discovery order stable for a single worker.
pub struct Frontier {
    queue: Mutex<VecDeque<FrontierEntry>>,
}

impl Frontier {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
        }
    }

    pub async fn push(&self, entry: FrontierEntry) {
        self.queue.lock().await.push_back(entry);
    }

    pub async fn pop(&self) -> Option<FrontierEntry> {
        self.queue.lock().await.pop_front()
    }

    pub async fn len(&self) -> usize {
        self.queue.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.queue.lock().await.is_empty()
    }
}

impl Default for Frontier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    #[tokio::test]
    async fn fifo_ordering() {
        let frontier = Frontier::new();
        frontier
            .push(FrontierEntry::seed(Url::parse("https://ex.com/a").unwrap()))
            .await;
        frontier
            .push(FrontierEntry::seed(Url::parse("https://ex.com/b").unwrap()))
            .await;

        let first = frontier.pop().await.unwrap();
        assert_eq!(first.url.as_str(), "https://ex.com/a");
        let second = frontier.pop().await.unwrap();
        assert_eq!(second.url.as_str(), "https://ex.com/b");
        assert!(frontier.pop().await.is_none());
    }

    #[tokio::test]
    async fn child_entry_increments_depth_and_sets_referer() {
        let parent = FrontierEntry {
            url: Url::parse("https://ex.com/a").unwrap(),
            depth: 1,
            referer: None,
            retry_count: 0,
        };
        let child = parent.child(Url::parse("https://ex.com/b").unwrap());
        assert_eq!(child.depth, 2);
        assert_eq!(child.referer.unwrap().as_str(), "https://ex.com/a");
    }
}
