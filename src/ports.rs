//! Inward collaborator interfaces (§6): narrow `async_trait` seams for the
//! subsystems this crate treats as out of scope (§1). Tests stub these
//! directly, the same seam pattern used elsewhere in this codebase against
//! its own service-boundary traits.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::CrawlError;
use crate::types::{ArchiveTask, ContentType, DiscoveredLink, Page, Source};

/// Source-registry lookup (§1, §6).
#[async_trait]
pub trait SourceStore: Send + Sync {
    async fn by_id(&self, id: &str) -> Result<Source, CrawlError>;
}

/// Object-store archiver (§1, §6). Archive failures are never fatal to the
/// crawl (§4.5, §7) — callers log at warn and continue.
#[async_trait]
pub trait Archiver: Send + Sync {
    async fn archive(&self, task: ArchiveTask) -> Result<(), CrawlError>;

    async fn close(&self) -> Result<(), CrawlError> {
        Ok(())
    }
}

/// Downstream content sink (§1, §6).
#[async_trait]
pub trait Processor: Send + Sync {
    fn can_process(&self, content_type: ContentType) -> bool;

    /// Returns `Ok(())` on success. A processor with no handler for this
    /// content type should make `can_process` return `false` rather than
    /// erroring here; the response pipeline only calls `process` after
    /// checking `can_process`.
    async fn process(&self, page: Page) -> Result<(), CrawlError>;
}

/// Relational sink for discovered-link persistence (§1, §4.4, §6).
#[async_trait]
pub trait LinkSink: Send + Sync {
    async fn create_or_update(&self, link: DiscoveredLink) -> Result<(), CrawlError>;
}

/// Structured per-job logging sink (§1, §6). `job_logger.rs`-shaped: a thin
/// wrapper that tags every line with job-scoped fields. The default
/// implementation forwards straight to `tracing`, matching how the rest of
/// this codebase treats log transport as ambient rather than a collaborator
/// to inject.
pub trait JobLogger: Send + Sync {
    fn log(&self, category: LogCategory, message: &str, fields: &HashMap<String, String>);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogCategory {
    Lifecycle,
    Fetch,
    Queue,
    Metrics,
    Error,
}

impl LogCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogCategory::Lifecycle => "lifecycle",
            LogCategory::Fetch => "fetch",
            LogCategory::Queue => "queue",
            LogCategory::Metrics => "metrics",
            LogCategory::Error => "error",
        }
    }
}

/// Default `JobLogger` that ships every line through `tracing`.
pub struct TracingJobLogger {
    pub source_id: String,
}

impl JobLogger for TracingJobLogger {
    fn log(&self, category: LogCategory, message: &str, fields: &HashMap<String, String>) {
        tracing::info!(
            source_id = %self.source_id,
            category = category.as_str(),
            fields = ?fields,
            "{}",
            message
        );
    }
}
