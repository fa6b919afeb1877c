//! A politely-concurrent web crawl engine: per-host rate limiting and
//! bounded parallelism, robots.txt enforcement, URL admission rules,
//! article/page classification, and a small capability-trait surface
//! (`SourceStore`, `Archiver`, `Processor`, `LinkSink`, `JobLogger`) for
//! wiring in storage and downstream processing.
//!
//! [`Factory`] mints isolated [`Crawler`] instances from one shared,
//! immutable parameter set; each `Crawler` drives exactly one source
//! through `Start` → `Stop`/`Wait` → `Done`.

pub mod config;
pub mod crawler;
pub mod error;
pub mod events;
pub mod factory;
pub mod frontier;
pub mod html_classifier;
pub mod lifecycle;
pub mod link_handler;
pub mod ports;
pub mod rate_limiter;
pub mod redirect_guard;
pub mod response_pipeline;
pub mod retry;
pub mod robots;
pub mod scheduler;
pub mod signal;
pub mod state;
pub mod types;
pub mod url_classifier;
pub mod visited;

pub use config::CrawlerConfig;
pub use crawler::Crawler;
pub use error::CrawlError;
pub use events::{CrawlEvent, EventBus, EventHandler};
pub use factory::Factory;
pub use lifecycle::LifecycleState;
pub use ports::{Archiver, JobLogger, LinkSink, LogCategory, Processor, SourceStore, TracingJobLogger};
pub use state::MetricsSnapshot;
pub use types::{ContentType, DiscoveredLink, Page, Source};
