//! Crawl orchestration.

pub mod orchestrator;

pub use orchestrator::{CrawlContext, CrawlEngine, CrawlSummary, UrlOutcome};
