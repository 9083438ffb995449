//! shopcrawl: single-domain product crawler.
//!
//! Discovers product pages through a site's sitemaps, extracts schema.org
//! Product and Review structured data plus free-text fabric details, and
//! stores everything idempotently in SQLite with an optional FTS5 mirror.
//!
//! The crate splits into three layers:
//! - [`domain`] — the records extraction produces and persistence consumes
//! - [`infrastructure`] — config, HTTP, sitemap resolution, extraction,
//!   material normalization, storage
//! - [`crawling`] — the engine tying the layers into one bounded-concurrency
//!   run

pub mod crawling;
pub mod domain;
pub mod infrastructure;

pub use crawling::{CrawlEngine, CrawlSummary};
pub use infrastructure::{AppConfig, DatabaseConnection};
