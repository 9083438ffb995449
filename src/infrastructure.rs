//! Infrastructure: configuration, HTTP, parsing, and storage.

pub mod config;
pub mod database_connection;
pub mod extraction;
pub mod http_client;
pub mod logging;
pub mod materials;
pub mod product_repository;
pub mod sitemap;

pub use config::AppConfig;
pub use database_connection::DatabaseConnection;
pub use extraction::{ExtractedPage, PageExtractor};
pub use http_client::{FetchError, HttpClient, RetryPolicy};
pub use product_repository::{ProductRepository, StoreStats};
pub use sitemap::{SitemapConfig, SitemapError, SitemapResolver};
