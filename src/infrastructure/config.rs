//! Configuration infrastructure.
//!
//! Layered loading: built-in defaults, then an optional TOML file, then
//! `SHOPCRAWL_*` environment overrides. Sections mirror the components they
//! configure (crawler, network, storage, logging).

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Complete application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub crawler: CrawlerConfig,
    pub network: NetworkConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

/// Crawl scope: which domain, which sitemaps, how many URLs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// Domain the crawl is confined to; sitemap entries on other hosts are
    /// dropped.
    pub base_domain: String,

    /// Explicit sitemap URLs. When empty, conventional locations and
    /// `robots.txt` are probed instead.
    pub sitemap_urls: Vec<String>,

    /// Regex a URL path must match to count as a product page.
    pub product_path_pattern: String,

    /// Hard cap on URLs processed in one run.
    pub max_urls: usize,

    /// Per-leaf-sitemap entry cap (safety against pathological documents).
    pub max_urls_per_sitemap: usize,

    /// Nesting depth allowed for sitemap indexes referencing other indexes.
    pub max_index_depth: usize,

    /// Simultaneous in-flight page fetches.
    pub concurrency: usize,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            base_domain: "www.patagonia.com".to_string(),
            sitemap_urls: Vec::new(),
            product_path_pattern: r"(?i)/(product|products|p)/".to_string(),
            max_urls: 200,
            max_urls_per_sitemap: 5000,
            max_index_depth: 4,
            concurrency: 5,
        }
    }
}

/// HTTP behavior: pacing, timeouts, retry budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub user_agent: String,

    /// Minimum spacing between any two requests, in milliseconds.
    pub request_delay_ms: u64,

    pub request_timeout_seconds: u64,

    /// Total attempts per URL (first try included).
    pub max_retries: u32,

    /// Base for the exponential backoff schedule, in milliseconds.
    pub retry_base_delay_ms: u64,

    pub follow_redirects: bool,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            user_agent: "shopcrawl/0.2 (product data collector; contact: you@example.com)"
                .to_string(),
            request_delay_ms: 500,
            request_timeout_seconds: 30,
            max_retries: 3,
            retry_base_delay_ms: 1000,
            follow_redirects: true,
        }
    }
}

/// Persistent store location and the optional full-text mirror.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// sqlx SQLite URL, e.g. `sqlite:data/shopcrawl.db`.
    pub database_url: String,

    /// Maintain `products_fts` / `reviews_fts` alongside the base tables.
    pub enable_fts: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite:data/shopcrawl.db".to_string(),
            enable_fts: true,
        }
    }
}

/// Logging configuration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub level: String,

    /// Module-specific level overrides (e.g. "sqlx": "warn").
    pub module_filters: HashMap<String, String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        let mut module_filters = HashMap::new();
        module_filters.insert("sqlx".to_string(), "warn".to_string());
        module_filters.insert("reqwest".to_string(), "warn".to_string());
        Self {
            level: "info".to_string(),
            module_filters,
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, an optional file, and environment
    /// overrides (`SHOPCRAWL_CRAWLER__MAX_URLS=50` style).
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        } else {
            builder = builder.add_source(config::File::with_name("shopcrawl").required(false));
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix("SHOPCRAWL")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to assemble configuration sources")?;

        settings
            .try_deserialize()
            .context("Invalid configuration values")
    }
}
