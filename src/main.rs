//! Entry point: load configuration, open the store, run one crawl.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use shopcrawl::infrastructure::logging::init_logging;
use shopcrawl::{AppConfig, CrawlEngine, DatabaseConnection};

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::var_os("SHOPCRAWL_CONFIG").map(PathBuf::from);
    let config = AppConfig::load(config_path.as_deref())
        .context("Failed to load configuration")?;

    init_logging(&config.logging)?;
    info!(
        "Starting crawl of {} into {}",
        config.crawler.base_domain, config.storage.database_url
    );

    let db = DatabaseConnection::new(&config.storage.database_url).await?;
    db.migrate(config.storage.enable_fts).await?;

    let engine = CrawlEngine::new(&config, Arc::new(db.pool().clone()))?;
    let summary = engine.run().await?;

    let stats = shopcrawl::infrastructure::ProductRepository::new(
        Arc::new(db.pool().clone()),
        config.storage.enable_fts,
    )
    .statistics()
    .await?;
    info!(
        "Store now holds {} product(s), {} variant(s), {} review(s)",
        stats.products, stats.variants, stats.reviews
    );

    // machine-readable run result on stdout, logs stay on stderr
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
