//! Crawl orchestration: sitemap resolution, bounded-concurrency page
//! processing, and run accounting.
//!
//! Each URL goes through fetch → extract → persist inside its own task; a
//! semaphore caps how many are in flight while the shared rate limiter in
//! [`HttpClient`] paces the actual requests. Per-URL failures are absorbed
//! into the summary; only systemic failures (no usable sitemap, storage
//! errors) abort the run.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use sqlx::SqlitePool;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::domain::product::ProductRecord;
use crate::infrastructure::config::AppConfig;
use crate::infrastructure::extraction::PageExtractor;
use crate::infrastructure::http_client::HttpClient;
use crate::infrastructure::materials::extract_compositions;
use crate::infrastructure::product_repository::ProductRepository;
use crate::infrastructure::sitemap::{SitemapConfig, SitemapResolver};

/// What happened to one URL.
#[derive(Debug)]
pub enum UrlOutcome {
    /// Product found and stored.
    Persisted {
        product_id: i64,
        variants: usize,
        new_reviews: usize,
        duplicate_reviews: usize,
        material_links: usize,
    },
    /// Page fetched fine but carried no product markup.
    NoProduct,
    /// Fetch failed after the retry budget.
    FetchFailed,
}

/// Aggregated results of a crawl run.
#[derive(Debug, Default, Clone, Copy, Serialize)]
pub struct CrawlSummary {
    pub urls_considered: usize,
    pub products_persisted: usize,
    pub pages_without_product: usize,
    pub fetch_failures: usize,
    pub variants_written: usize,
    pub reviews_inserted: usize,
    pub reviews_duplicate: usize,
    pub material_links: usize,
    pub elapsed_ms: u128,
}

impl CrawlSummary {
    fn absorb(&mut self, outcome: &UrlOutcome) {
        match outcome {
            UrlOutcome::Persisted {
                variants,
                new_reviews,
                duplicate_reviews,
                material_links,
                ..
            } => {
                self.products_persisted += 1;
                self.variants_written += variants;
                self.reviews_inserted += new_reviews;
                self.reviews_duplicate += duplicate_reviews;
                self.material_links += material_links;
            }
            UrlOutcome::NoProduct => self.pages_without_product += 1,
            UrlOutcome::FetchFailed => self.fetch_failures += 1,
        }
    }
}

/// Shared handles every per-URL task needs.
pub struct CrawlContext {
    pub client: Arc<HttpClient>,
    pub extractor: PageExtractor,
    pub repository: ProductRepository,
    pub base_domain: String,
}

pub struct CrawlEngine {
    context: Arc<CrawlContext>,
    resolver: SitemapResolver,
    concurrency: usize,
}

impl CrawlEngine {
    pub fn new(config: &AppConfig, pool: Arc<SqlitePool>) -> Result<Self> {
        let client = Arc::new(HttpClient::new(&config.network)?);
        let sitemap_config = SitemapConfig::from_crawler_config(&config.crawler)?;
        let resolver = SitemapResolver::new(Arc::clone(&client), sitemap_config);

        let context = Arc::new(CrawlContext {
            client,
            extractor: PageExtractor::new()?,
            repository: ProductRepository::new(pool, config.storage.enable_fts),
            base_domain: config.crawler.base_domain.clone(),
        });

        Ok(Self {
            context,
            resolver,
            concurrency: config.crawler.concurrency.max(1),
        })
    }

    /// Run one full crawl: discover and resolve sitemaps, then process every
    /// candidate URL under the concurrency cap.
    pub async fn run(&self) -> Result<CrawlSummary> {
        let started = Instant::now();

        let roots = self
            .resolver
            .discover()
            .await
            .context("Sitemap discovery failed")?;
        let urls = self
            .resolver
            .resolve(&roots)
            .await
            .context("Sitemap resolution failed")?;

        info!(
            "Crawling {} URL(s) on {} with concurrency {}",
            urls.len(),
            self.context.base_domain,
            self.concurrency
        );

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut handles = Vec::with_capacity(urls.len());
        for url in &urls {
            let permit_source = Arc::clone(&semaphore);
            let context = Arc::clone(&self.context);
            let url = url.clone();
            handles.push(tokio::spawn(async move {
                let _permit = permit_source
                    .acquire_owned()
                    .await
                    .context("Crawl semaphore closed")?;
                process_url(&context, &url).await
            }));
        }

        let mut summary = CrawlSummary {
            urls_considered: urls.len(),
            ..CrawlSummary::default()
        };
        for joined in futures::future::join_all(handles).await {
            match joined {
                Ok(Ok(outcome)) => summary.absorb(&outcome),
                Ok(Err(e)) => return Err(e.context("Page processing failed")),
                Err(e) => return Err(anyhow::Error::new(e).context("Crawl task panicked")),
            }
        }

        summary.elapsed_ms = started.elapsed().as_millis();
        info!(
            "Crawl finished: {}/{} product(s) persisted, {} variant(s), {} new review(s) \
             ({} duplicate), {} material link(s), {} fetch failure(s) in {} ms",
            summary.products_persisted,
            summary.urls_considered,
            summary.variants_written,
            summary.reviews_inserted,
            summary.reviews_duplicate,
            summary.material_links,
            summary.fetch_failures,
            summary.elapsed_ms
        );
        Ok(summary)
    }
}

/// Fetch one page, extract its structured data, and persist everything.
///
/// Fetch exhaustion and product-less pages are outcomes, not errors; storage
/// failures propagate and abort the run.
pub async fn process_url(context: &CrawlContext, url: &str) -> Result<UrlOutcome> {
    let html = match context.client.fetch_text(url).await {
        Ok(html) => html,
        Err(e) => {
            warn!("Skipping {url}: {e}");
            return Ok(UrlOutcome::FetchFailed);
        }
    };

    let page = context.extractor.extract(&html, url);
    let Some(extracted) = &page.product else {
        debug!("No product markup on {url}");
        return Ok(UrlOutcome::NoProduct);
    };

    let now = Utc::now();
    let record = ProductRecord {
        source_domain: context.base_domain.clone(),
        url: url.to_string(),
        sku: extracted.sku.clone(),
        name: extracted.name.clone(),
        brand: extracted.brand.clone(),
        description: extracted.description.clone(),
        category: extracted.category.clone(),
        images: extracted.images.clone(),
        materials: page.materials_payload(),
        created_at: now,
        updated_at: now,
    };

    let repo = &context.repository;
    let product_id = repo.upsert_product(&record).await?;
    repo.replace_variants(product_id, &extracted.variants).await?;

    let mut new_reviews = 0usize;
    let mut duplicate_reviews = 0usize;
    for review in &page.reviews {
        if repo.insert_review(product_id, url, review).await? {
            new_reviews += 1;
        } else {
            duplicate_reviews += 1;
        }
    }

    let mut material_links = 0usize;
    for (mention, source) in page.material_mentions() {
        for composition in extract_compositions(&mention) {
            let material_id = repo.upsert_material(&composition.material).await?;
            repo.link_material(
                product_id,
                material_id,
                composition.percentage,
                source,
                &composition.raw,
            )
            .await?;
            material_links += 1;
        }
    }

    debug!(
        "Persisted {url}: product {product_id}, {} variant(s), {new_reviews} new review(s)",
        extracted.variants.len()
    );
    Ok(UrlOutcome::Persisted {
        product_id,
        variants: extracted.variants.len(),
        new_reviews,
        duplicate_reviews,
        material_links,
    })
}
