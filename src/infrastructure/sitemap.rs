//! Sitemap discovery and resolution.
//!
//! Turns one or more sitemap URLs (configured, or probed from conventional
//! locations and `robots.txt`) into a deduplicated, capped list of candidate
//! product URLs on the configured domain. Sub-sitemap failures are warnings,
//! not errors; only a run with zero usable root sitemaps fails.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use anyhow::{Context, Result};
use regex::Regex;
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use crate::infrastructure::config::CrawlerConfig;
use crate::infrastructure::http_client::HttpClient;

/// Conventional sitemap locations probed when none are configured.
const SITEMAP_HINTS: [&str; 3] = ["sitemap.xml", "sitemap_index.xml", "sitemap-index.xml"];

#[derive(Debug, Error)]
pub enum SitemapError {
    #[error("no usable sitemap among {candidates} candidates")]
    NoUsableSitemap { candidates: usize },
}

/// Resolver settings, with the product-path pattern compiled up front.
#[derive(Debug, Clone)]
pub struct SitemapConfig {
    pub base_domain: String,
    /// Scheme + host the hint paths and `robots.txt` are probed under.
    pub base_url: String,
    pub sitemap_urls: Vec<String>,
    pub product_path: Regex,
    pub max_urls: usize,
    pub max_urls_per_sitemap: usize,
    pub max_index_depth: usize,
}

impl SitemapConfig {
    pub fn from_crawler_config(config: &CrawlerConfig) -> Result<Self> {
        let product_path = Regex::new(&config.product_path_pattern)
            .context("Invalid product path pattern")?;
        Ok(Self {
            base_domain: config.base_domain.clone(),
            base_url: format!("https://{}/", config.base_domain),
            sitemap_urls: config.sitemap_urls.clone(),
            product_path,
            max_urls: config.max_urls,
            max_urls_per_sitemap: config.max_urls_per_sitemap,
            max_index_depth: config.max_index_depth,
        })
    }
}

/// Expands sitemap and sitemap-index documents into product page URLs.
pub struct SitemapResolver {
    client: Arc<HttpClient>,
    config: SitemapConfig,
    loc: Regex,
}

impl SitemapResolver {
    pub fn new(client: Arc<HttpClient>, config: SitemapConfig) -> Self {
        // <loc> content never contains markup, so a non-greedy scan is enough.
        let loc = Regex::new(r"<loc>\s*([^<]+?)\s*</loc>").expect("static regex");
        Self { client, config, loc }
    }

    /// Root sitemap URLs for this run.
    ///
    /// Explicitly configured URLs are taken as-is. Otherwise the conventional
    /// hint paths plus any `Sitemap:` entries in `robots.txt` are probed, and
    /// candidates that fetch and look like sitemap XML are kept.
    pub async fn discover(&self) -> Result<Vec<String>, SitemapError> {
        if !self.config.sitemap_urls.is_empty() {
            return Ok(self.config.sitemap_urls.clone());
        }

        let base = self.config.base_url.clone();
        let mut candidates: Vec<String> =
            SITEMAP_HINTS.iter().map(|hint| format!("{base}{hint}")).collect();

        match self.client.fetch_text(&format!("{base}robots.txt")).await {
            Ok(robots) => {
                for line in robots.lines() {
                    if let Some(rest) = line.trim().strip_prefix("Sitemap:") {
                        candidates.push(rest.trim().to_string());
                    }
                }
            }
            Err(e) => debug!("robots.txt unavailable: {e}"),
        }

        let mut seen = HashSet::new();
        let mut valid = Vec::new();
        for candidate in candidates {
            if !seen.insert(candidate.clone()) {
                continue;
            }
            match self.client.fetch_text(&candidate).await {
                Ok(text) if looks_like_sitemap(&text) => valid.push(candidate),
                Ok(_) => debug!("{candidate} fetched but is not sitemap XML"),
                Err(e) => debug!("sitemap candidate {candidate} unreachable: {e}"),
            }
        }

        if valid.is_empty() {
            Err(SitemapError::NoUsableSitemap {
                candidates: seen.len(),
            })
        } else {
            info!("Discovered {} sitemap(s) for {}", valid.len(), self.config.base_domain);
            Ok(valid)
        }
    }

    /// Expand the given root sitemaps into candidate product URLs:
    /// recursively resolve index documents, collect `<loc>` entries, filter to
    /// on-domain product paths, dedup preserving order, cap at `max_urls`.
    pub async fn resolve(&self, roots: &[String]) -> Result<Vec<String>, SitemapError> {
        let mut collected = Vec::new();
        let mut usable_roots = 0usize;
        let mut queue: VecDeque<(String, usize)> =
            roots.iter().map(|u| (u.clone(), 0)).collect();

        while let Some((sitemap_url, depth)) = queue.pop_front() {
            let text = match self.client.fetch_text(&sitemap_url).await {
                Ok(text) => text,
                Err(e) => {
                    warn!("Skipping unreachable sitemap {sitemap_url}: {e}");
                    continue;
                }
            };
            if !looks_like_sitemap(&text) {
                warn!("Skipping non-sitemap document at {sitemap_url}");
                continue;
            }
            if depth == 0 {
                usable_roots += 1;
            }

            if is_index(&text) {
                if depth + 1 > self.config.max_index_depth {
                    warn!(
                        "Sitemap index nesting exceeds depth {} at {sitemap_url}, skipping branch",
                        self.config.max_index_depth
                    );
                    continue;
                }
                for child in self.extract_locs(&text) {
                    queue.push_back((child, depth + 1));
                }
            } else {
                let locs = self.extract_locs(&text);
                let count = locs.len().min(self.config.max_urls_per_sitemap);
                collected.extend(locs.into_iter().take(count));
            }
        }

        if usable_roots == 0 {
            return Err(SitemapError::NoUsableSitemap {
                candidates: roots.len(),
            });
        }

        let urls = self.filter_product_urls(collected);
        info!(
            "Resolved {} candidate product URL(s) on {}",
            urls.len(),
            self.config.base_domain
        );
        Ok(urls)
    }

    fn extract_locs(&self, xml: &str) -> Vec<String> {
        self.loc
            .captures_iter(xml)
            .map(|cap| cap[1].to_string())
            .collect()
    }

    /// Same-domain product-path filter with order-preserving dedup and the
    /// global URL cap.
    fn filter_product_urls(&self, urls: Vec<String>) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for raw in urls {
            let Ok(parsed) = Url::parse(&raw) else {
                continue;
            };
            let on_domain = parsed
                .host_str()
                .is_some_and(|host| host.ends_with(&self.config.base_domain));
            if !on_domain || !self.config.product_path.is_match(parsed.path()) {
                continue;
            }
            if seen.insert(raw.clone()) {
                out.push(raw);
            }
            if out.len() >= self.config.max_urls {
                break;
            }
        }
        out
    }
}

fn looks_like_sitemap(text: &str) -> bool {
    text.contains("<urlset") || text.contains("<sitemapindex")
}

fn is_index(text: &str) -> bool {
    text.contains("<sitemapindex")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::config::NetworkConfig;

    fn resolver_for(domain: &str, max_urls: usize) -> SitemapResolver {
        let client = Arc::new(
            HttpClient::new(&NetworkConfig {
                request_delay_ms: 1,
                retry_base_delay_ms: 1,
                max_retries: 1,
                request_timeout_seconds: 5,
                ..NetworkConfig::default()
            })
            .unwrap(),
        );
        let config = SitemapConfig::from_crawler_config(&CrawlerConfig {
            base_domain: domain.to_string(),
            max_urls,
            ..CrawlerConfig::default()
        })
        .unwrap();
        SitemapResolver::new(client, config)
    }

    #[test]
    fn extracts_loc_entries() {
        let resolver = resolver_for("shop.example.com", 100);
        let xml = r#"<?xml version="1.0"?>
            <urlset>
              <url><loc>https://shop.example.com/products/a</loc></url>
              <url><loc> https://shop.example.com/products/b </loc></url>
            </urlset>"#;
        assert_eq!(
            resolver.extract_locs(xml),
            vec![
                "https://shop.example.com/products/a",
                "https://shop.example.com/products/b"
            ]
        );
    }

    #[test]
    fn filters_to_on_domain_product_paths() {
        let resolver = resolver_for("shop.example.com", 100);
        let urls = vec![
            "https://shop.example.com/products/jacket".to_string(),
            "https://shop.example.com/stories/journal".to_string(),
            "https://other.example.net/products/jacket".to_string(),
            "https://shop.example.com/products/jacket".to_string(), // duplicate
            "https://eu.shop.example.com/p/fleece".to_string(),     // subdomain suffix match
            "not a url".to_string(),
        ];
        assert_eq!(
            resolver.filter_product_urls(urls),
            vec![
                "https://shop.example.com/products/jacket",
                "https://eu.shop.example.com/p/fleece",
            ]
        );
    }

    #[test]
    fn caps_total_urls() {
        let resolver = resolver_for("shop.example.com", 2);
        let urls = (0..10)
            .map(|i| format!("https://shop.example.com/products/item-{i}"))
            .collect();
        assert_eq!(resolver.filter_product_urls(urls).len(), 2);
    }

    #[tokio::test]
    async fn index_with_unreachable_leaf_resolves_reachable_side() {
        let mut server = mockito::Server::new_async().await;
        let base = server.url();

        server
            .mock("GET", "/sitemap.xml")
            .with_body(format!(
                r#"<sitemapindex>
                     <sitemap><loc>{base}/sitemap-1.xml</loc></sitemap>
                     <sitemap><loc>{base}/sitemap-2.xml</loc></sitemap>
                   </sitemapindex>"#
            ))
            .create_async()
            .await;
        server
            .mock("GET", "/sitemap-1.xml")
            .with_body(format!(
                r#"<urlset>
                     <url><loc>{base}/products/alpha</loc></url>
                     <url><loc>{base}/about</loc></url>
                   </urlset>"#
            ))
            .create_async()
            .await;
        server
            .mock("GET", "/sitemap-2.xml")
            .with_status(404)
            .create_async()
            .await;

        let resolver = resolver_for("127.0.0.1", 100);
        let urls = resolver
            .resolve(&[format!("{base}/sitemap.xml")])
            .await
            .unwrap();
        assert_eq!(urls, vec![format!("{base}/products/alpha")]);
    }

    #[tokio::test]
    async fn unreachable_root_is_fatal() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/sitemap.xml")
            .with_status(500)
            .create_async()
            .await;

        let resolver = resolver_for("127.0.0.1", 100);
        let err = resolver
            .resolve(&[format!("{}/sitemap.xml", server.url())])
            .await
            .unwrap_err();
        assert!(matches!(err, SitemapError::NoUsableSitemap { candidates: 1 }));
    }

    #[tokio::test]
    async fn discovers_sitemaps_from_robots_txt() {
        let mut server = mockito::Server::new_async().await;
        let base = server.url();

        // hint paths miss; robots.txt points at the real one
        server
            .mock("GET", "/robots.txt")
            .with_body(format!("User-agent: *\nSitemap: {base}/custom-sitemap.xml\n"))
            .create_async()
            .await;
        server
            .mock("GET", "/custom-sitemap.xml")
            .with_body("<urlset></urlset>")
            .create_async()
            .await;

        let client = Arc::new(
            HttpClient::new(&NetworkConfig {
                request_delay_ms: 1,
                retry_base_delay_ms: 1,
                max_retries: 1,
                request_timeout_seconds: 5,
                ..NetworkConfig::default()
            })
            .unwrap(),
        );
        let mut config = SitemapConfig::from_crawler_config(&CrawlerConfig {
            base_domain: "127.0.0.1".to_string(),
            ..CrawlerConfig::default()
        })
        .unwrap();
        config.base_url = format!("{base}/");
        let resolver = SitemapResolver::new(client, config);

        let found = resolver.discover().await.unwrap();
        assert_eq!(found, vec![format!("{base}/custom-sitemap.xml")]);
    }
}
