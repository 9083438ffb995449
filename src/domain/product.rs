//! Core records produced by extraction and consumed by persistence.
//!
//! These are plain data carriers: the extractor fills them from JSON-LD /
//! microdata and the repository maps them onto the relational schema.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A product page's extracted data, keyed by its canonical URL.
///
/// Created on the first successful extraction of a URL; subsequent crawls of
/// the same URL update the mutable fields in place (see
/// `ProductRepository::upsert_product`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductRecord {
    pub source_domain: String,
    pub url: String,
    pub sku: Option<String>,
    pub name: Option<String>,
    pub brand: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    /// Image URLs, stored as a JSON array.
    pub images: Vec<String>,
    /// Material payload (JSON-LD materials, fabric-details text, bullets),
    /// stored as a JSON object.
    pub materials: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One purchasable variant of a product, usually derived from a JSON-LD offer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VariantRecord {
    pub variant_sku: Option<String>,
    pub color: Option<String>,
    pub size: Option<String>,
    pub upc: Option<String>,
    pub ean: Option<String>,
    pub gtin: Option<String>,
    pub price: Option<f64>,
    pub currency: Option<String>,
    pub availability: Option<String>,
    /// Source offer object as received, for later reprocessing.
    pub raw: serde_json::Value,
}

/// A customer review attached to a product.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewRecord {
    pub rating: Option<f64>,
    pub title: Option<String>,
    pub body: Option<String>,
    pub author: Option<String>,
    pub lang: Option<String>,
    pub published_at: Option<String>,
    /// Which extraction path produced this record ("jsonld" or "microdata").
    pub source: String,
    pub raw: serde_json::Value,
}

impl ReviewRecord {
    /// Deduplication key for idempotent ingestion.
    ///
    /// A review with the same (product URL, author, body, rating) collapses to
    /// a single stored row no matter how many crawls encounter it. Missing
    /// fields hash as empty strings; the rating uses a fixed two-decimal
    /// rendering so `4.0` and `4` agree.
    pub fn content_hash(&self, product_url: &str) -> String {
        let rating = self
            .rating
            .map(|r| format!("{r:.2}"))
            .unwrap_or_default();
        let key = format!(
            "{product_url}|{}|{}|{rating}",
            self.author.as_deref().unwrap_or(""),
            self.body.as_deref().unwrap_or(""),
        );
        blake3::hash(key.as_bytes()).to_hex().to_string()
    }
}
