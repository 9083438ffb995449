//! Persistence layer for products, variants, reviews, and materials.
//!
//! All writes are idempotent under re-crawl: products upsert on URL, reviews
//! ignore conflicts on their content hash, variants are replaced wholesale,
//! material links ignore duplicate associations. When the FTS mirror is
//! enabled this layer also propagates every write to `products_fts` /
//! `reviews_fts` — an explicit write-through contract, no database triggers.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use sqlx::SqlitePool;

use crate::domain::product::{ProductRecord, ReviewRecord, VariantRecord};

#[derive(Clone)]
pub struct ProductRepository {
    pool: Arc<SqlitePool>,
    enable_fts: bool,
}

/// Row counts for end-of-run reporting.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct StoreStats {
    pub products: i64,
    pub variants: i64,
    pub reviews: i64,
}

impl ProductRepository {
    pub fn new(pool: Arc<SqlitePool>, enable_fts: bool) -> Self {
        Self { pool, enable_fts }
    }

    /// Insert a new product row, or update the mutable fields of the existing
    /// row for this URL. Returns the product id either way. `created_at` is
    /// only written on first insert.
    pub async fn upsert_product(&self, product: &ProductRecord) -> Result<i64> {
        let images = serde_json::to_string(&product.images)?;
        let materials = product.materials.to_string();

        sqlx::query(
            r"
            INSERT INTO products
              (source_domain, url, sku, name, brand, description, category,
               images, materials, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(url) DO UPDATE SET
              sku = excluded.sku, name = excluded.name, brand = excluded.brand,
              description = excluded.description, category = excluded.category,
              images = excluded.images, materials = excluded.materials,
              updated_at = excluded.updated_at
            ",
        )
        .bind(&product.source_domain)
        .bind(&product.url)
        .bind(&product.sku)
        .bind(&product.name)
        .bind(&product.brand)
        .bind(&product.description)
        .bind(&product.category)
        .bind(&images)
        .bind(&materials)
        .bind(product.created_at.to_rfc3339())
        .bind(product.updated_at.to_rfc3339())
        .execute(&*self.pool)
        .await
        .context("Product upsert failed")?;

        let id: i64 = sqlx::query_scalar("SELECT id FROM products WHERE url = ?")
            .bind(&product.url)
            .fetch_one(&*self.pool)
            .await?;

        if self.enable_fts {
            sqlx::query("DELETE FROM products_fts WHERE rowid = ?")
                .bind(id)
                .execute(&*self.pool)
                .await?;
            sqlx::query("INSERT INTO products_fts (rowid, name, description) VALUES (?, ?, ?)")
                .bind(id)
                .bind(&product.name)
                .bind(&product.description)
                .execute(&*self.pool)
                .await?;
        }

        Ok(id)
    }

    /// Replace the product's variants with the freshly extracted set, in one
    /// transaction. JSON-LD offers carry no stable per-variant key on most
    /// storefronts, so replace-all is the semantics that cannot drift.
    pub async fn replace_variants(
        &self,
        product_id: i64,
        variants: &[VariantRecord],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM variants WHERE product_id = ?")
            .bind(product_id)
            .execute(&mut *tx)
            .await?;

        for variant in variants {
            sqlx::query(
                r"
                INSERT INTO variants
                  (product_id, variant_sku, color, size, upc, ean, gtin,
                   price, currency, availability, raw)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ",
            )
            .bind(product_id)
            .bind(&variant.variant_sku)
            .bind(&variant.color)
            .bind(&variant.size)
            .bind(&variant.upc)
            .bind(&variant.ean)
            .bind(&variant.gtin)
            .bind(variant.price)
            .bind(&variant.currency)
            .bind(&variant.availability)
            .bind(serde_json::to_string(variant)?)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await.context("Variant replacement failed")?;
        Ok(())
    }

    /// Insert a review unless its content hash is already present. Returns
    /// whether a row was actually added.
    pub async fn insert_review(
        &self,
        product_id: i64,
        product_url: &str,
        review: &ReviewRecord,
    ) -> Result<bool> {
        let hash = review.content_hash(product_url);

        let result = sqlx::query(
            r"
            INSERT OR IGNORE INTO reviews
              (product_id, rating, title, body, author, lang, published_at,
               source, raw, unique_hash)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(product_id)
        .bind(review.rating)
        .bind(&review.title)
        .bind(&review.body)
        .bind(&review.author)
        .bind(&review.lang)
        .bind(&review.published_at)
        .bind(&review.source)
        .bind(serde_json::to_string(review)?)
        .bind(&hash)
        .execute(&*self.pool)
        .await
        .context("Review insert failed")?;

        let inserted = result.rows_affected() > 0;
        if inserted && self.enable_fts {
            sqlx::query("INSERT INTO reviews_fts (rowid, body, author) VALUES (?, ?, ?)")
                .bind(result.last_insert_rowid())
                .bind(&review.body)
                .bind(&review.author)
                .execute(&*self.pool)
                .await?;
        }
        Ok(inserted)
    }

    /// Get or create the id for a canonical material name.
    pub async fn upsert_material(&self, name: &str) -> Result<i64> {
        sqlx::query("INSERT OR IGNORE INTO materials (name) VALUES (?)")
            .bind(name)
            .execute(&*self.pool)
            .await?;
        let id = sqlx::query_scalar("SELECT id FROM materials WHERE name = ?")
            .bind(name)
            .fetch_one(&*self.pool)
            .await?;
        Ok(id)
    }

    /// Associate a material composition with a product; duplicate
    /// associations are ignored.
    pub async fn link_material(
        &self,
        product_id: i64,
        material_id: i64,
        percentage: Option<f64>,
        source: &str,
        raw: &str,
    ) -> Result<()> {
        sqlx::query(
            r"
            INSERT OR IGNORE INTO product_materials
              (product_id, material_id, percentage, source, raw)
            VALUES (?, ?, ?, ?, ?)
            ",
        )
        .bind(product_id)
        .bind(material_id)
        .bind(percentage)
        .bind(source)
        .bind(raw)
        .execute(&*self.pool)
        .await?;
        Ok(())
    }

    /// Product ids whose FTS document matches the query. Errors if the
    /// mirror is disabled.
    pub async fn search_products(&self, query: &str) -> Result<Vec<i64>> {
        let ids = sqlx::query_scalar("SELECT rowid FROM products_fts WHERE products_fts MATCH ?")
            .bind(query)
            .fetch_all(&*self.pool)
            .await?;
        Ok(ids)
    }

    pub async fn statistics(&self) -> Result<StoreStats> {
        let products = sqlx::query_scalar("SELECT COUNT(*) FROM products")
            .fetch_one(&*self.pool)
            .await?;
        let variants = sqlx::query_scalar("SELECT COUNT(*) FROM variants")
            .fetch_one(&*self.pool)
            .await?;
        let reviews = sqlx::query_scalar("SELECT COUNT(*) FROM reviews")
            .fetch_one(&*self.pool)
            .await?;
        Ok(StoreStats {
            products,
            variants,
            reviews,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::database_connection::DatabaseConnection;
    use chrono::Utc;
    use tempfile::TempDir;

    async fn test_repo() -> (TempDir, ProductRepository) {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite:{}", dir.path().join("repo.db").display());
        let db = DatabaseConnection::new(&url).await.unwrap();
        db.migrate(true).await.unwrap();
        let repo = ProductRepository::new(Arc::new(db.pool().clone()), true);
        (dir, repo)
    }

    fn product(url: &str, name: &str) -> ProductRecord {
        let now = Utc::now();
        ProductRecord {
            source_domain: "shop.example.com".to_string(),
            url: url.to_string(),
            sku: Some("SKU-1".to_string()),
            name: Some(name.to_string()),
            brand: Some("Acme".to_string()),
            description: Some("A windproof fleece jacket.".to_string()),
            category: Some("Jackets".to_string()),
            images: vec!["https://img.example/1.jpg".to_string()],
            materials: serde_json::json!({}),
            created_at: now,
            updated_at: now,
        }
    }

    fn review(author: &str, body: &str) -> ReviewRecord {
        ReviewRecord {
            rating: Some(4.0),
            title: None,
            body: Some(body.to_string()),
            author: Some(author.to_string()),
            lang: None,
            published_at: Some("2025-03-01".to_string()),
            source: "jsonld".to_string(),
            raw: serde_json::Value::Null,
        }
    }

    #[tokio::test]
    async fn upsert_updates_in_place() {
        let (_dir, repo) = test_repo().await;
        let url = "https://shop.example.com/products/fleece";

        let id1 = repo.upsert_product(&product(url, "Fleece")).await.unwrap();
        let id2 = repo
            .upsert_product(&product(url, "Fleece Jacket"))
            .await
            .unwrap();
        assert_eq!(id1, id2);

        let stats = repo.statistics().await.unwrap();
        assert_eq!(stats.products, 1);

        let name: String = sqlx::query_scalar("SELECT name FROM products WHERE id = ?")
            .bind(id1)
            .fetch_one(&*repo.pool)
            .await
            .unwrap();
        assert_eq!(name, "Fleece Jacket");
    }

    #[tokio::test]
    async fn replace_variants_is_not_additive() {
        let (_dir, repo) = test_repo().await;
        let id = repo
            .upsert_product(&product("https://shop.example.com/products/x", "X"))
            .await
            .unwrap();

        let batch1 = vec![VariantRecord::default(), VariantRecord::default()];
        repo.replace_variants(id, &batch1).await.unwrap();
        let batch2 = vec![VariantRecord {
            variant_sku: Some("X-S".to_string()),
            ..VariantRecord::default()
        }];
        repo.replace_variants(id, &batch2).await.unwrap();

        let stats = repo.statistics().await.unwrap();
        assert_eq!(stats.variants, 1);
    }

    #[tokio::test]
    async fn duplicate_review_is_ignored() {
        let (_dir, repo) = test_repo().await;
        let url = "https://shop.example.com/products/x";
        let id = repo.upsert_product(&product(url, "X")).await.unwrap();

        let r = review("Alex", "Great fit.");
        assert!(repo.insert_review(id, url, &r).await.unwrap());
        assert!(!repo.insert_review(id, url, &r).await.unwrap());

        let stats = repo.statistics().await.unwrap();
        assert_eq!(stats.reviews, 1);
    }

    #[tokio::test]
    async fn fts_mirror_tracks_product_writes() {
        let (_dir, repo) = test_repo().await;
        let url = "https://shop.example.com/products/fleece";
        let id = repo.upsert_product(&product(url, "Fleece")).await.unwrap();

        assert_eq!(repo.search_products("windproof").await.unwrap(), vec![id]);

        // update must not leave a stale second document behind
        repo.upsert_product(&product(url, "Fleece Jacket")).await.unwrap();
        assert_eq!(repo.search_products("windproof").await.unwrap(), vec![id]);
    }

    #[tokio::test]
    async fn materials_dedup_by_name_and_link() {
        let (_dir, repo) = test_repo().await;
        let id = repo
            .upsert_product(&product("https://shop.example.com/products/x", "X"))
            .await
            .unwrap();

        let m1 = repo.upsert_material("nylon").await.unwrap();
        let m2 = repo.upsert_material("nylon").await.unwrap();
        assert_eq!(m1, m2);

        repo.link_material(id, m1, Some(86.0), "jsonld", "86% nylon")
            .await
            .unwrap();
        repo.link_material(id, m1, Some(86.0), "jsonld", "86% nylon")
            .await
            .unwrap();

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM product_materials")
            .fetch_one(&*repo.pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }
}
