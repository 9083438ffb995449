//! SQLite connection pool and schema management.
//!
//! The schema is created idempotently at startup: base tables, indexes, and
//! (when enabled) the FTS5 mirror tables. Mirror content is maintained by the
//! repository at write time, not by triggers, so behavior stays identical
//! across storage backends.

use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};

pub struct DatabaseConnection {
    pool: SqlitePool,
}

const SCHEMA: &[&str] = &[
    r"CREATE TABLE IF NOT EXISTS products (
        id INTEGER PRIMARY KEY,
        source_domain TEXT,
        url TEXT UNIQUE NOT NULL,
        sku TEXT,
        name TEXT,
        brand TEXT,
        description TEXT,
        category TEXT,
        images TEXT,
        materials TEXT,
        created_at TEXT,
        updated_at TEXT
    )",
    r"CREATE TABLE IF NOT EXISTS variants (
        id INTEGER PRIMARY KEY,
        product_id INTEGER NOT NULL,
        variant_sku TEXT,
        color TEXT,
        size TEXT,
        upc TEXT,
        ean TEXT,
        gtin TEXT,
        price REAL,
        currency TEXT,
        availability TEXT,
        raw TEXT,
        FOREIGN KEY (product_id) REFERENCES products (id)
    )",
    r"CREATE TABLE IF NOT EXISTS reviews (
        id INTEGER PRIMARY KEY,
        product_id INTEGER NOT NULL,
        rating REAL,
        title TEXT,
        body TEXT,
        author TEXT,
        lang TEXT,
        published_at TEXT,
        source TEXT,
        raw TEXT,
        unique_hash TEXT UNIQUE NOT NULL,
        FOREIGN KEY (product_id) REFERENCES products (id)
    )",
    r"CREATE TABLE IF NOT EXISTS materials (
        id INTEGER PRIMARY KEY,
        name TEXT UNIQUE NOT NULL
    )",
    r"CREATE TABLE IF NOT EXISTS product_materials (
        id INTEGER PRIMARY KEY,
        product_id INTEGER NOT NULL,
        material_id INTEGER NOT NULL,
        percentage REAL,
        source TEXT NOT NULL DEFAULT '',
        raw TEXT NOT NULL DEFAULT '',
        UNIQUE (product_id, material_id, source, raw),
        FOREIGN KEY (product_id) REFERENCES products (id),
        FOREIGN KEY (material_id) REFERENCES materials (id)
    )",
    r"CREATE INDEX IF NOT EXISTS idx_products_sku ON products (sku)",
    r"CREATE INDEX IF NOT EXISTS idx_products_name ON products (name)",
    r"CREATE INDEX IF NOT EXISTS idx_variants_product_id ON variants (product_id)",
    r"CREATE INDEX IF NOT EXISTS idx_reviews_product_id ON reviews (product_id)",
    r"CREATE INDEX IF NOT EXISTS idx_reviews_rating ON reviews (rating)",
    r"CREATE INDEX IF NOT EXISTS idx_pm_product ON product_materials (product_id)",
    r"CREATE INDEX IF NOT EXISTS idx_pm_material ON product_materials (material_id)",
];

const FTS_SCHEMA: &[&str] = &[
    r"CREATE VIRTUAL TABLE IF NOT EXISTS products_fts USING fts5(name, description)",
    r"CREATE VIRTUAL TABLE IF NOT EXISTS reviews_fts USING fts5(body, author)",
];

impl DatabaseConnection {
    /// Open (creating if necessary) the database behind a sqlx SQLite URL.
    pub async fn new(database_url: &str) -> Result<Self> {
        let db_path = database_url
            .trim_start_matches("sqlite://")
            .trim_start_matches("sqlite:");

        if db_path != ":memory:" {
            if let Some(parent) = Path::new(db_path).parent() {
                if !parent.as_os_str().is_empty() {
                    tokio::fs::create_dir_all(parent)
                        .await
                        .with_context(|| format!("Failed to create {}", parent.display()))?;
                }
            }
        }

        let options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("Invalid database URL: {database_url}"))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect_with(options)
            .await
            .context("Failed to open SQLite database")?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create tables and indexes; safe to call on every startup.
    pub async fn migrate(&self, enable_fts: bool) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .context("Schema migration failed")?;
        }
        if enable_fts {
            for statement in FTS_SCHEMA {
                sqlx::query(statement)
                    .execute(&self.pool)
                    .await
                    .context("FTS schema migration failed")?;
            }
        }
        Ok(())
    }
}
