//! SQLite-backed result store
//!
//! Rows are never updated; a repeated grading run appends and lookups take the
//! newest row for a payload hash. There is deliberately no uniqueness constraint
//! on `payload_hash`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};
use std::path::Path;
use tracing::info;

use crate::cache::{CachedResult, ResultStore};
use crate::error::Result;

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if needed) the database file and its schema
    pub async fn open(db_path: &Path) -> Result<Self> {
        let newly_created = !db_path.exists();

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&db_url)
            .await?;

        if newly_created {
            info!("Initialized new result database: {}", db_path.display());
        } else {
            info!("Opened existing result database: {}", db_path.display());
        }

        sqlx::query("PRAGMA journal_mode = WAL")
            .execute(&pool)
            .await?;
        sqlx::query("PRAGMA busy_timeout = 5000")
            .execute(&pool)
            .await?;

        Self::from_pool(pool).await
    }

    // Private database, one connection so every query sees the same data
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        Self::from_pool(pool).await
    }

    pub async fn from_pool(pool: SqlitePool) -> Result<Self> {
        create_api_results_table(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn row_count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM api_results")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

async fn create_api_results_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS api_results (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            payload_hash TEXT NOT NULL,
            response_json TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            CHECK (length(payload_hash) = 64)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_api_results_payload_hash ON api_results(payload_hash, created_at)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

#[async_trait]
impl ResultStore for SqliteStore {
    async fn find_latest(&self, cache_key: &str) -> Result<Option<CachedResult>> {
        let row: Option<(String, String, i64)> = sqlx::query_as(
            r#"
            SELECT payload_hash, response_json, created_at
            FROM api_results
            WHERE payload_hash = ?
            ORDER BY created_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(cache_key)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|(cache_key, raw_response, created_at)| -> Result<CachedResult> {
            let created_at = DateTime::<Utc>::from_timestamp_millis(created_at).ok_or_else(|| {
                sqlx::Error::Decode(format!("created_at {created_at} out of range").into())
            })?;
            Ok(CachedResult {
                cache_key,
                raw_response,
                created_at,
            })
        })
        .transpose()
    }

    async fn insert(&self, entry: CachedResult) -> Result<()> {
        sqlx::query(
            "INSERT INTO api_results (payload_hash, response_json, created_at) VALUES (?, ?, ?)",
        )
        .bind(&entry.cache_key)
        .bind(&entry.raw_response)
        .bind(entry.created_at.timestamp_millis())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
