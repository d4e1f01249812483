//! `SQLite`-backed rate cache.
//!
//! One row per location code; the record is stored as JSON next to its
//! RFC 3339 storage time.

use crate::error::{CacheError, Result};
use crate::migrations;
use crate::{CacheEntry, RateCache};
use async_trait::async_trait;
use perdiem_core::{LocationCode, RateRecord, Timestamp};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;

/// Rate cache stored in a `SQLite` database.
#[derive(Debug, Clone)]
pub struct SqliteCache {
    pool: Pool<Sqlite>,
}

impl SqliteCache {
    /// Open (creating if missing) a database file and apply migrations.
    ///
    /// # Errors
    /// Returns `CacheError` if the database cannot be opened or migrated.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let connect_options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options)
            .await
            .map_err(|e| CacheError::Open(format!("{}: {e}", path.display())))?;

        tracing::info!("Rate cache database opened at {}", path.display());
        Self::from_pool(pool).await
    }

    /// Open a private in-memory database.
    ///
    /// The pool is pinned to a single connection that never expires, since
    /// every `SQLite` memory connection is a separate database.
    pub async fn in_memory() -> Result<Self> {
        let connect_options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| CacheError::Open(format!("invalid connection string: {e}")))?;

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(connect_options)
            .await
            .map_err(|e| CacheError::Open(format!("in-memory database: {e}")))?;

        Self::from_pool(pool).await
    }

    /// Wrap an existing pool, applying migrations first.
    pub async fn from_pool(pool: Pool<Sqlite>) -> Result<Self> {
        migrations::run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    /// Get a reference to the underlying connection pool.
    #[must_use]
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    /// Close the connection pool gracefully.
    pub async fn close(self) {
        self.pool.close().await;
        tracing::debug!("Rate cache database closed");
    }
}

#[async_trait]
impl RateCache for SqliteCache {
    async fn entry(&self, code: &LocationCode) -> Result<Option<CacheEntry>> {
        let row: Option<(String, String)> = sqlx::query_as(
            r"
            SELECT record, stored_at
            FROM rate_cache
            WHERE location_code = ?
            ",
        )
        .bind(code.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some((record_json, stored_at)) => {
                let record: RateRecord = serde_json::from_str(&record_json)?;
                let stored_at = Timestamp::from_rfc3339(&stored_at)
                    .map_err(|e| CacheError::Corrupt(e.to_string()))?;
                Ok(Some(CacheEntry {
                    location_code: code.clone(),
                    record,
                    stored_at,
                }))
            }
            None => Ok(None),
        }
    }

    async fn store(&self, entry: CacheEntry) -> Result<()> {
        let record_json = serde_json::to_string(&entry.record)?;

        sqlx::query(
            r"
            INSERT INTO rate_cache (location_code, record, stored_at)
            VALUES (?, ?, ?)
            ON CONFLICT(location_code) DO UPDATE SET
                record = excluded.record,
                stored_at = excluded.stored_at
            ",
        )
        .bind(entry.location_code.as_str())
        .bind(record_json)
        .bind(entry.stored_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "sqlite"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{hours_ago, record};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_migrations_applied() {
        let cache = SqliteCache::in_memory().await.expect("open cache");
        let version = migrations::get_schema_version(cache.pool())
            .await
            .expect("schema version");
        assert!(version > 0);
    }

    #[tokio::test]
    async fn test_store_and_entry() {
        let cache = SqliteCache::in_memory().await.expect("open cache");
        let code = LocationCode::new("11410").expect("valid code");

        assert!(cache.entry(&code).await.expect("entry").is_none());

        let stored = record("11410", 193, 152);
        cache.put(stored.clone()).await.expect("put");

        let entry = cache.entry(&code).await.expect("entry").expect("present");
        assert_eq!(entry.record, stored);
    }

    #[tokio::test]
    async fn test_upsert_supersedes() {
        let cache = SqliteCache::in_memory().await.expect("open cache");
        let code = LocationCode::new("11410").expect("valid code");

        cache
            .store(CacheEntry::stored_at(record("11410", 193, 152), hours_ago(30)))
            .await
            .expect("store stale");
        assert!(cache
            .get(&code, chrono::Duration::hours(24))
            .await
            .expect("get")
            .is_none());

        cache.put(record("11410", 200, 152)).await.expect("put");
        let fresh = cache
            .get(&code, chrono::Duration::hours(24))
            .await
            .expect("get")
            .expect("fresh record");
        assert_eq!(fresh.lodging_rate, 200);

        let (rows,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM rate_cache")
            .fetch_one(cache.pool())
            .await
            .expect("count rows");
        assert_eq!(rows, 1);
    }

    #[tokio::test]
    async fn test_file_database_persists() {
        let tmp = TempDir::new().expect("create temp dir");
        let path = tmp.path().join("cache").join("rates.db");
        let code = LocationCode::new("10450").expect("valid code");

        let cache = SqliteCache::open(&path).await.expect("open cache");
        cache.put(record("10450", 100, 50)).await.expect("put");
        cache.close().await;

        let reopened = SqliteCache::open(&path).await.expect("reopen cache");
        let entry = reopened.entry(&code).await.expect("entry").expect("present");
        assert_eq!(entry.record.total_rate, 150);
    }
}
