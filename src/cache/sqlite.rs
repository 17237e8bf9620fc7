//! SQLite cache backend with migrations
//!
//! Lets cached search results outlive the process and be shared by several
//! processes on one host.

use crate::cache::{CacheBackend, CacheError};
use async_trait::async_trait;
use chrono::Utc;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension};
use std::path::Path;
use std::time::Duration;

/// Database connection pool
pub type DbPool = Pool<SqliteConnectionManager>;

/// Cache backend storing entries in a SQLite table
#[derive(Clone)]
pub struct SqliteCacheBackend {
    pool: DbPool,
}

impl SqliteCacheBackend {
    /// Open (or create) the cache database at `db_path`
    pub fn open(db_path: &Path) -> Result<Self, CacheError> {
        // Ensure parent directory exists
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let manager = SqliteConnectionManager::file(db_path).with_init(|conn| {
            conn.execute_batch(
                "
                PRAGMA synchronous = NORMAL;
                PRAGMA busy_timeout = 5000;
                ",
            )
        });

        let pool = Pool::builder().max_size(8).build(manager)?;

        // WAL is persistent, setting it once is enough
        pool.get()?.execute_batch("PRAGMA journal_mode = WAL;")?;

        let backend = Self { pool };
        backend.migrate()?;

        tracing::info!("Opened SQLite cache at {}", db_path.display());
        Ok(backend)
    }

    /// Private in-memory database, for tests and single-process use
    pub fn in_memory() -> Result<Self, CacheError> {
        // Every connection to ":memory:" is a separate database
        let pool = Pool::builder()
            .max_size(1)
            .build(SqliteConnectionManager::memory())?;

        let backend = Self { pool };
        backend.migrate()?;
        Ok(backend)
    }

    /// Run database migrations
    fn migrate(&self) -> Result<(), CacheError> {
        let conn = self.pool.get()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            )",
            [],
        )?;

        let current_version: i32 = conn.query_row(
            "SELECT COALESCE(MAX(version), 0) FROM _migrations",
            [],
            |row| row.get(0),
        )?;

        for (version, migration) in MIGRATIONS.iter().enumerate() {
            let version = version as i32 + 1;

            if version > current_version {
                tracing::info!("Applying cache migration {}", version);

                conn.execute_batch(migration)?;

                conn.execute(
                    "INSERT INTO _migrations (version, applied_at) VALUES (?1, datetime('now'))",
                    params![version],
                )?;
            }
        }

        Ok(())
    }

    /// Delete every expired entry, returning how many were removed
    pub async fn purge_expired(&self) -> Result<usize, CacheError> {
        self.blocking(|conn| {
            let now = Utc::now().timestamp_millis();
            Ok(conn.execute(
                "DELETE FROM cache_entries WHERE expires_at <= ?1",
                params![now],
            )?)
        })
        .await
    }

    /// Number of live (unexpired) entries
    pub async fn len(&self) -> Result<usize, CacheError> {
        self.blocking(|conn| {
            let now = Utc::now().timestamp_millis();
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM cache_entries WHERE expires_at > ?1",
                params![now],
                |row| row.get(0),
            )?;
            Ok(count as usize)
        })
        .await
    }

    /// Run a statement against a pooled connection on the blocking pool
    async fn blocking<T, F>(&self, f: F) -> Result<T, CacheError>
    where
        T: Send + 'static,
        F: FnOnce(&rusqlite::Connection) -> Result<T, CacheError> + Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let conn = pool.get()?;
            f(&conn)
        })
        .await
        .map_err(|e| CacheError::Backend(format!("Cache task failed: {}", e)))?
    }
}

#[async_trait]
impl CacheBackend for SqliteCacheBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let key = key.to_string();
        self.blocking(move |conn| {
            let now = Utc::now().timestamp_millis();
            let row: Option<(Vec<u8>, i64)> = conn
                .query_row(
                    "SELECT value, expires_at FROM cache_entries WHERE key = ?1",
                    params![key],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            match row {
                Some((value, expires_at)) if expires_at > now => Ok(Some(value)),
                Some(_) => {
                    conn.execute(
                        "DELETE FROM cache_entries WHERE key = ?1 AND expires_at <= ?2",
                        params![key, now],
                    )?;
                    Ok(None)
                }
                None => Ok(None),
            }
        })
        .await
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        let key = key.to_string();
        let ttl_ms = i64::try_from(ttl.as_millis())
            .map_err(|_| CacheError::Backend("TTL out of range".to_string()))?;

        self.blocking(move |conn| {
            let expires_at = Utc::now().timestamp_millis().saturating_add(ttl_ms);
            conn.execute(
                "INSERT OR REPLACE INTO cache_entries (key, value, expires_at) VALUES (?1, ?2, ?3)",
                params![key, value, expires_at],
            )?;
            Ok(())
        })
        .await
    }

    async fn scan_delete(&self, pattern: &str) -> Result<usize, CacheError> {
        let pattern = pattern.to_string();
        self.blocking(move |conn| {
            let now = Utc::now().timestamp_millis();
            let live: i64 = conn.query_row(
                "SELECT COUNT(*) FROM cache_entries WHERE key GLOB ?1 AND expires_at > ?2",
                params![pattern, now],
                |row| row.get(0),
            )?;
            conn.execute(
                "DELETE FROM cache_entries WHERE key GLOB ?1",
                params![pattern],
            )?;
            Ok(live as usize)
        })
        .await
    }
}

/// Database migrations (each string is one migration)
const MIGRATIONS: &[&str] = &[
    // Migration 1: Initial schema
    r#"
    CREATE TABLE cache_entries (
        key TEXT PRIMARY KEY,
        value BLOB NOT NULL,
        expires_at INTEGER NOT NULL
    );

    CREATE INDEX idx_cache_entries_expires_at ON cache_entries(expires_at);
    "#,
];

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_set_get_and_expiry() {
        let backend = SqliteCacheBackend::in_memory().unwrap();

        backend
            .set("live", vec![1, 2, 3], Duration::from_secs(60))
            .await
            .unwrap();
        backend
            .set("stale", vec![4], Duration::from_millis(10))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(backend.get("live").await.unwrap(), Some(vec![1, 2, 3]));
        assert_eq!(backend.get("stale").await.unwrap(), None);
        assert_eq!(backend.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_scan_delete_uses_glob() {
        let backend = SqliteCacheBackend::in_memory().unwrap();
        let ttl = Duration::from_secs(60);
        backend.set("hybrid_search:1", vec![1], ttl).await.unwrap();
        backend.set("hybrid_search:2", vec![2], ttl).await.unwrap();
        backend.set("other:1", vec![3], ttl).await.unwrap();

        assert_eq!(backend.scan_delete("hybrid_search:*").await.unwrap(), 2);
        assert_eq!(backend.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_entries_survive_reopen() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("cache").join("search.db");

        {
            let backend = SqliteCacheBackend::open(&path).unwrap();
            backend
                .set("k", b"persisted".to_vec(), Duration::from_secs(60))
                .await
                .unwrap();
        }

        let backend = SqliteCacheBackend::open(&path).unwrap();
        assert_eq!(backend.get("k").await.unwrap(), Some(b"persisted".to_vec()));
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let backend = SqliteCacheBackend::in_memory().unwrap();
        backend
            .set("a", vec![1], Duration::from_millis(5))
            .await
            .unwrap();
        backend
            .set("b", vec![2], Duration::from_secs(60))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(backend.purge_expired().await.unwrap(), 1);
    }
}
