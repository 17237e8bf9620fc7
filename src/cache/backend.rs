//! Key-value cache backends with TTL

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;

/// Cache failures; the cache-aside layer absorbs every one of them
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache backend error: {0}")]
    Backend(String),

    #[error("Cache value codec error: {0}")]
    Codec(String),

    #[error("Invalid key pattern {pattern}: {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("Cache database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Cache connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Cache IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Shared key-value store consumed by the cache-aside layer
///
/// Writers to the same key are idempotent: values are a pure function of
/// the key, so last write wins without extra locking.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Value for `key`, `None` when absent or expired
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError>;

    /// Remove every key matching a glob pattern (`*` and `?`); returns the count
    async fn scan_delete(&self, pattern: &str) -> Result<usize, CacheError>;
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: String,
    pub value: Vec<u8>,
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(key: impl Into<String>, value: Vec<u8>, ttl: Duration) -> Result<Self, CacheError> {
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| CacheError::Backend(format!("TTL out of range: {}", e)))?;

        Ok(Self {
            key: key.into(),
            value,
            expires_at: Utc::now() + ttl,
        })
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Writes between sweeps of expired memory entries
pub const PURGE_INTERVAL: u64 = 256;

/// Process-local cache backend
///
/// Expired entries are dropped lazily on read, during pattern deletes, and by
/// a sweep every [`PURGE_INTERVAL`] writes, so keys that are never read
/// again do not accumulate.
#[derive(Debug, Default)]
pub struct MemoryCacheBackend {
    entries: RwLock<HashMap<String, CacheEntry>>,
    writes: AtomicU64,
}

impl MemoryCacheBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (unexpired) entries
    pub async fn len(&self) -> usize {
        let now = Utc::now();
        self.entries
            .read()
            .await
            .values()
            .filter(|entry| !entry.is_expired(now))
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Drop every expired entry; returns how many were removed
    pub async fn purge_expired(&self) -> usize {
        let mut entries = self.entries.write().await;
        purge(&mut entries, Utc::now())
    }
}

fn purge(entries: &mut HashMap<String, CacheEntry>, now: DateTime<Utc>) -> usize {
    let before = entries.len();
    entries.retain(|_, entry| !entry.is_expired(now));
    let removed = before - entries.len();
    if removed > 0 {
        tracing::debug!("Purged {} expired cache entries", removed);
    }
    removed
}

#[async_trait]
impl CacheBackend for MemoryCacheBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let now = Utc::now();
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                None => return Ok(None),
                Some(entry) if !entry.is_expired(now) => return Ok(Some(entry.value.clone())),
                Some(_) => {}
            }
        }

        let mut entries = self.entries.write().await;
        if entries.get(key).is_some_and(|entry| entry.is_expired(now)) {
            entries.remove(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        let entry = CacheEntry::new(key, value, ttl)?;
        let mut entries = self.entries.write().await;
        entries.insert(key.to_string(), entry);

        let writes = self.writes.fetch_add(1, Ordering::Relaxed) + 1;
        if writes % PURGE_INTERVAL == 0 {
            purge(&mut entries, Utc::now());
        }
        Ok(())
    }

    async fn scan_delete(&self, pattern: &str) -> Result<usize, CacheError> {
        let matcher = glob_to_regex(pattern)?;
        let now = Utc::now();

        let mut entries = self.entries.write().await;
        let before = entries.len();
        let mut removed_live = 0;
        entries.retain(|key, entry| {
            if matcher.is_match(key) {
                if !entry.is_expired(now) {
                    removed_live += 1;
                }
                false
            } else {
                !entry.is_expired(now)
            }
        });

        tracing::debug!(
            "Pattern {:?} removed {} live entries ({} total)",
            pattern,
            removed_live,
            before - entries.len()
        );
        Ok(removed_live)
    }
}

/// Compile a glob (`*` any run, `?` one char) into an anchored regex
pub(crate) fn glob_to_regex(pattern: &str) -> Result<Regex, CacheError> {
    let mut source = String::with_capacity(pattern.len() + 8);
    source.push('^');
    for c in pattern.chars() {
        match c {
            '*' => source.push_str(".*"),
            '?' => source.push('.'),
            other => source.push_str(&regex::escape(&other.to_string())),
        }
    }
    source.push('$');

    Regex::new(&source).map_err(|e| CacheError::InvalidPattern {
        pattern: pattern.to_string(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glob_matching() {
        let re = glob_to_regex("hybrid_search:*").unwrap();
        assert!(re.is_match("hybrid_search:abc123"));
        assert!(!re.is_match("other:abc123"));

        let re = glob_to_regex("k?y.1").unwrap();
        assert!(re.is_match("key.1"));
        assert!(!re.is_match("key-1"));
    }

    #[tokio::test]
    async fn test_set_get_roundtrip() {
        let backend = MemoryCacheBackend::new();
        backend
            .set("k", b"value".to_vec(), Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(backend.get("k").await.unwrap(), Some(b"value".to_vec()));
        assert_eq!(backend.get("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_expired_entries_are_misses() {
        let backend = MemoryCacheBackend::new();
        backend
            .set("k", b"value".to_vec(), Duration::from_millis(20))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(backend.get("k").await.unwrap(), None);
        assert!(backend.is_empty().await);
    }

    #[tokio::test]
    async fn test_purge_expired_drops_unread_keys() {
        let backend = MemoryCacheBackend::new();
        let short = Duration::from_millis(20);
        backend.set("stale:1", vec![1], short).await.unwrap();
        backend.set("stale:2", vec![2], short).await.unwrap();
        backend
            .set("live", vec![3], Duration::from_secs(60))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(backend.purge_expired().await, 2);
        assert_eq!(backend.entries.read().await.len(), 1);
        assert_eq!(backend.get("live").await.unwrap(), Some(vec![3]));
    }

    #[tokio::test]
    async fn test_writes_sweep_expired_entries() {
        let backend = MemoryCacheBackend::new();
        backend
            .set("stale", vec![0], Duration::from_millis(20))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let ttl = Duration::from_secs(60);
        for i in 1..PURGE_INTERVAL {
            backend.set(&format!("live:{}", i), vec![1], ttl).await.unwrap();
        }

        let entries = backend.entries.read().await;
        assert!(!entries.contains_key("stale"));
        assert_eq!(entries.len() as u64, PURGE_INTERVAL - 1);
    }

    #[tokio::test]
    async fn test_scan_delete() {
        let backend = MemoryCacheBackend::new();
        let ttl = Duration::from_secs(60);
        backend.set("hybrid_search:a", vec![1], ttl).await.unwrap();
        backend.set("hybrid_search:b", vec![2], ttl).await.unwrap();
        backend.set("embeddings:a", vec![3], ttl).await.unwrap();

        let removed = backend.scan_delete("hybrid_search:*").await.unwrap();

        assert_eq!(removed, 2);
        assert_eq!(backend.len().await, 1);
        assert!(backend.get("embeddings:a").await.unwrap().is_some());
    }
}
