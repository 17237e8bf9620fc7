//! Cache-aside result caching
//!
//! [`CachedSearcher`] wraps any [`Searcher`]. Keys cover every parameter that
//! changes the result; values are the fused [`RankedList`] encoded as JSON and
//! compressed with zstd. Backend failures never fail a search: reads degrade
//! to misses and writes are skipped with a warning.

mod backend;
mod sqlite;

pub use backend::{CacheBackend, CacheEntry, CacheError, MemoryCacheBackend, PURGE_INTERVAL};
pub use sqlite::{DbPool, SqliteCacheBackend};

use crate::error::Result;
use crate::retrieval::{RankedList, SearchQuery, SearchResponse, Searcher};
use async_trait::async_trait;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Prefix shared by every search result key
pub const KEY_PREFIX: &str = "hybrid_search:";

/// Pattern matching every search result key
pub const DEFAULT_INVALIDATION_PATTERN: &str = "hybrid_search:*";

pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_millis(250);

const ZSTD_LEVEL: i32 = 3;

/// Deterministic key for a query against a searcher variant
///
/// Weights are hashed by bit pattern so that e.g. 0.3 and 0.30000000000000004
/// never share an entry.
pub fn cache_key(query: &SearchQuery, fingerprint: &str) -> String {
    let parts = [
        query.text.clone(),
        query.top_k.to_string(),
        fingerprint.to_string(),
        query.fusion.method.as_str().to_string(),
        query.fusion.dense_weight.to_bits().to_string(),
        query.fusion.sparse_weight.to_bits().to_string(),
        query.fusion.rrf_k.to_string(),
    ];

    let mut hasher = blake3::Hasher::new();
    for part in &parts {
        hasher.update(part.as_bytes());
        hasher.update(b"\x1f");
    }

    format!("{}{}", KEY_PREFIX, hasher.finalize().to_hex())
}

pub fn encode_results(results: &RankedList) -> std::result::Result<Vec<u8>, CacheError> {
    let json = serde_json::to_vec(results).map_err(|e| CacheError::Codec(e.to_string()))?;
    zstd::encode_all(&json[..], ZSTD_LEVEL).map_err(|e| CacheError::Codec(e.to_string()))
}

pub fn decode_results(bytes: &[u8]) -> std::result::Result<RankedList, CacheError> {
    let json = zstd::decode_all(bytes).map_err(|e| CacheError::Codec(e.to_string()))?;
    serde_json::from_slice(&json).map_err(|e| CacheError::Codec(e.to_string()))
}

/// Hit and miss counts of one [`CachedSearcher`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Cache-aside decorator over any searcher
pub struct CachedSearcher<S> {
    inner: S,
    backend: Arc<dyn CacheBackend>,
    ttl: Duration,
    io_timeout: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<S: Searcher> CachedSearcher<S> {
    pub fn new(inner: S, backend: Arc<dyn CacheBackend>, ttl: Duration) -> Self {
        Self {
            inner,
            backend,
            ttl,
            io_timeout: DEFAULT_IO_TIMEOUT,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Bound each cache read and write; a timed-out call is a miss or a skipped write
    pub fn with_io_timeout(mut self, io_timeout: Duration) -> Self {
        self.io_timeout = io_timeout;
        self
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    /// Remove every entry matching a glob pattern
    ///
    /// Returns the number of removed entries, or 0 when the backend fails.
    pub async fn invalidate(&self, pattern: &str) -> usize {
        match self.bounded(self.backend.scan_delete(pattern)).await {
            Ok(removed) => {
                tracing::info!("Invalidated {} cache entries matching {:?}", removed, pattern);
                removed
            }
            Err(e) => {
                tracing::warn!("Cache invalidation for {:?} failed: {}", pattern, e);
                0
            }
        }
    }

    async fn lookup(&self, key: &str) -> Option<RankedList> {
        let bytes = match self.bounded(self.backend.get(key)).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!("Cache read failed, treating as miss: {}", e);
                return None;
            }
        };

        match decode_results(&bytes) {
            Ok(results) => Some(results),
            Err(e) => {
                tracing::warn!("Discarding undecodable cache entry {}: {}", key, e);
                None
            }
        }
    }

    async fn store(&self, key: &str, results: &RankedList) {
        let outcome = match encode_results(results) {
            Ok(bytes) => self.bounded(self.backend.set(key, bytes, self.ttl)).await,
            Err(e) => Err(e),
        };

        if let Err(e) = outcome {
            tracing::warn!("Cache write skipped: {}", e);
        }
    }

    async fn bounded<T, F>(&self, fut: F) -> std::result::Result<T, CacheError>
    where
        F: Future<Output = std::result::Result<T, CacheError>>,
    {
        tokio::time::timeout(self.io_timeout, fut)
            .await
            .map_err(|_| {
                CacheError::Backend(format!("Cache I/O timed out after {:?}", self.io_timeout))
            })?
    }
}

#[async_trait]
impl<S: Searcher> Searcher for CachedSearcher<S> {
    async fn search(&self, query: &SearchQuery) -> Result<SearchResponse> {
        let key = cache_key(query, &self.inner.fingerprint());

        if let Some(results) = self.lookup(&key).await {
            self.hits.fetch_add(1, Ordering::Relaxed);
            tracing::debug!("Cache hit for {:?}", query.text);
            return Ok(SearchResponse::cached(results));
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let response = self.inner.search(query).await?;
        self.store(&key, &response.results).await;

        Ok(SearchResponse::computed(response.results))
    }

    fn fingerprint(&self) -> String {
        self.inner.fingerprint()
    }
}
