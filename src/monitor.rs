//! Search performance monitoring
//!
//! [`MonitoredSearcher`] forwards every call to the wrapped searcher and
//! records latency and cache hits in a shared [`PerformanceMonitor`].

use crate::error::Result;
use crate::retrieval::{SearchQuery, SearchResponse, Searcher};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Lock-free search counters
#[derive(Debug, Default)]
pub struct PerformanceMonitor {
    queries_processed: AtomicU64,
    failed_queries: AtomicU64,
    total_nanos: AtomicU64,
    cache_hits: AtomicU64,
}

/// Snapshot of the counters
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PerformanceStats {
    pub queries_processed: u64,
    pub failed_queries: u64,
    pub total_time: Duration,
    pub cache_hits: u64,
}

impl PerformanceStats {
    pub fn avg_response_time(&self) -> Duration {
        if self.queries_processed == 0 {
            return Duration::ZERO;
        }
        let avg = self.total_time.as_nanos() / u128::from(self.queries_processed);
        Duration::from_nanos(u64::try_from(avg).unwrap_or(u64::MAX))
    }

    pub fn cache_hit_rate(&self) -> f64 {
        if self.queries_processed == 0 {
            0.0
        } else {
            self.cache_hits as f64 / self.queries_processed as f64
        }
    }

    /// Estimated throughput, `1 / avg_response_time`; 0 before any query
    pub fn qps(&self) -> f64 {
        let avg = self.avg_response_time().as_secs_f64();
        if avg > 0.0 {
            1.0 / avg
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceReport {
    pub total_queries: u64,
    pub failed_queries: u64,
    pub average_response_time_ms: f64,
    pub cache_hit_rate: f64,
    pub queries_per_second: f64,
}

impl PerformanceMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_query(&self, elapsed: Duration, cache_hit: bool) {
        let nanos = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        self.queries_processed.fetch_add(1, Ordering::Relaxed);
        self.total_nanos.fetch_add(nanos, Ordering::Relaxed);
        if cache_hit {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_failure(&self) {
        self.failed_queries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn stats(&self) -> PerformanceStats {
        PerformanceStats {
            queries_processed: self.queries_processed.load(Ordering::Relaxed),
            failed_queries: self.failed_queries.load(Ordering::Relaxed),
            total_time: Duration::from_nanos(self.total_nanos.load(Ordering::Relaxed)),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
        }
    }

    pub fn get_performance_report(&self) -> PerformanceReport {
        let stats = self.stats();
        PerformanceReport {
            total_queries: stats.queries_processed,
            failed_queries: stats.failed_queries,
            average_response_time_ms: stats.avg_response_time().as_secs_f64() * 1000.0,
            cache_hit_rate: stats.cache_hit_rate(),
            queries_per_second: stats.qps(),
        }
    }

    pub fn reset(&self) {
        self.queries_processed.store(0, Ordering::Relaxed);
        self.failed_queries.store(0, Ordering::Relaxed);
        self.total_nanos.store(0, Ordering::Relaxed);
        self.cache_hits.store(0, Ordering::Relaxed);
    }
}

/// Searcher decorator feeding a [`PerformanceMonitor`]
pub struct MonitoredSearcher<S> {
    inner: S,
    monitor: Arc<PerformanceMonitor>,
}

impl<S: Searcher> MonitoredSearcher<S> {
    pub fn new(inner: S, monitor: Arc<PerformanceMonitor>) -> Self {
        Self { inner, monitor }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn monitor(&self) -> &Arc<PerformanceMonitor> {
        &self.monitor
    }
}

#[async_trait]
impl<S: Searcher> Searcher for MonitoredSearcher<S> {
    async fn search(&self, query: &SearchQuery) -> Result<SearchResponse> {
        let start = Instant::now();

        match self.inner.search(query).await {
            Ok(response) => {
                let elapsed = start.elapsed();
                self.monitor.record_query(elapsed, response.cache_hit);
                tracing::debug!(
                    "Search for {:?} took {:?} (cache hit: {})",
                    query.text,
                    elapsed,
                    response.cache_hit
                );
                Ok(response)
            }
            Err(e) => {
                self.monitor.record_failure();
                Err(e)
            }
        }
    }

    fn fingerprint(&self) -> String {
        self.inner.fingerprint()
    }
}
