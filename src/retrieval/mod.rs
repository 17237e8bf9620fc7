//! Hybrid retrieval core
//!
//! Dense and sparse retrievers each produce a ranked list; score fusion merges
//! them into one. The orchestrator, the multi-stage refiner and the caching and
//! monitoring decorators all speak the same [`Searcher`] contract so they can
//! be composed freely.

mod deduplication;
mod documents;
mod fusion;
mod hybrid;
mod staged;

pub use deduplication::deduplicate;
pub use documents::DocumentStore;
pub use fusion::{
    fuse, min_max_normalize, reciprocal_rank_fusion, weighted_sum_fusion, FusionConfig,
    FusionMethod, DEFAULT_RRF_K,
};
pub use hybrid::{HybridSearcher, OVERFETCH_FACTOR};
pub use staged::{MultiStageSearcher, StagingConfig};

use crate::error::{RagError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

/// Default bound on a single search's suspension points
pub const DEFAULT_SEARCH_TIMEOUT: Duration = Duration::from_secs(30);

/// A document id with a backend-specific relevance score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedItem {
    pub id: String,
    pub score: f64,
}

impl RankedItem {
    pub fn new(id: impl Into<String>, score: f64) -> Self {
        Self {
            id: id.into(),
            score,
        }
    }
}

/// Ordered results; rank is the position in the list
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RankedList(Vec<RankedItem>);

impl RankedList {
    pub fn new(items: Vec<RankedItem>) -> Self {
        Self(items)
    }

    /// Build a list from `(id, score)` pairs, keeping their order
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        pairs
            .into_iter()
            .map(|(id, score)| RankedItem::new(id, score))
            .collect()
    }

    pub fn ids(&self) -> Vec<String> {
        self.0.iter().map(|item| item.id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RankedItem> {
        self.0.iter()
    }

    pub fn truncate(&mut self, len: usize) {
        self.0.truncate(len);
    }

    pub fn as_slice(&self) -> &[RankedItem] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<RankedItem> {
        self.0
    }
}

impl FromIterator<RankedItem> for RankedList {
    fn from_iter<T: IntoIterator<Item = RankedItem>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for RankedList {
    type Item = RankedItem;
    type IntoIter = std::vec::IntoIter<RankedItem>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a RankedList {
    type Item = &'a RankedItem;
    type IntoIter = std::slice::Iter<'a, RankedItem>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// A unit of indexable text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub text: String,
}

impl Document {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
        }
    }
}

/// A single search request
///
/// Fusion parameters travel with the request so that no searcher holds
/// mutable fusion state shared between concurrent callers.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    /// Query text
    pub text: String,

    /// Maximum number of results
    pub top_k: usize,

    /// Fusion method and weights for this call
    pub fusion: FusionConfig,

    /// Bound on this call's suspension points; searcher default when `None`
    pub timeout: Option<Duration>,
}

impl SearchQuery {
    pub fn new(text: impl Into<String>, top_k: usize) -> Self {
        Self {
            text: text.into(),
            top_k,
            fusion: FusionConfig::default(),
            timeout: None,
        }
    }

    pub fn with_fusion(mut self, fusion: FusionConfig) -> Self {
        self.fusion = fusion;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.text.trim().is_empty() {
            return Err(RagError::Argument(
                "Query text cannot be empty".to_string(),
            ));
        }
        if self.top_k == 0 {
            return Err(RagError::Argument(
                "top_k must be greater than 0".to_string(),
            ));
        }
        self.fusion.validate()
    }
}

/// Results of a search plus whether they were served from cache
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResponse {
    pub results: RankedList,
    pub cache_hit: bool,
}

impl SearchResponse {
    pub fn computed(results: RankedList) -> Self {
        Self {
            results,
            cache_hit: false,
        }
    }

    pub fn cached(results: RankedList) -> Self {
        Self {
            results,
            cache_hit: true,
        }
    }
}

/// Failure inside a single retriever backend
#[derive(Error, Debug)]
pub enum RetrieverError {
    #[error("Indexing failed: {0}")]
    IndexError(String),

    #[error("Search failed: {0}")]
    SearchError(String),

    #[error("Embedding failed: {0}")]
    EmbeddingError(#[from] crate::embedding::EmbeddingError),
}

/// A candidate source: given a query, an ordered list of `(id, score)` pairs
///
/// Implementations return at most `top_k` items, sorted by descending score,
/// with no duplicate ids.
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Backend name used in error reports and logs
    fn name(&self) -> &str;

    /// Replace the indexed corpus
    async fn index(&self, documents: &[Document]) -> std::result::Result<(), RetrieverError>;

    async fn search(
        &self,
        query: &str,
        top_k: usize,
    ) -> std::result::Result<RankedList, RetrieverError>;
}

/// Creates empty retrievers, used for the refiner's per-query scoped index
pub trait RetrieverFactory: Send + Sync {
    fn create(&self) -> Arc<dyn Retriever>;
}

/// Anything answering the search contract
#[async_trait]
pub trait Searcher: Send + Sync {
    async fn search(&self, query: &SearchQuery) -> Result<SearchResponse>;

    /// Names the searcher variant and every searcher-level parameter that
    /// affects its results
    fn fingerprint(&self) -> String;
}

#[async_trait]
impl<S: Searcher + ?Sized> Searcher for Arc<S> {
    async fn search(&self, query: &SearchQuery) -> Result<SearchResponse> {
        (**self).search(query).await
    }

    fn fingerprint(&self) -> String {
        (**self).fingerprint()
    }
}

/// Absolute deadline shared by every suspension point of one call
#[derive(Debug, Clone, Copy)]
pub(crate) struct Deadline {
    at: Instant,
    budget: Duration,
}

impl Deadline {
    pub(crate) fn after(budget: Duration) -> Self {
        Self {
            at: Instant::now() + budget,
            budget,
        }
    }

    pub(crate) async fn run<T, F>(&self, operation: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::time::timeout_at(self.at, fut)
            .await
            .map_err(|_| RagError::timeout(operation, self.budget))?
    }
}

/// Query one retriever under a deadline, tagging failures with its name
pub(crate) async fn retrieve(
    retriever: &dyn Retriever,
    query: &str,
    top_k: usize,
    deadline: Deadline,
) -> Result<RankedList> {
    let operation = format!("{} retrieval", retriever.name());
    let results = deadline
        .run(&operation, async {
            retriever
                .search(query, top_k)
                .await
                .map_err(|e| RagError::retrieval(retriever.name(), e))
        })
        .await?;

    Ok(deduplicate(results))
}
