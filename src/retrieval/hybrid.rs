//! Hybrid search combining dense and sparse retrieval

use crate::error::{RagError, Result};
use crate::retrieval::{
    fuse, retrieve, Deadline, Document, DocumentStore, RankedList, Retriever, SearchQuery,
    SearchResponse, Searcher,
};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, RwLockReadGuard};

/// Candidates requested from each retriever per result slot
pub const OVERFETCH_FACTOR: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum IndexState {
    Ready,
    Failed,
}

/// Hybrid searcher combining dense and sparse retrieval
///
/// Holds no fusion state: method and weights arrive with each [`SearchQuery`].
pub struct HybridSearcher {
    dense: Arc<dyn Retriever>,
    sparse: Arc<dyn Retriever>,
    documents: Arc<DocumentStore>,
    // Exclusive while indexing, shared while searching
    index_state: Arc<RwLock<IndexState>>,
    default_timeout: Duration,
}

impl HybridSearcher {
    /// Create a new hybrid searcher
    ///
    /// Retrievers may already hold an index (e.g. remote backends), so the
    /// searcher starts out ready.
    pub fn new(
        dense: Arc<dyn Retriever>,
        sparse: Arc<dyn Retriever>,
        default_timeout: Duration,
    ) -> Self {
        Self {
            dense,
            sparse,
            documents: Arc::new(DocumentStore::new()),
            index_state: Arc::new(RwLock::new(IndexState::Ready)),
            default_timeout,
        }
    }

    pub fn dense_retriever(&self) -> &Arc<dyn Retriever> {
        &self.dense
    }

    pub fn sparse_retriever(&self) -> &Arc<dyn Retriever> {
        &self.sparse
    }

    pub fn documents(&self) -> &Arc<DocumentStore> {
        &self.documents
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    pub(crate) fn index_state(&self) -> &Arc<RwLock<IndexState>> {
        &self.index_state
    }

    /// Index documents in both retrievers
    ///
    /// Searches wait while indexing runs. If either retriever fails, searches
    /// fail with [`RagError::IndexNotReady`] until a later call succeeds.
    pub async fn index_documents(&self, documents: Vec<Document>) -> Result<()> {
        let mut seen = HashSet::with_capacity(documents.len());
        if let Some(dup) = documents.iter().find(|doc| !seen.insert(doc.id.as_str())) {
            return Err(RagError::Argument(format!(
                "Duplicate document id: {}",
                dup.id
            )));
        }

        let mut state = self.index_state.write().await;

        tracing::info!("Indexing {} documents...", documents.len());

        let indexed = tokio::try_join!(
            async {
                self.dense
                    .index(&documents)
                    .await
                    .map_err(|e| RagError::retrieval(self.dense.name(), e))
            },
            async {
                self.sparse
                    .index(&documents)
                    .await
                    .map_err(|e| RagError::retrieval(self.sparse.name(), e))
            }
        );

        match indexed {
            Ok(_) => {
                self.documents.replace_all(&documents).await;
                *state = IndexState::Ready;
                tracing::info!("Indexing complete");
                Ok(())
            }
            Err(e) => {
                *state = IndexState::Failed;
                tracing::warn!("Indexing failed, searches disabled until reindex: {}", e);
                Err(e)
            }
        }
    }

    /// Perform hybrid search
    ///
    /// Fetches `OVERFETCH_FACTOR * top_k` candidates from both retrievers
    /// concurrently, fuses them and truncates to `top_k`. A failure in either
    /// retriever fails the whole search.
    pub async fn search_ranked(&self, query: &SearchQuery) -> Result<RankedList> {
        query.validate()?;

        let deadline = Deadline::after(query.timeout.unwrap_or(self.default_timeout));
        let _state = ready_guard(&self.index_state, deadline).await?;

        let fetch_k = query.top_k.saturating_mul(OVERFETCH_FACTOR);

        // Step 1: Parallel dense + sparse search
        let (dense_results, sparse_results) = tokio::try_join!(
            retrieve(self.dense.as_ref(), &query.text, fetch_k, deadline),
            retrieve(self.sparse.as_ref(), &query.text, fetch_k, deadline)
        )?;

        tracing::debug!(
            "Retrieved {} dense and {} sparse candidates for {:?}",
            dense_results.len(),
            sparse_results.len(),
            query.text
        );

        // Step 2: Fusion
        let mut fused = fuse(&[dense_results, sparse_results], &query.fusion)?;

        // Step 3: Truncate to limit
        fused.truncate(query.top_k);

        Ok(fused)
    }

    /// Texts for the given document ids, in order
    pub async fn get_documents_by_indices(&self, ids: &[String]) -> Result<Vec<String>> {
        self.documents.get_many(ids).await
    }
}

/// Shared hold on the index state, bounded by the call's deadline
///
/// Held for the whole search so a reindex cannot swap data underneath it.
pub(crate) async fn ready_guard(
    state: &RwLock<IndexState>,
    deadline: Deadline,
) -> Result<RwLockReadGuard<'_, IndexState>> {
    let guard = deadline
        .run("index lock", async { Ok(state.read().await) })
        .await?;
    if *guard == IndexState::Failed {
        return Err(RagError::IndexNotReady);
    }
    Ok(guard)
}

#[async_trait]
impl Searcher for HybridSearcher {
    async fn search(&self, query: &SearchQuery) -> Result<SearchResponse> {
        self.search_ranked(query).await.map(SearchResponse::computed)
    }

    fn fingerprint(&self) -> String {
        "hybrid".to_string()
    }
}
