//! Multi-stage search: cheap sparse narrowing, then dense rescoring
//!
//! Stage 1 asks the sparse retriever for `stage1_k` candidates. Stage 2 builds
//! a fresh dense index over just those candidates' texts and keeps the top
//! `stage2_k` by dense similarity. Documents the sparse stage ranked below
//! `stage1_k` are never considered.

use super::hybrid::{ready_guard, IndexState};
use crate::error::{RagError, Result};
use crate::retrieval::{
    retrieve, Deadline, Document, DocumentStore, HybridSearcher, RankedItem, RankedList,
    Retriever, RetrieverFactory, SearchQuery, SearchResponse, Searcher,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Stage sizes for the multi-stage refiner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagingConfig {
    /// Sparse candidates fetched in the coarse stage
    pub stage1_k: usize,
    /// Dense-rescored candidates kept in the fine stage
    pub stage2_k: usize,
}

impl StagingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.stage1_k == 0 || self.stage2_k == 0 {
            return Err(RagError::Configuration(
                "stage1_k and stage2_k must be greater than 0".to_string(),
            ));
        }
        if self.stage2_k > self.stage1_k {
            return Err(RagError::Configuration(format!(
                "stage2_k ({}) cannot exceed stage1_k ({})",
                self.stage2_k, self.stage1_k
            )));
        }
        Ok(())
    }
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            stage1_k: 50,
            stage2_k: 20,
        }
    }
}

pub struct MultiStageSearcher {
    sparse: Arc<dyn Retriever>,
    documents: Arc<DocumentStore>,
    dense_factory: Arc<dyn RetrieverFactory>,
    staging: StagingConfig,
    default_timeout: Duration,
    // Shared with the orchestrator when built from one
    index_state: Arc<RwLock<IndexState>>,
}

impl MultiStageSearcher {
    pub fn new(
        sparse: Arc<dyn Retriever>,
        documents: Arc<DocumentStore>,
        dense_factory: Arc<dyn RetrieverFactory>,
        staging: StagingConfig,
        default_timeout: Duration,
    ) -> Result<Self> {
        staging.validate()?;

        Ok(Self {
            sparse,
            documents,
            dense_factory,
            staging,
            default_timeout,
            index_state: Arc::new(RwLock::new(IndexState::Ready)),
        })
    }

    /// Share the sparse retriever, document texts and index state of an
    /// orchestrator
    ///
    /// Refinement then waits out a running reindex and fails with
    /// [`RagError::IndexNotReady`] after a failed one, like the orchestrator.
    pub fn from_hybrid(
        hybrid: &HybridSearcher,
        dense_factory: Arc<dyn RetrieverFactory>,
        staging: StagingConfig,
    ) -> Result<Self> {
        let mut searcher = Self::new(
            Arc::clone(hybrid.sparse_retriever()),
            Arc::clone(hybrid.documents()),
            dense_factory,
            staging,
            hybrid.default_timeout(),
        )?;
        searcher.index_state = Arc::clone(hybrid.index_state());
        Ok(searcher)
    }

    pub fn staging(&self) -> StagingConfig {
        self.staging
    }

    /// Run both stages and truncate to `top_k`
    ///
    /// An empty coarse stage yields an empty result, not an error.
    pub async fn refine(&self, query: &SearchQuery) -> Result<RankedList> {
        query.validate()?;

        let deadline = Deadline::after(query.timeout.unwrap_or(self.default_timeout));
        let _state = ready_guard(&self.index_state, deadline).await?;

        // Stage 1: broad sparse retrieval
        let coarse = retrieve(
            self.sparse.as_ref(),
            &query.text,
            self.staging.stage1_k,
            deadline,
        )
        .await?;

        if coarse.is_empty() {
            tracing::debug!("No coarse candidates for {:?}", query.text);
            return Ok(RankedList::default());
        }

        // Scoped ids are positions into `mapping`
        let candidate_ids = coarse.ids();
        let texts = self.documents.lookup(&candidate_ids).await;

        let mut mapping: Vec<String> = Vec::with_capacity(candidate_ids.len());
        let mut scoped_docs: Vec<Document> = Vec::with_capacity(candidate_ids.len());
        for (id, text) in candidate_ids.into_iter().zip(texts) {
            match text {
                Some(text) => {
                    scoped_docs.push(Document::new(mapping.len().to_string(), text));
                    mapping.push(id);
                }
                None => tracing::warn!("Skipping candidate {} with no stored text", id),
            }
        }

        if scoped_docs.is_empty() {
            return Ok(RankedList::default());
        }

        // Stage 2: dense rescoring within candidates
        let scoped = self.dense_factory.create();
        let operation = format!("{} scoped indexing", scoped.name());
        deadline
            .run(&operation, async {
                scoped
                    .index(&scoped_docs)
                    .await
                    .map_err(|e| RagError::retrieval(scoped.name(), e))
            })
            .await?;

        let fine = retrieve(
            scoped.as_ref(),
            &query.text,
            self.staging.stage2_k,
            deadline,
        )
        .await?;

        tracing::debug!(
            "Refined {} coarse candidates to {} for {:?}",
            mapping.len(),
            fine.len(),
            query.text
        );

        let mut results = fine
            .into_iter()
            .map(|item| {
                let original = item
                    .id
                    .parse::<usize>()
                    .ok()
                    .and_then(|position| mapping.get(position))
                    .ok_or_else(|| {
                        RagError::retrieval(
                            scoped.name(),
                            format!("unknown scoped id {}", item.id),
                        )
                    })?;
                Ok(RankedItem::new(original.clone(), item.score))
            })
            .collect::<Result<RankedList>>()?;

        results.truncate(query.top_k);
        Ok(results)
    }
}

#[async_trait]
impl Searcher for MultiStageSearcher {
    async fn search(&self, query: &SearchQuery) -> Result<SearchResponse> {
        self.refine(query).await.map(SearchResponse::computed)
    }

    fn fingerprint(&self) -> String {
        format!("staged:{}:{}", self.staging.stage1_k, self.staging.stage2_k)
    }
}
