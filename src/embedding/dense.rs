//! In-memory dense retriever
//!
//! Exact cosine similarity over unit-normalized embeddings held in an
//! ndarray matrix. Suited to corpora that fit in memory and to the
//! multi-stage refiner's per-query candidate index.

use crate::embedding::{EmbeddingError, EmbeddingProvider};
use crate::retrieval::{
    Document, RankedItem, RankedList, Retriever, RetrieverError, RetrieverFactory,
};
use async_trait::async_trait;
use ndarray::{Array1, Array2};
use std::sync::Arc;
use tokio::sync::RwLock;

struct DenseIndex {
    ids: Vec<String>,
    /// One unit-length row per document
    vectors: Array2<f32>,
}

pub struct DenseRetriever {
    name: String,
    provider: Arc<dyn EmbeddingProvider>,
    index: RwLock<Option<DenseIndex>>,
}

impl DenseRetriever {
    pub fn new(name: impl Into<String>, provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            name: name.into(),
            provider,
            index: RwLock::new(None),
        }
    }

    /// Number of indexed documents
    pub async fn len(&self) -> usize {
        self.index
            .read()
            .await
            .as_ref()
            .map_or(0, |index| index.ids.len())
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn embed_texts(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, RetrieverError> {
        let provider = Arc::clone(&self.provider);
        let embeddings = tokio::task::spawn_blocking(move || provider.embed_batch(&texts))
            .await
            .map_err(|e| RetrieverError::IndexError(format!("Embedding task failed: {}", e)))??;
        Ok(embeddings)
    }
}

fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        vector.iter_mut().for_each(|x| *x /= norm);
    }
}

#[async_trait]
impl Retriever for DenseRetriever {
    fn name(&self) -> &str {
        &self.name
    }

    async fn index(&self, documents: &[Document]) -> Result<(), RetrieverError> {
        let texts: Vec<String> = documents.iter().map(|doc| doc.text.clone()).collect();
        let embeddings = self.embed_texts(texts).await?;

        let dimension = self.provider.dimension();
        let mut flat = Vec::with_capacity(embeddings.len() * dimension);
        for mut embedding in embeddings {
            if embedding.len() != dimension {
                return Err(EmbeddingError::DimensionMismatch {
                    expected: dimension,
                    actual: embedding.len(),
                }
                .into());
            }
            normalize(&mut embedding);
            flat.extend(embedding);
        }

        let vectors = Array2::from_shape_vec((documents.len(), dimension), flat)
            .map_err(|e| RetrieverError::IndexError(e.to_string()))?;

        let ids = documents.iter().map(|doc| doc.id.clone()).collect();
        *self.index.write().await = Some(DenseIndex { ids, vectors });

        tracing::debug!("{}: indexed {} documents", self.name, documents.len());
        Ok(())
    }

    async fn search(&self, query: &str, top_k: usize) -> Result<RankedList, RetrieverError> {
        if top_k == 0 || self.is_empty().await {
            return Ok(RankedList::default());
        }

        let mut query_vector = self
            .embed_texts(vec![query.to_string()])
            .await?
            .pop()
            .ok_or_else(|| RetrieverError::SearchError("No query embedding".to_string()))?;
        normalize(&mut query_vector);

        let guard = self.index.read().await;
        let Some(index) = guard.as_ref() else {
            return Ok(RankedList::default());
        };

        if query_vector.len() != index.vectors.ncols() {
            return Err(EmbeddingError::DimensionMismatch {
                expected: index.vectors.ncols(),
                actual: query_vector.len(),
            }
            .into());
        }

        let similarities = index.vectors.dot(&Array1::from_vec(query_vector));

        // Descending similarity, index order on ties
        let mut order: Vec<usize> = (0..similarities.len()).collect();
        order.sort_by(|&a, &b| similarities[b].total_cmp(&similarities[a]).then(a.cmp(&b)));

        Ok(order
            .into_iter()
            .take(top_k)
            .map(|i| RankedItem::new(index.ids[i].clone(), f64::from(similarities[i])))
            .collect())
    }
}

impl RetrieverFactory for DenseRetriever {
    /// Empty retriever sharing this one's embedding provider
    fn create(&self) -> Arc<dyn Retriever> {
        Arc::new(DenseRetriever::new(
            format!("{}-scoped", self.name),
            Arc::clone(&self.provider),
        ))
    }
}
