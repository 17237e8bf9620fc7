//! Shared in-process retrievers and embedders for integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use hybrid_rag::embedding::{EmbeddingError, EmbeddingProvider};
use hybrid_rag::retrieval::{Document, RankedList, Retriever, RetrieverError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Returns the same ranked list for every query, truncated to `top_k`
pub struct FixedRetriever {
    name: &'static str,
    results: RankedList,
    delay: Option<Duration>,
    fail_search: bool,
    pub searches: AtomicUsize,
}

impl FixedRetriever {
    pub fn new(name: &'static str, pairs: &[(&str, f64)]) -> Self {
        Self {
            name,
            results: RankedList::from_pairs(pairs.iter().map(|(id, score)| (*id, *score))),
            delay: None,
            fail_search: false,
            searches: AtomicUsize::new(0),
        }
    }

    pub fn slow(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail_search = true;
        self
    }

    pub fn search_count(&self) -> usize {
        self.searches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Retriever for FixedRetriever {
    fn name(&self) -> &str {
        self.name
    }

    async fn index(&self, _documents: &[Document]) -> Result<(), RetrieverError> {
        Ok(())
    }

    async fn search(&self, _query: &str, top_k: usize) -> Result<RankedList, RetrieverError> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_search {
            return Err(RetrieverError::SearchError("backend unavailable".to_string()));
        }
        let mut results = self.results.clone();
        results.truncate(top_k);
        Ok(results)
    }
}

/// Term-count vectors over a fixed vocabulary
pub struct VocabularyEmbedder {
    vocabulary: Vec<&'static str>,
}

impl VocabularyEmbedder {
    pub fn new(vocabulary: &[&'static str]) -> Arc<Self> {
        Arc::new(Self {
            vocabulary: vocabulary.to_vec(),
        })
    }
}

impl EmbeddingProvider for VocabularyEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut vector = vec![0.0; self.vocabulary.len()];
        for word in text.to_lowercase().split(|c: char| !c.is_alphanumeric()) {
            if let Some(slot) = self.vocabulary.iter().position(|v| *v == word) {
                vector[slot] += 1.0;
            }
        }
        Ok(vector)
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        texts.iter().map(|text| self.embed(text)).collect()
    }

    fn dimension(&self) -> usize {
        self.vocabulary.len()
    }

    fn model_name(&self) -> &str {
        "vocabulary"
    }
}

pub const VOCABULARY: &[&str] = &[
    "rust", "memory", "safety", "ownership", "python", "garbage", "collector", "neural",
    "network", "training", "database", "index",
];

pub fn sample_corpus() -> Vec<Document> {
    vec![
        Document::new("rust-ownership", "Rust ownership gives memory safety without a garbage collector"),
        Document::new("rust-borrow", "The Rust borrow checker enforces ownership rules"),
        Document::new("python-gc", "Python relies on a garbage collector for memory"),
        Document::new("neural-training", "Training a neural network needs data"),
        Document::new("db-index", "A database index speeds up lookups"),
    ]
}
