//! In-memory document text lookup by id

use crate::error::{RagError, Result};
use crate::retrieval::Document;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Texts of the currently indexed corpus
///
/// Filled by the orchestrator once both retrievers finished indexing; the
/// multi-stage refiner reads candidate texts from it.
#[derive(Debug, Default)]
pub struct DocumentStore {
    texts: RwLock<HashMap<String, String>>,
}

impl DocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Swap in a new corpus snapshot
    pub async fn replace_all(&self, documents: &[Document]) {
        let snapshot: HashMap<String, String> = documents
            .iter()
            .map(|doc| (doc.id.clone(), doc.text.clone()))
            .collect();

        *self.texts.write().await = snapshot;
    }

    pub async fn get(&self, id: &str) -> Option<String> {
        self.texts.read().await.get(id).cloned()
    }

    /// Texts for `ids` in input order; fails on the first unknown id
    pub async fn get_many(&self, ids: &[String]) -> Result<Vec<String>> {
        let texts = self.texts.read().await;

        ids.iter()
            .map(|id| {
                texts
                    .get(id)
                    .cloned()
                    .ok_or_else(|| RagError::DocumentNotFound { id: id.clone() })
            })
            .collect()
    }

    /// Texts for `ids` in input order, `None` where unknown
    pub async fn lookup(&self, ids: &[String]) -> Vec<Option<String>> {
        let texts = self.texts.read().await;
        ids.iter().map(|id| texts.get(id).cloned()).collect()
    }

    pub async fn len(&self) -> usize {
        self.texts.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
