//! JSON corpus and labeled query files

use crate::error::{RagError, Result};
use crate::evaluation::RelevanceSet;
use crate::retrieval::Document;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A query with its ground-truth relevant document ids
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabeledQuery {
    pub query: String,
    #[serde(default)]
    pub relevant: Vec<String>,
}

impl LabeledQuery {
    pub fn relevance_set(&self) -> RelevanceSet {
        self.relevant.iter().cloned().collect()
    }
}

fn read_json<T: DeserializeOwned>(path: &Path, what: &str) -> Result<T> {
    let content = std::fs::read_to_string(path).map_err(|e| RagError::Io {
        source: e,
        context: format!("Failed to read {} file: {}", what, path.display()),
    })?;

    serde_json::from_str(&content).map_err(|e| RagError::Json {
        source: e,
        context: format!("Failed to parse {} file: {}", what, path.display()),
    })
}

/// Load a JSON array of `{ "id", "text" }` documents
pub fn load_documents(path: &Path) -> Result<Vec<Document>> {
    let documents: Vec<Document> = read_json(path, "corpus")?;
    tracing::info!("Loaded {} documents from {}", documents.len(), path.display());
    Ok(documents)
}

/// Load a JSON array of `{ "query", "relevant": [ids] }` entries
pub fn load_labeled_queries(path: &Path) -> Result<Vec<LabeledQuery>> {
    let queries: Vec<LabeledQuery> = read_json(path, "queries")?;
    if let Some(empty) = queries.iter().position(|q| q.query.trim().is_empty()) {
        return Err(RagError::Argument(format!(
            "Query {} in {} is empty",
            empty,
            path.display()
        )));
    }
    Ok(queries)
}

/// Split labeled queries into parallel query and relevance vectors
pub fn split_labeled(queries: &[LabeledQuery]) -> (Vec<String>, Vec<RelevanceSet>) {
    queries
        .iter()
        .map(|q| (q.query.clone(), q.relevance_set()))
        .unzip()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_documents() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("corpus.json");
        std::fs::write(
            &path,
            r#"[{"id": "d1", "text": "Rust ownership"}, {"id": "d2", "text": "Borrow checker"}]"#,
        )
        .unwrap();

        let documents = load_documents(&path).unwrap();
        assert_eq!(documents.len(), 2);
        assert_eq!(documents[1], Document::new("d2", "Borrow checker"));
    }

    #[test]
    fn test_load_labeled_queries() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("queries.json");
        std::fs::write(
            &path,
            r#"[{"query": "ownership", "relevant": ["d1"]}, {"query": "unlabeled"}]"#,
        )
        .unwrap();

        let queries = load_labeled_queries(&path).unwrap();
        let (texts, sets) = split_labeled(&queries);
        assert_eq!(texts, vec!["ownership", "unlabeled"]);
        assert!(sets[0].contains("d1"));
        assert!(sets[1].is_empty());
    }

    #[test]
    fn test_errors_carry_context() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("missing.json");
        assert!(matches!(load_documents(&missing), Err(RagError::Io { .. })));

        let broken = temp.path().join("broken.json");
        std::fs::write(&broken, "{not json").unwrap();
        assert!(matches!(load_documents(&broken), Err(RagError::Json { .. })));

        let blank = temp.path().join("blank.json");
        std::fs::write(&blank, r#"[{"query": "  "}]"#).unwrap();
        assert!(matches!(
            load_labeled_queries(&blank),
            Err(RagError::Argument(_))
        ));
    }
}
