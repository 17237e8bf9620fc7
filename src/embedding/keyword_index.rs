/// Tantivy keyword index for BM25 sparse retrieval
use crate::retrieval::{Document, RankedItem, RankedList, Retriever, RetrieverError};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tantivy::collector::TopDocs;
use tantivy::query::QueryParser;
use tantivy::schema::*;
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy, TantivyError};
use thiserror::Error;

/// Largest edit distance tantivy's fuzzy term matching supports
pub const MAX_FUZZINESS: u8 = 2;

const WRITER_MEMORY_BYTES: usize = 50_000_000;

#[derive(Error, Debug)]
pub enum KeywordIndexError {
    #[error("Index initialization failed: {0}")]
    InitializationError(String),

    #[error("Insert failed: {0}")]
    InsertError(String),

    #[error("Search failed: {0}")]
    SearchError(String),

    #[error("Invalid fuzziness {0}: must be between 0 and 2")]
    InvalidFuzziness(u8),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Tantivy error: {0}")]
    TantivyError(#[from] TantivyError),
}

/// Tantivy keyword index wrapper
///
/// Full-text search with BM25 ranking over `(id, text)` documents. Query
/// terms may match within `fuzziness` edits when fuzziness is above 0.
pub struct KeywordIndex {
    index: Index,
    reader: IndexReader,
    writer: Mutex<IndexWriter>,
    id_field: Field,
    text_field: Field,
    fuzziness: u8,
}

impl KeywordIndex {
    /// Create an index held entirely in memory
    pub fn in_memory(fuzziness: u8) -> Result<Self, KeywordIndexError> {
        let (schema, _, _) = Self::schema();
        Self::from_index(Index::create_in_ram(schema), fuzziness)
    }

    /// Open the index at `index_path`, creating it if missing
    pub fn open(index_path: PathBuf, fuzziness: u8) -> Result<Self, KeywordIndexError> {
        let index = if index_path.join("meta.json").exists() {
            Index::open_in_dir(&index_path)
                .map_err(|e| KeywordIndexError::InitializationError(e.to_string()))?
        } else {
            std::fs::create_dir_all(&index_path)?;
            let (schema, _, _) = Self::schema();
            Index::create_in_dir(&index_path, schema)
                .map_err(|e| KeywordIndexError::InitializationError(e.to_string()))?
        };

        Self::from_index(index, fuzziness)
    }

    fn schema() -> (Schema, Field, Field) {
        let mut schema_builder = Schema::builder();

        let id_field = schema_builder.add_text_field("id", STRING | STORED);
        let text_field = schema_builder.add_text_field("text", TEXT);

        (schema_builder.build(), id_field, text_field)
    }

    fn from_index(index: Index, fuzziness: u8) -> Result<Self, KeywordIndexError> {
        if fuzziness > MAX_FUZZINESS {
            return Err(KeywordIndexError::InvalidFuzziness(fuzziness));
        }

        let schema = index.schema();

        let id_field = schema.get_field("id").map_err(|_| {
            KeywordIndexError::InitializationError("Missing 'id' field in schema".to_string())
        })?;

        let text_field = schema.get_field("text").map_err(|_| {
            KeywordIndexError::InitializationError("Missing 'text' field in schema".to_string())
        })?;

        let writer = index
            .writer_with_num_threads(1, WRITER_MEMORY_BYTES)
            .map_err(|e| KeywordIndexError::InitializationError(e.to_string()))?;

        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()
            .map_err(|e| KeywordIndexError::InitializationError(e.to_string()))?;

        Ok(Self {
            index,
            reader,
            writer: Mutex::new(writer),
            id_field,
            text_field,
            fuzziness,
        })
    }

    /// Replace all indexed documents and commit
    pub fn replace_all(&self, documents: &[Document]) -> Result<(), KeywordIndexError> {
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| KeywordIndexError::InsertError("Writer lock poisoned".to_string()))?;

        writer
            .delete_all_documents()
            .map_err(|e| KeywordIndexError::InsertError(e.to_string()))?;

        for document in documents {
            writer
                .add_document(doc!(
                    self.id_field => document.id.as_str(),
                    self.text_field => document.text.as_str(),
                ))
                .map_err(|e| KeywordIndexError::InsertError(e.to_string()))?;
        }

        writer
            .commit()
            .map_err(|e| KeywordIndexError::InsertError(e.to_string()))?;

        self.reader
            .reload()
            .map_err(|e| KeywordIndexError::SearchError(e.to_string()))?;

        Ok(())
    }

    /// Search the index
    ///
    /// Free text is parsed leniently: syntax the query language rejects is
    /// dropped instead of failing the search.
    pub fn search(&self, query: &str, limit: usize) -> Result<RankedList, KeywordIndexError> {
        if limit == 0 {
            return Ok(RankedList::default());
        }

        let searcher = self.reader.searcher();

        let mut query_parser = QueryParser::for_index(&self.index, vec![self.text_field]);
        if self.fuzziness > 0 {
            query_parser.set_field_fuzzy(self.text_field, false, self.fuzziness, true);
        }

        let (parsed, errors) = query_parser.parse_query_lenient(query);
        if !errors.is_empty() {
            tracing::debug!("Ignored {} query syntax errors in {:?}", errors.len(), query);
        }

        let top_docs = searcher
            .search(&parsed, &TopDocs::with_limit(limit))
            .map_err(|e| KeywordIndexError::SearchError(e.to_string()))?;

        let mut results = Vec::with_capacity(top_docs.len());
        for (score, doc_address) in top_docs {
            let retrieved_doc: TantivyDocument = searcher
                .doc(doc_address)
                .map_err(|e| KeywordIndexError::SearchError(e.to_string()))?;

            let id = retrieved_doc
                .get_first(self.id_field)
                .and_then(|v| v.as_str())
                .ok_or_else(|| {
                    KeywordIndexError::SearchError("Missing or invalid ID field".to_string())
                })?;

            results.push(RankedItem::new(id, f64::from(score)));
        }

        Ok(RankedList::new(results))
    }

    /// Get the number of documents in the index
    pub fn len(&self) -> u64 {
        self.reader.searcher().num_docs()
    }

    /// Check if index is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Sparse retriever backed by a [`KeywordIndex`]
///
/// Tantivy calls block, so they run on the blocking pool.
pub struct SparseRetriever {
    name: String,
    index: Arc<KeywordIndex>,
}

impl SparseRetriever {
    pub fn new(name: impl Into<String>, index: KeywordIndex) -> Self {
        Self {
            name: name.into(),
            index: Arc::new(index),
        }
    }

    pub fn index_handle(&self) -> &KeywordIndex {
        &self.index
    }
}

#[async_trait]
impl Retriever for SparseRetriever {
    fn name(&self) -> &str {
        &self.name
    }

    async fn index(&self, documents: &[Document]) -> Result<(), RetrieverError> {
        let index = Arc::clone(&self.index);
        let documents = documents.to_vec();

        tokio::task::spawn_blocking(move || index.replace_all(&documents))
            .await
            .map_err(|e| RetrieverError::IndexError(e.to_string()))?
            .map_err(|e| RetrieverError::IndexError(e.to_string()))
    }

    async fn search(&self, query: &str, top_k: usize) -> Result<RankedList, RetrieverError> {
        let index = Arc::clone(&self.index);
        let query = query.to_string();

        tokio::task::spawn_blocking(move || index.search(&query, top_k))
            .await
            .map_err(|e| RetrieverError::SearchError(e.to_string()))?
            .map_err(|e| RetrieverError::SearchError(e.to_string()))
    }
}
