/// Retriever backends
///
/// Architecture:
/// - EmbeddingProvider trait for abstraction over the vectorization endpoint
/// - FastEmbedProvider for local embedding (all-MiniLM-L6-v2, 384-dim)
/// - DenseRetriever: exact cosine similarity over an in-memory matrix
/// - SparseRetriever: Tantivy BM25 keyword search
mod dense;
mod keyword_index;
mod provider;

pub use dense::DenseRetriever;
pub use keyword_index::{KeywordIndex, KeywordIndexError, SparseRetriever, MAX_FUZZINESS};
pub use provider::{EmbeddingError, EmbeddingProvider, FastEmbedProvider};
