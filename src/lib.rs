//! hybrid-rag - Hybrid dense + sparse retrieval orchestrator
//!
//! Queries an embedding retriever and a BM25 keyword retriever, fuses their
//! rankings with reciprocal rank fusion or a normalized weighted sum, and
//! layers caching, monitoring, multi-stage refinement and offline evaluation
//! on top through the shared [`retrieval::Searcher`] contract.

pub mod cache;
pub mod cli;
pub mod config;
pub mod corpus;
pub mod embedding;
pub mod error;
pub mod evaluation;
pub mod monitor;
pub mod retrieval;

pub use error::{RagError, Result};
