//! Integration tests for the hybrid orchestrator and the multi-stage refiner
//!
//! Dense retrieval uses a vocabulary embedder instead of a downloaded model;
//! sparse retrieval runs a real in-memory tantivy index.

mod common;

use common::{sample_corpus, FixedRetriever, VocabularyEmbedder, VOCABULARY};
use hybrid_rag::embedding::{DenseRetriever, KeywordIndex, SparseRetriever};
use hybrid_rag::retrieval::{
    FusionConfig, HybridSearcher, MultiStageSearcher, Retriever, SearchQuery, Searcher,
    StagingConfig, DEFAULT_SEARCH_TIMEOUT,
};
use hybrid_rag::RagError;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

fn fixed_searcher(dense: FixedRetriever, sparse: FixedRetriever) -> HybridSearcher {
    HybridSearcher::new(Arc::new(dense), Arc::new(sparse), DEFAULT_SEARCH_TIMEOUT)
}

async fn indexed_stack() -> (Arc<HybridSearcher>, Arc<DenseRetriever>) {
    let dense = Arc::new(DenseRetriever::new("dense", VocabularyEmbedder::new(VOCABULARY)));
    let sparse = Arc::new(SparseRetriever::new(
        "sparse",
        KeywordIndex::in_memory(0).unwrap(),
    ));

    let hybrid = Arc::new(HybridSearcher::new(
        dense.clone(),
        sparse,
        DEFAULT_SEARCH_TIMEOUT,
    ));
    hybrid.index_documents(sample_corpus()).await.unwrap();

    (hybrid, dense)
}

#[tokio::test]
async fn test_rrf_end_to_end_ordering() {
    let searcher = fixed_searcher(
        FixedRetriever::new("dense", &[("d1", 0.9), ("d2", 0.5)]),
        FixedRetriever::new("sparse", &[("d2", 10.0), ("d3", 8.0)]),
    );

    let response = searcher
        .search(&SearchQuery::new("any query", 3).with_fusion(FusionConfig::rrf(60).unwrap()))
        .await
        .unwrap();

    assert!(!response.cache_hit);
    assert_eq!(response.results.ids(), vec!["d2", "d1", "d3"]);

    let scores: Vec<f64> = response.results.iter().map(|item| item.score).collect();
    assert!((scores[0] - (1.0 / 60.0 + 1.0 / 61.0)).abs() < 1e-12);
    assert!((scores[1] - 1.0 / 60.0).abs() < 1e-12);
    assert!((scores[2] - 1.0 / 61.0).abs() < 1e-12);
}

#[tokio::test]
async fn test_results_truncated_to_top_k_after_overfetch() {
    let dense = FixedRetriever::new("dense", &[("a", 0.9), ("b", 0.8), ("c", 0.7), ("d", 0.6)]);
    let sparse = FixedRetriever::new("sparse", &[("d", 3.0), ("e", 2.0), ("f", 1.0)]);
    let searcher = fixed_searcher(dense, sparse);

    let response = searcher.search(&SearchQuery::new("q", 2)).await.unwrap();

    assert_eq!(response.results.len(), 2);
    // "d" is the only id in both lists
    assert_eq!(response.results.ids()[0], "d");
}

#[tokio::test]
async fn test_concurrent_searches_use_their_own_weights() {
    let searcher = Arc::new(fixed_searcher(
        FixedRetriever::new("dense", &[("a", 0.9), ("b", 0.1)]),
        FixedRetriever::new("sparse", &[("b", 5.0), ("a", 1.0)]),
    ));

    let dense_only =
        SearchQuery::new("q", 2).with_fusion(FusionConfig::weighted_sum(1.0, 0.0).unwrap());
    let sparse_only =
        SearchQuery::new("q", 2).with_fusion(FusionConfig::weighted_sum(0.0, 1.0).unwrap());

    let (dense_results, sparse_results) =
        tokio::join!(searcher.search(&dense_only), searcher.search(&sparse_only));

    assert_eq!(dense_results.unwrap().results.ids(), vec!["a", "b"]);
    assert_eq!(sparse_results.unwrap().results.ids(), vec!["b", "a"]);
}

#[tokio::test]
async fn test_backend_failure_names_the_backend() {
    let searcher = fixed_searcher(
        FixedRetriever::new("dense", &[("d1", 0.9)]),
        FixedRetriever::new("sparse", &[]).failing(),
    );

    match searcher.search(&SearchQuery::new("q", 5)).await {
        Err(RagError::Retrieval { backend, .. }) => assert_eq!(backend, "sparse"),
        other => panic!("expected retrieval error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_slow_backend_times_out() {
    let searcher = fixed_searcher(
        FixedRetriever::new("dense", &[("d1", 0.9)]).slow(Duration::from_secs(10)),
        FixedRetriever::new("sparse", &[("d1", 1.0)]),
    );

    let query = SearchQuery::new("q", 5).with_timeout(Duration::from_millis(50));
    let started = std::time::Instant::now();
    let result = searcher.search(&query).await;

    assert!(matches!(result, Err(RagError::Timeout { .. })));
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_invalid_queries_rejected() {
    let searcher = fixed_searcher(
        FixedRetriever::new("dense", &[]),
        FixedRetriever::new("sparse", &[]),
    );

    assert!(matches!(
        searcher.search(&SearchQuery::new("", 5)).await,
        Err(RagError::Argument(_))
    ));
    assert!(matches!(
        searcher.search(&SearchQuery::new("q", 0)).await,
        Err(RagError::Argument(_))
    ));
}

#[tokio::test]
async fn test_real_backends_and_document_lookup() {
    let (hybrid, _) = indexed_stack().await;

    let response = hybrid
        .search(&SearchQuery::new("rust ownership", 2))
        .await
        .unwrap();

    let ids: HashSet<String> = response.results.ids().into_iter().collect();
    let expected: HashSet<String> = ["rust-ownership", "rust-borrow"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    assert_eq!(ids, expected);

    let texts = hybrid
        .get_documents_by_indices(&response.results.ids())
        .await
        .unwrap();
    assert_eq!(texts.len(), 2);
    assert!(texts.iter().all(|text| text.contains("ownership")));

    assert!(matches!(
        hybrid
            .get_documents_by_indices(&["missing".to_string()])
            .await,
        Err(RagError::DocumentNotFound { .. })
    ));
}

#[tokio::test]
async fn test_multi_stage_rescoring_maps_back_to_original_ids() {
    let (hybrid, dense) = indexed_stack().await;
    let staged = MultiStageSearcher::from_hybrid(
        &hybrid,
        dense,
        StagingConfig {
            stage1_k: 3,
            stage2_k: 2,
        },
    )
    .unwrap();

    let response = staged
        .search(&SearchQuery::new("memory garbage collector", 5))
        .await
        .unwrap();

    // Only two documents mention these terms; dense similarity favours python-gc
    assert_eq!(response.results.ids(), vec!["python-gc", "rust-ownership"]);
    assert_eq!(staged.fingerprint(), "staged:3:2");

    let coarse = hybrid
        .sparse_retriever()
        .search("memory garbage collector", 3)
        .await
        .unwrap();
    let coarse_ids: HashSet<String> = coarse.ids().into_iter().collect();
    assert!(response
        .results
        .ids()
        .iter()
        .all(|id| coarse_ids.contains(id)));
}

#[tokio::test]
async fn test_multi_stage_without_candidates_is_empty() {
    let (hybrid, dense) = indexed_stack().await;
    let staged = MultiStageSearcher::from_hybrid(&hybrid, dense, StagingConfig::default()).unwrap();

    let response = staged
        .search(&SearchQuery::new("quantum chromodynamics", 5))
        .await
        .unwrap();

    assert!(response.results.is_empty());
}
