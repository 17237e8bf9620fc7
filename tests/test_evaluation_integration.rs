//! Evaluation and weight optimization against live searchers

mod common;

use common::{sample_corpus, FixedRetriever, VocabularyEmbedder, VOCABULARY};
use hybrid_rag::embedding::{DenseRetriever, KeywordIndex, SparseRetriever};
use hybrid_rag::evaluation::{
    evaluate, ndcg_at_k, optimize_fusion_weights, precision_at_k, RelevanceSet,
    DEFAULT_WEIGHT_RANGE,
};
use hybrid_rag::retrieval::{FusionConfig, HybridSearcher, DEFAULT_SEARCH_TIMEOUT};
use std::sync::Arc;

fn relevance(ids: &[&str]) -> RelevanceSet {
    ids.iter().map(|id| id.to_string()).collect()
}

fn ids(raw: &[&str]) -> Vec<String> {
    raw.iter().map(|id| id.to_string()).collect()
}

#[test]
fn test_metric_reference_values() {
    let precision = precision_at_k(&ids(&["1", "2", "3", "4"]), &relevance(&["2", "4", "9"]), 3);
    assert!((precision - 1.0 / 3.0).abs() < 1e-12);

    assert_eq!(ndcg_at_k(&ids(&["1", "2", "3"]), &relevance(&["1"]), 3), 1.0);
}

#[tokio::test]
async fn test_evaluate_indexed_corpus() {
    let dense = Arc::new(DenseRetriever::new("dense", VocabularyEmbedder::new(VOCABULARY)));
    let sparse = Arc::new(SparseRetriever::new(
        "sparse",
        KeywordIndex::in_memory(0).unwrap(),
    ));
    let hybrid = HybridSearcher::new(dense, sparse, DEFAULT_SEARCH_TIMEOUT);
    hybrid.index_documents(sample_corpus()).await.unwrap();

    let queries = vec![
        "rust ownership".to_string(),
        "neural network training".to_string(),
    ];
    let relevance_sets = vec![
        relevance(&["rust-ownership", "rust-borrow"]),
        relevance(&["neural-training"]),
    ];

    let report = evaluate(
        &hybrid,
        &queries,
        &relevance_sets,
        &[1, 2],
        &FusionConfig::default(),
    )
    .await
    .unwrap();

    assert_eq!(report.get("precision@1"), Some(1.0));
    assert_eq!(report.get("ndcg@1"), Some(1.0));
    assert_eq!(report.get("recall@2"), Some(1.0));
    assert_eq!(report.get("precision@2"), Some(0.75));
    assert_eq!(report.get("mrr"), Some(1.0));
    assert!(report.to_table().contains("| mrr | 1.0000 |"));
}

#[tokio::test]
async fn test_optimizer_finds_dense_leaning_weights() {
    let dense = FixedRetriever::new(
        "dense",
        &[("r1", 0.9), ("r2", 0.8), ("x", 0.3), ("y", 0.1)],
    );
    let sparse = FixedRetriever::new(
        "sparse",
        &[("x", 10.0), ("y", 9.0), ("r1", 2.0), ("r2", 1.0)],
    );
    let hybrid = HybridSearcher::new(Arc::new(dense), Arc::new(sparse), DEFAULT_SEARCH_TIMEOUT);

    let base = FusionConfig::weighted_sum(0.5, 0.5).unwrap();
    let result = optimize_fusion_weights(
        &hybrid,
        &["query".to_string()],
        &[relevance(&["r1", "r2"])],
        DEFAULT_WEIGHT_RANGE,
        &base,
    )
    .await
    .unwrap();

    assert_eq!(result.dense_weight, 0.7);
    assert_eq!(result.sparse_weight, 0.3);
    assert_eq!(result.best_score, 1.0);

    let precisions: Vec<f64> = result.trials.iter().map(|t| t.mean_precision).collect();
    assert_eq!(precisions, vec![0.0, 0.0, 0.5, 0.5, 1.0]);
    assert!(result
        .trials
        .iter()
        .all(|t| t.dense_weight >= 0.3 && t.dense_weight <= 0.8));

    // The base config is copied per trial, never changed
    assert_eq!(base, FusionConfig::weighted_sum(0.5, 0.5).unwrap());
}
