//! Offline evaluation of searchers against labeled queries
//!
//! [`evaluate`] runs each query once at `max(k_values)` and scores the
//! retrieved ids at every cutoff. [`optimize_fusion_weights`] grid-searches
//! the dense/sparse weight split.

mod metrics;
mod optimizer;

pub use metrics::{
    mean_reciprocal_rank, ndcg_at_k, precision_at_k, recall_at_k, reciprocal_rank, RelevanceSet,
};
pub use optimizer::{
    optimize_fusion_weights, weight_grid, OptimizationResult, WeightTrial, DEFAULT_WEIGHT_RANGE,
    WEIGHT_STEP,
};

use crate::error::{RagError, Result};
use crate::retrieval::{FusionConfig, SearchQuery, Searcher};
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::fmt::Write as _;

pub const DEFAULT_K_VALUES: [usize; 3] = [5, 10, 20];

/// Metric name to mean value, in report order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvaluationReport {
    metrics: Vec<(String, f64)>,
}

impl EvaluationReport {
    pub fn get(&self, metric: &str) -> Option<f64> {
        self.metrics
            .iter()
            .find(|(name, _)| name == metric)
            .map(|(_, value)| *value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.metrics.iter().map(|(name, value)| (name.as_str(), *value))
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    fn push(&mut self, name: String, value: f64) {
        self.metrics.push((name, value));
    }

    /// GitHub-style markdown table of this report
    pub fn to_table(&self) -> String {
        comparison_table(&[("Value", self)])
    }
}

impl Serialize for EvaluationReport {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.metrics.len()))?;
        for (name, value) in &self.metrics {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Side-by-side markdown table, one column per labeled report
///
/// Rows follow the first report's metric order.
pub fn comparison_table(columns: &[(&str, &EvaluationReport)]) -> String {
    let mut out = String::new();

    let _ = write!(out, "| Metric |");
    for (label, _) in columns {
        let _ = write!(out, " {} |", label);
    }
    out.push('\n');

    out.push_str("|--------|");
    for (label, _) in columns {
        let _ = write!(out, "{}|", "-".repeat(label.len() + 2));
    }
    out.push('\n');

    let Some((_, first)) = columns.first() else {
        return out;
    };

    for (metric, _) in first.iter() {
        let _ = write!(out, "| {} |", metric);
        for (_, report) in columns {
            match report.get(metric) {
                Some(value) => {
                    let _ = write!(out, " {:.4} |", value);
                }
                None => out.push_str(" - |"),
            }
        }
        out.push('\n');
    }

    out
}

/// Score `searcher` on labeled queries
///
/// Each query is searched once with `top_k = max(k_values)` and `fusion`.
/// Report order is `precision@k`, `recall@k`, `ndcg@k` per k in the given
/// order, then `mrr`. Every metric is the mean over queries.
pub async fn evaluate<S>(
    searcher: &S,
    queries: &[String],
    relevance_sets: &[RelevanceSet],
    k_values: &[usize],
    fusion: &FusionConfig,
) -> Result<EvaluationReport>
where
    S: Searcher + ?Sized,
{
    if queries.len() != relevance_sets.len() {
        return Err(RagError::Argument(format!(
            "Got {} queries but {} relevance sets",
            queries.len(),
            relevance_sets.len()
        )));
    }
    if k_values.is_empty() || k_values.contains(&0) {
        return Err(RagError::Argument(
            "k_values must be non-empty and every k greater than 0".to_string(),
        ));
    }

    let mut cutoffs: Vec<usize> = Vec::with_capacity(k_values.len());
    for &k in k_values {
        if !cutoffs.contains(&k) {
            cutoffs.push(k);
        }
    }
    let max_k = cutoffs.iter().copied().max().unwrap_or(1);

    let mut all_retrieved = Vec::with_capacity(queries.len());
    for query in queries {
        let request = SearchQuery::new(query.as_str(), max_k).with_fusion(fusion.clone());
        let response = searcher.search(&request).await?;
        all_retrieved.push(response.results.ids());
    }

    tracing::info!(
        "Evaluating {} queries at k = {:?}",
        queries.len(),
        cutoffs
    );

    let mean = |scores: Vec<f64>| -> f64 {
        if scores.is_empty() {
            0.0
        } else {
            scores.iter().sum::<f64>() / scores.len() as f64
        }
    };

    let mut report = EvaluationReport::default();
    for k in cutoffs {
        let pairs = || all_retrieved.iter().zip(relevance_sets);
        let precision = mean(pairs().map(|(r, rel)| precision_at_k(r, rel, k)).collect());
        let recall = mean(pairs().map(|(r, rel)| recall_at_k(r, rel, k)).collect());
        let ndcg = mean(pairs().map(|(r, rel)| ndcg_at_k(r, rel, k)).collect());

        report.push(format!("precision@{}", k), precision);
        report.push(format!("recall@{}", k), recall);
        report.push(format!("ndcg@{}", k), ndcg);
    }
    report.push(
        "mrr".to_string(),
        mean_reciprocal_rank(&all_retrieved, relevance_sets),
    );

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::{RankedList, SearchResponse};
    use async_trait::async_trait;

    /// Always returns d1..d4 in order
    struct StaticSearcher;

    #[async_trait]
    impl Searcher for StaticSearcher {
        async fn search(&self, query: &SearchQuery) -> Result<SearchResponse> {
            let mut results =
                RankedList::from_pairs([("d1", 0.9), ("d2", 0.8), ("d3", 0.7), ("d4", 0.6)]);
            results.truncate(query.top_k);
            Ok(SearchResponse::computed(results))
        }

        fn fingerprint(&self) -> String {
            "static".to_string()
        }
    }

    fn set(raw: &[&str]) -> RelevanceSet {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_report_order_and_values() {
        let report = evaluate(
            &StaticSearcher,
            &["q1".to_string(), "q2".to_string()],
            &[set(&["d1"]), set(&["d2", "d9"])],
            &[2, 1],
            &FusionConfig::default(),
        )
        .await
        .unwrap();

        let names: Vec<&str> = report.iter().map(|(name, _)| name).collect();
        assert_eq!(
            names,
            vec![
                "precision@2",
                "recall@2",
                "ndcg@2",
                "precision@1",
                "recall@1",
                "ndcg@1",
                "mrr"
            ]
        );

        assert_eq!(report.get("precision@2"), Some(0.5));
        assert_eq!(report.get("precision@1"), Some(0.5));
        assert_eq!(report.get("recall@2"), Some((1.0 + 0.5) / 2.0));
        assert_eq!(report.get("mrr"), Some((1.0 + 0.5) / 2.0));
    }

    #[tokio::test]
    async fn test_argument_validation() {
        let fusion = FusionConfig::default();
        let queries = ["q".to_string()];

        assert!(matches!(
            evaluate(&StaticSearcher, &queries, &[], &[5], &fusion).await,
            Err(RagError::Argument(_))
        ));
        assert!(matches!(
            evaluate(&StaticSearcher, &queries, &[set(&["d1"])], &[], &fusion).await,
            Err(RagError::Argument(_))
        ));
        assert!(matches!(
            evaluate(&StaticSearcher, &queries, &[set(&["d1"])], &[0, 5], &fusion).await,
            Err(RagError::Argument(_))
        ));
    }

    #[tokio::test]
    async fn test_no_queries_yields_zero_metrics() {
        let report = evaluate(&StaticSearcher, &[], &[], &[5], &FusionConfig::default())
            .await
            .unwrap();

        assert_eq!(report.len(), 4);
        assert!(report.iter().all(|(_, value)| value == 0.0));
    }

    #[test]
    fn test_tables() {
        let mut base = EvaluationReport::default();
        base.push("precision@5".to_string(), 0.25);
        base.push("mrr".to_string(), 0.5);

        let mut tuned = EvaluationReport::default();
        tuned.push("precision@5".to_string(), 0.5);

        let table = comparison_table(&[("Base", &base), ("Tuned", &tuned)]);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines[0], "| Metric | Base | Tuned |");
        assert_eq!(lines[2], "| precision@5 | 0.2500 | 0.5000 |");
        assert_eq!(lines[3], "| mrr | 0.5000 | - |");

        assert!(base.to_table().starts_with("| Metric | Value |"));
        assert_eq!(
            serde_json::to_string(&base).unwrap(),
            r#"{"precision@5":0.25,"mrr":0.5}"#
        );
    }
}
