//! Grid search over fusion weights

use crate::error::{RagError, Result};
use crate::evaluation::{precision_at_k, RelevanceSet};
use crate::retrieval::{FusionConfig, FusionMethod, SearchQuery, Searcher};
use serde::Serialize;

pub const WEIGHT_STEP: f64 = 0.1;

pub const DEFAULT_WEIGHT_RANGE: (f64, f64) = (0.3, 0.8);

/// Weights used when no trial scores above zero
const FALLBACK_WEIGHTS: (f64, f64) = (0.5, 0.5);

fn round_weight(weight: f64) -> f64 {
    (weight * 1e9).round() / 1e9
}

/// Dense weights `start, start + 0.1, ...` strictly below `end`
pub fn weight_grid(start: f64, end: f64) -> Result<Vec<f64>> {
    if !(0.0..=1.0).contains(&start) || !(0.0..=1.0).contains(&end) || start >= end {
        return Err(RagError::Configuration(format!(
            "Invalid weight range ({}, {}): expected 0 <= start < end <= 1",
            start, end
        )));
    }

    // Tolerance keeps an end that is an exact multiple of the step out
    let steps = ((end - start) / WEIGHT_STEP - 1e-9).ceil() as usize;
    Ok((0..steps)
        .map(|i| round_weight(start + i as f64 * WEIGHT_STEP))
        .collect())
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WeightTrial {
    pub dense_weight: f64,
    pub sparse_weight: f64,
    pub mean_precision: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptimizationResult {
    pub dense_weight: f64,
    pub sparse_weight: f64,
    pub best_score: f64,
    pub trials: Vec<WeightTrial>,
}

impl OptimizationResult {
    /// `base` with the winning weights
    pub fn apply_to(&self, base: &FusionConfig) -> Result<FusionConfig> {
        base.with_weights(self.dense_weight, self.sparse_weight)
    }
}

/// Find the dense/sparse split with the highest mean precision
///
/// Each trial copies `base` with `dense_weight = w` and `sparse_weight = 1 - w`
/// and scores every query at `k = |relevant|`; a query without relevant ids
/// scores 0. Only a trial strictly better than the best so far (starting
/// from 0) wins, so ties keep the lower weight and an all-zero grid returns
/// `(0.5, 0.5)`.
pub async fn optimize_fusion_weights<S>(
    searcher: &S,
    queries: &[String],
    relevance_sets: &[RelevanceSet],
    weight_range: (f64, f64),
    base: &FusionConfig,
) -> Result<OptimizationResult>
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

    let grid = weight_grid(weight_range.0, weight_range.1)?;

    if base.method == FusionMethod::Rrf {
        tracing::warn!("Optimizing weights for rrf fusion: weights do not affect rrf rankings");
    }

    let mut result = OptimizationResult {
        dense_weight: FALLBACK_WEIGHTS.0,
        sparse_weight: FALLBACK_WEIGHTS.1,
        best_score: 0.0,
        trials: Vec::with_capacity(grid.len()),
    };

    for dense_weight in grid {
        let sparse_weight = round_weight(1.0 - dense_weight);
        let fusion = base.with_weights(dense_weight, sparse_weight)?;

        let mut total_precision = 0.0;
        for (query, relevant) in queries.iter().zip(relevance_sets) {
            if relevant.is_empty() {
                continue;
            }
            let k = relevant.len();
            let request = SearchQuery::new(query.as_str(), k).with_fusion(fusion.clone());
            let response = searcher.search(&request).await?;
            total_precision += precision_at_k(&response.results.ids(), relevant, k);
        }

        let mean_precision = if queries.is_empty() {
            0.0
        } else {
            total_precision / queries.len() as f64
        };

        tracing::info!(
            "Weights dense={:.1} sparse={:.1}: mean precision {:.4}",
            dense_weight,
            sparse_weight,
            mean_precision
        );

        result.trials.push(WeightTrial {
            dense_weight,
            sparse_weight,
            mean_precision,
        });

        if mean_precision > result.best_score {
            result.best_score = mean_precision;
            result.dense_weight = dense_weight;
            result.sparse_weight = sparse_weight;
        }
    }

    Ok(result)
}
