//! Score fusion: Reciprocal Rank Fusion and normalized weighted sum
//!
//! Both algorithms are pure. Ties on the fused score keep first-seen order:
//! lists are visited in the order given and items in rank order, and the
//! final sort is stable, so the id that appeared first sorts first.

use crate::error::{RagError, Result};
use crate::retrieval::{RankedItem, RankedList};
use ahash::{HashMap, HashMapExt};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Default RRF constant
pub const DEFAULT_RRF_K: u32 = 60;

/// How two ranked lists are combined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FusionMethod {
    /// Rank-only fusion, score = sum of 1 / (rank + k)
    Rrf,
    /// Min-max normalized scores combined with per-source weights
    WeightedSum,
}

impl FusionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            FusionMethod::Rrf => "rrf",
            FusionMethod::WeightedSum => "weighted_sum",
        }
    }
}

impl fmt::Display for FusionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FusionMethod {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "rrf" => Ok(FusionMethod::Rrf),
            "weighted_sum" => Ok(FusionMethod::WeightedSum),
            other => Err(RagError::Configuration(format!(
                "Unknown fusion method: {}. Supported: rrf, weighted_sum",
                other
            ))),
        }
    }
}

/// Configuration for fusion algorithm
///
/// Weights only matter for weighted-sum fusion. They need not sum to 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusionConfig {
    pub method: FusionMethod,

    /// Weight for dense (embedding) results
    pub dense_weight: f64,

    /// Weight for sparse (lexical) results
    pub sparse_weight: f64,

    /// RRF K constant
    pub rrf_k: u32,
}

impl FusionConfig {
    pub fn new(
        method: FusionMethod,
        dense_weight: f64,
        sparse_weight: f64,
        rrf_k: u32,
    ) -> Result<Self> {
        let config = Self {
            method,
            dense_weight,
            sparse_weight,
            rrf_k,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn rrf(rrf_k: u32) -> Result<Self> {
        Self::new(FusionMethod::Rrf, 0.5, 0.5, rrf_k)
    }

    pub fn weighted_sum(dense_weight: f64, sparse_weight: f64) -> Result<Self> {
        Self::new(
            FusionMethod::WeightedSum,
            dense_weight,
            sparse_weight,
            DEFAULT_RRF_K,
        )
    }

    /// Copy of this config with different weights
    pub fn with_weights(&self, dense_weight: f64, sparse_weight: f64) -> Result<Self> {
        Self::new(self.method, dense_weight, sparse_weight, self.rrf_k)
    }

    pub fn validate(&self) -> Result<()> {
        for (name, weight) in [
            ("dense_weight", self.dense_weight),
            ("sparse_weight", self.sparse_weight),
        ] {
            if !(0.0..=1.0).contains(&weight) {
                return Err(RagError::Configuration(format!(
                    "{} must be within [0, 1], got {}",
                    name, weight
                )));
            }
        }

        if self.rrf_k == 0 {
            return Err(RagError::Configuration(
                "rrf_k must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            method: FusionMethod::Rrf,
            dense_weight: 0.7,
            sparse_weight: 0.3,
            rrf_k: DEFAULT_RRF_K,
        }
    }
}

/// Fuse ranked lists with the configured method
///
/// RRF accepts one or more lists; weighted sum takes exactly `[dense, sparse]`.
pub fn fuse(lists: &[RankedList], config: &FusionConfig) -> Result<RankedList> {
    config.validate()?;

    match config.method {
        FusionMethod::Rrf => {
            if lists.is_empty() {
                return Err(RagError::Argument(
                    "RRF requires at least one ranked list".to_string(),
                ));
            }
            Ok(reciprocal_rank_fusion(lists, config.rrf_k))
        }
        FusionMethod::WeightedSum => match lists {
            [dense, sparse] => Ok(weighted_sum_fusion(
                dense,
                sparse,
                config.dense_weight,
                config.sparse_weight,
            )),
            _ => Err(RagError::Argument(format!(
                "Weighted-sum fusion requires exactly two ranked lists, got {}",
                lists.len()
            ))),
        },
    }
}

/// Apply Reciprocal Rank Fusion to combine ranked lists
///
/// RRF formula: score(id) = sum over all lists of 1 / (rank + k), with rank
/// 0-based. An id absent from a list contributes nothing from it.
pub fn reciprocal_rank_fusion(lists: &[RankedList], k: u32) -> RankedList {
    let mut scores = FirstSeenScores::new();

    for list in lists {
        for (rank, item) in list.iter().enumerate() {
            scores.add(&item.id, 1.0 / (rank as f64 + f64::from(k)));
        }
    }

    scores.into_ranked()
}

/// Combine dense and sparse results with a weighted sum of normalized scores
///
/// Each list is min-max normalized to [0, 1] first. An id missing from one
/// list gets 0 from that side.
pub fn weighted_sum_fusion(
    dense: &RankedList,
    sparse: &RankedList,
    dense_weight: f64,
    sparse_weight: f64,
) -> RankedList {
    let mut scores = FirstSeenScores::new();

    for (list, weight) in [(dense, dense_weight), (sparse, sparse_weight)] {
        for item in min_max_normalize(list) {
            scores.add(&item.id, weight * item.score);
        }
    }

    scores.into_ranked()
}

/// Normalize scores to [0, 1], keeping list order
///
/// When every score is equal each item maps to 1.0, so an all-tied list
/// still contributes its full weight.
pub fn min_max_normalize(list: &RankedList) -> RankedList {
    let (min, max) = list
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), item| {
            (lo.min(item.score), hi.max(item.score))
        });

    let range = max - min;

    list.iter()
        .map(|item| {
            let normalized = if range > 0.0 {
                (item.score - min) / range
            } else {
                1.0
            };
            RankedItem::new(item.id.clone(), normalized)
        })
        .collect()
}

/// Score accumulator that remembers the order ids were first seen in
struct FirstSeenScores {
    positions: HashMap<String, usize>,
    entries: Vec<RankedItem>,
}

impl FirstSeenScores {
    fn new() -> Self {
        Self {
            positions: HashMap::new(),
            entries: Vec::new(),
        }
    }

    fn add(&mut self, id: &str, contribution: f64) {
        match self.positions.get(id) {
            Some(&position) => self.entries[position].score += contribution,
            None => {
                self.positions.insert(id.to_string(), self.entries.len());
                self.entries.push(RankedItem::new(id, contribution));
            }
        }
    }

    fn into_ranked(mut self) -> RankedList {
        // Stable: equal scores keep first-seen order
        self.entries.sort_by(|a, b| b.score.total_cmp(&a.score));
        RankedList::new(self.entries)
    }
}
