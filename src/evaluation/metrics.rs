//! Binary-relevance ranking metrics
//!
//! Every metric returns 0 instead of dividing by zero: empty retrieved list,
//! empty relevance set, zero ideal DCG.

use std::collections::HashSet;

/// Ground-truth relevant ids for one query
pub type RelevanceSet = HashSet<String>;

fn hits_at_k(retrieved: &[String], relevant: &RelevanceSet, k: usize) -> usize {
    retrieved
        .iter()
        .take(k)
        .filter(|id| relevant.contains(id.as_str()))
        .count()
}

/// `|retrieved[..k] ∩ relevant| / min(k, |retrieved[..k]|)`
pub fn precision_at_k(retrieved: &[String], relevant: &RelevanceSet, k: usize) -> f64 {
    let window = k.min(retrieved.len());
    if window == 0 {
        return 0.0;
    }
    hits_at_k(retrieved, relevant, k) as f64 / window as f64
}

/// `|retrieved[..k] ∩ relevant| / |relevant|`
pub fn recall_at_k(retrieved: &[String], relevant: &RelevanceSet, k: usize) -> f64 {
    if relevant.is_empty() {
        return 0.0;
    }
    hits_at_k(retrieved, relevant, k) as f64 / relevant.len() as f64
}

fn discount(rank: usize) -> f64 {
    1.0 / (rank as f64 + 2.0).log2()
}

pub fn ndcg_at_k(retrieved: &[String], relevant: &RelevanceSet, k: usize) -> f64 {
    let dcg: f64 = retrieved
        .iter()
        .take(k)
        .enumerate()
        .filter(|(_, id)| relevant.contains(id.as_str()))
        .map(|(rank, _)| discount(rank))
        .sum();

    let idcg: f64 = (0..relevant.len().min(k)).map(discount).sum();

    if idcg > 0.0 {
        dcg / idcg
    } else {
        0.0
    }
}

/// `1 / rank` of the first relevant hit (1-based), 0 when none is retrieved
pub fn reciprocal_rank(retrieved: &[String], relevant: &RelevanceSet) -> f64 {
    retrieved
        .iter()
        .position(|id| relevant.contains(id.as_str()))
        .map_or(0.0, |rank| 1.0 / (rank as f64 + 1.0))
}

pub fn mean_reciprocal_rank(retrieved: &[Vec<String>], relevant: &[RelevanceSet]) -> f64 {
    if retrieved.is_empty() {
        return 0.0;
    }
    let total: f64 = retrieved
        .iter()
        .zip(relevant)
        .map(|(ranked, relevant)| reciprocal_rank(ranked, relevant))
        .sum();
    total / retrieved.len() as f64
}
