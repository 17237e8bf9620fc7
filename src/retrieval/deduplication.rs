//! Ranked list deduplication by document id

use crate::retrieval::RankedList;
use std::collections::HashSet;

/// Drop repeated ids, keeping the first (highest-ranked) occurrence
///
/// Retrievers promise unique ids; this enforces it before fusion so a
/// misbehaving backend cannot double-count a document.
pub fn deduplicate(list: RankedList) -> RankedList {
    let before = list.len();
    let mut seen: HashSet<String> = HashSet::with_capacity(before);

    let deduped: RankedList = list
        .into_iter()
        .filter(|item| seen.insert(item.id.clone()))
        .collect();

    if deduped.len() != before {
        tracing::debug!(
            "Dropped {} duplicate ids from ranked list",
            before - deduped.len()
        );
    }

    deduped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deduplication() {
        let list = RankedList::from_pairs([("a", 0.9), ("b", 0.8), ("a", 0.7)]);

        let deduped = deduplicate(list);

        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped.as_slice()[0].id, "a");
        assert_eq!(deduped.as_slice()[0].score, 0.9); // Keeps first
    }
}
