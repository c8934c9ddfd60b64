use std::cmp::Ordering;
use std::collections::HashMap;

use super::index::SearchIndex;
use super::normalize::{Normalizer, TermVector};
use crate::error::CardResult;
use crate::store::{CardId, CardStore};

pub const MAX_RESULTS: usize = 50;

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCard {
    pub id: CardId,
    /// Distinct query tokens the card contains
    pub overlap: usize,
    /// Dot product of query and card vectors
    pub similarity: f64,
}

/// Rank every card that shares at least one token with `query`.
///
/// Per-card vectors are rebuilt from the postings of the query tokens only.
/// Cards are ordered by overlap count, then by similarity, then by ascending
/// card ID. With normalized weights the similarity stays below one, so this
/// is the same order as `overlap + similarity`. Raw counts can exceed one,
/// and overlap still decides first.
pub fn rank(index: &SearchIndex, query: &TermVector, limit: usize) -> Vec<ScoredCard> {
    let mut projections: HashMap<&CardId, TermVector> = HashMap::new();
    for token in query.tokens() {
        if let Some(posting) = index.posting(token) {
            for (id, weight) in posting {
                projections
                    .entry(id)
                    .or_default()
                    .insert(token.clone(), *weight);
            }
        }
    }

    let mut scored: Vec<ScoredCard> = projections
        .into_iter()
        .map(|(id, doc)| ScoredCard {
            id: id.clone(),
            overlap: query.overlap(&doc),
            similarity: query.dot(&doc),
        })
        .collect();

    scored.sort_by(|a, b| {
        b.overlap
            .cmp(&a.overlap)
            .then_with(|| {
                b.similarity
                    .partial_cmp(&a.similarity)
                    .unwrap_or(Ordering::Equal)
            })
            .then_with(|| a.id.cmp(&b.id))
    });
    scored.truncate(limit);
    scored
}

/// Normalize `query` and return the IDs of the best matching cards. A query
/// with no usable tokens matches nothing and never touches the index.
pub fn search(
    index: &SearchIndex,
    normalizer: &Normalizer,
    query: &str,
    limit: usize,
) -> CardResult<Vec<CardId>> {
    let vector = normalizer.features(query)?;
    if vector.is_empty() {
        return Ok(Vec::new());
    }
    Ok(rank(index, &vector, limit)
        .into_iter()
        .map(|scored| scored.id)
        .collect())
}

/// Cards whose text is closest to the note `id`, excluding the note itself.
pub fn related(
    index: &SearchIndex,
    normalizer: &Normalizer,
    store: &CardStore,
    id: &str,
    limit: usize,
) -> CardResult<Vec<CardId>> {
    let note = store.note(id)?;
    let vector = normalizer.features(&note.contents)?;
    if vector.is_empty() {
        return Ok(Vec::new());
    }
    Ok(rank(index, &vector, limit + 1)
        .into_iter()
        .map(|scored| scored.id)
        .filter(|candidate| candidate != id)
        .take(limit)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vector(entries: &[(&str, f64)]) -> TermVector {
        entries
            .iter()
            .map(|(token, weight)| (token.to_string(), *weight))
            .collect()
    }

    #[test]
    fn test_overlap_beats_weight() {
        let mut index = SearchIndex::new();
        index.add_to_index("doc1", &vector(&[("cat", 0.5), ("dog", 0.5)]));
        index.add_to_index("doc2", &vector(&[("cat", 1.0)]));

        let query = vector(&[("cat", 0.5), ("dog", 0.5)]);
        let ranked = rank(&index, &query, MAX_RESULTS);
        assert_eq!(ranked[0].id, "doc1");
        assert_eq!(ranked[0].overlap, 2);
        assert_eq!(ranked[1].id, "doc2");
    }

    #[test]
    fn test_overlap_wins_even_against_heavy_single_match() {
        let mut index = SearchIndex::new();
        index.add_to_index("light", &vector(&[("cat", 0.01), ("dog", 0.01)]));
        index.add_to_index("heavy", &vector(&[("cat", 1.0)]));

        let query = vector(&[("cat", 0.99), ("dog", 0.01)]);
        let ranked = rank(&index, &query, MAX_RESULTS);
        assert_eq!(ranked[0].id, "light");
    }

    #[test]
    fn test_raw_counts_still_rank_by_overlap_first() {
        // similarity 5 for "heavy" would beat overlap 2 + similarity 2 on a summed score
        let mut index = SearchIndex::new();
        index.add_to_index("both", &vector(&[("cat", 1.0), ("dog", 1.0)]));
        index.add_to_index("heavy", &vector(&[("cat", 5.0)]));

        let query = vector(&[("cat", 1.0), ("dog", 1.0)]);
        let ranked = rank(&index, &query, MAX_RESULTS);
        assert_eq!(ranked[0].id, "both");
        assert_eq!((ranked[1].overlap, ranked[1].similarity), (1, 5.0));
    }

    #[test]
    fn test_similarity_breaks_ties_then_id() {
        let mut index = SearchIndex::new();
        index.add_to_index("b", &vector(&[("cat", 0.2)]));
        index.add_to_index("a", &vector(&[("cat", 0.2)]));
        index.add_to_index("c", &vector(&[("cat", 0.9)]));

        let ids: Vec<CardId> = rank(&index, &vector(&[("cat", 1.0)]), MAX_RESULTS)
            .into_iter()
            .map(|scored| scored.id)
            .collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }

    #[test]
    fn test_results_are_truncated() {
        let mut index = SearchIndex::new();
        for i in 0..60 {
            index.add_to_index(&format!("doc{:02}", i), &vector(&[("cat", 1.0)]));
        }
        assert_eq!(rank(&index, &vector(&[("cat", 1.0)]), MAX_RESULTS).len(), MAX_RESULTS);
    }

    #[test]
    fn test_empty_query_returns_nothing() {
        let mut index = SearchIndex::new();
        index.add_to_index("doc", &vector(&[("cat", 1.0)]));
        let normalizer = Normalizer::default();

        assert!(search(&index, &normalizer, "", MAX_RESULTS).unwrap().is_empty());
        assert!(search(&index, &normalizer, "the of", MAX_RESULTS).unwrap().is_empty());
    }

    #[test]
    fn test_search_is_deterministic() {
        let normalizer = Normalizer::default();
        let mut index = SearchIndex::new();
        for (id, text) in [("x", "cats purr"), ("y", "cats sleep"), ("z", "dogs bark")] {
            index.add_to_index(id, &normalizer.features(text).unwrap());
        }

        let first = search(&index, &normalizer, "cat", MAX_RESULTS).unwrap();
        let second = search(&index, &normalizer, "cat", MAX_RESULTS).unwrap();
        assert_eq!(first, second);
        assert_eq!(first, vec!["x", "y"]);
    }

    #[test]
    fn test_related_excludes_self() {
        let normalizer = Normalizer::default();
        let mut store = CardStore::new();
        let a = store.new_note();
        let b = store.new_note();
        let c = store.new_note();
        store.update_note(&a, "rust ownership borrowing".into()).unwrap();
        store.update_note(&b, "borrowing rules in rust".into()).unwrap();
        store.update_note(&c, "gardening tips".into()).unwrap();

        let mut index = SearchIndex::new();
        index.rebuild(&store, &normalizer);

        let related = related(&index, &normalizer, &store, &a, MAX_RESULTS).unwrap();
        assert_eq!(related, vec![b]);
    }
}
