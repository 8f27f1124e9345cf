use std::cmp::Ordering;

use serde::Serialize;

use crate::embedding::Embedding;
use crate::errors::{EngineError, EngineResult};
use crate::matcher;
use crate::store::{EmbeddingStore, Identity};

/// One ranked search hit. Derived per query, never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct MatchResult {
    pub identity: Identity,
    pub similarity: f32,
    pub verified: bool,
}

/// Ranking seam: lets the brute-force scan be swapped for an indexed
/// nearest-neighbor structure later without touching call sites.
pub trait Matcher {
    fn rank(
        &self,
        store: &EmbeddingStore,
        probe: &Embedding,
        k: usize,
        threshold: f32,
    ) -> EngineResult<Vec<MatchResult>>;
}

/// Scores every enrolled identity against the probe and keeps the best k.
///
/// O(N) per query; fine for hundreds to low thousands of enrollments.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearMatcher;

impl Matcher for LinearMatcher {
    fn rank(
        &self,
        store: &EmbeddingStore,
        probe: &Embedding,
        k: usize,
        threshold: f32,
    ) -> EngineResult<Vec<MatchResult>> {
        if probe.dim() != store.dimension() {
            return Err(EngineError::DimensionMismatch {
                expected: store.dimension(),
                found: probe.dim(),
            });
        }

        let mut results = Vec::with_capacity(store.len());
        for identity in store.iter() {
            let cmp = matcher::compare(probe, &identity.embedding, threshold)?;
            results.push(MatchResult {
                identity: identity.clone(),
                similarity: cmp.similarity,
                verified: cmp.verified,
            });
        }

        // Descending similarity; equal scores resolve to the lower id so the
        // ordering never depends on store iteration order.
        results.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(Ordering::Equal)
                .then(a.identity.id.cmp(&b.identity.id))
        });
        results.truncate(k);
        Ok(results)
    }
}

/// Rank with the default linear matcher.
pub fn search(
    store: &EmbeddingStore,
    probe: &Embedding,
    k: usize,
    threshold: f32,
) -> EngineResult<Vec<MatchResult>> {
    LinearMatcher.rank(store, probe, k, threshold)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn emb(values: &[f32]) -> Embedding {
        Embedding::from_raw(values.to_vec())
    }

    fn three_identity_store() -> EmbeddingStore {
        let mut store = EmbeddingStore::in_memory(4);
        store.insert("e1", emb(&[1.0, 0.0, 0.0, 0.0])).unwrap();
        store.insert("e2", emb(&[0.0, 1.0, 0.0, 0.0])).unwrap();
        store.insert("e3", emb(&[0.9, 0.1, 0.0, 0.0])).unwrap();
        store
    }

    #[test]
    fn results_sorted_descending_and_truncated() {
        let store = three_identity_store();
        let hits = search(&store, &emb(&[1.0, 0.0, 0.0, 0.0]), 2, 0.6).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].identity.name, "e1");
        assert!((hits[0].similarity - 1.0).abs() < 1e-6);
        assert_eq!(hits[1].identity.name, "e3");
        assert!((hits[1].similarity - 0.994).abs() < 1e-3);
    }

    #[test]
    fn ties_break_to_lower_id() {
        let mut store = EmbeddingStore::in_memory(2);
        // Same direction, different magnitude: identical cosine.
        store.insert("a", emb(&[1.0, 0.0])).unwrap();
        store.insert("b", emb(&[2.0, 0.0])).unwrap();
        let hits = search(&store, &emb(&[1.0, 0.0]), 10, 0.6).unwrap();
        assert_eq!(hits[0].identity.id, 1);
        assert_eq!(hits[1].identity.id, 2);
    }

    #[test]
    fn empty_store_yields_empty_results() {
        let store = EmbeddingStore::in_memory(4);
        let hits = search(&store, &emb(&[1.0, 0.0, 0.0, 0.0]), 10, 0.6).unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn probe_dimension_checked_before_scanning() {
        let store = three_identity_store();
        match search(&store, &emb(&[1.0, 0.0]), 10, 0.6) {
            Err(EngineError::DimensionMismatch {
                expected: 4,
                found: 2,
            }) => {}
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn repeated_search_is_deterministic() {
        let store = three_identity_store();
        let probe = emb(&[0.7, 0.7, 0.0, 0.0]);
        let first = search(&store, &probe, 3, 0.6).unwrap();
        let second = search(&store, &probe, 3, 0.6).unwrap();
        let ids = |hits: &[MatchResult]| hits.iter().map(|h| h.identity.id).collect::<Vec<_>>();
        assert_eq!(ids(&first), ids(&second));
    }
}
