//! Cosine ranking over index snapshots.
//!
//! Pure functions: take a query vector and a candidate list, return scored
//! notes. Keeping ranking out of the index means it never runs under a
//! shard lock.
//!
//! Ordering is fully deterministic: score descending, then note id
//! ascending, so equal inputs always produce byte-identical result lists.

use std::cmp::Ordering;

use serde::Serialize;

use crate::semantic::index::EmbeddingRecord;

/// A ranked note.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredNote {
    /// Note ID
    pub note_id: u64,
    /// Cosine similarity score, always within [-1.0, 1.0]
    pub score: f32,
}

/// Compute cosine similarity between two vectors.
///
/// Degenerate inputs get a pinned score instead of NaN: if either vector
/// has (near-)zero norm the result is `-1.0`, ranking it below every real
/// match. Accumulated float error is clamped so the result stays within
/// `[-1.0, 1.0]`.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let norm_a = l2_norm(a);
    let norm_b = l2_norm(b);
    if norm_a < f32::EPSILON || norm_b < f32::EPSILON {
        return -1.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let score = dot / (norm_a * norm_b);
    if !score.is_finite() {
        return -1.0;
    }
    score.clamp(-1.0, 1.0)
}

fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Rank candidates against a query vector and keep the best `limit`.
///
/// Ids listed in `exclude` are removed before ranking, so they never
/// occupy a result slot.
pub fn top_k(
    query: &[f32],
    candidates: &[(u64, EmbeddingRecord)],
    exclude: &[u64],
    limit: usize,
) -> Vec<ScoredNote> {
    rank(query, candidates, exclude, None, limit)
}

/// Like [`top_k`], but drops candidates scoring at or below `threshold`.
///
/// The comparison is strict: a candidate at exactly the threshold is not
/// returned.
pub fn top_k_above(
    query: &[f32],
    candidates: &[(u64, EmbeddingRecord)],
    exclude: &[u64],
    threshold: f32,
    limit: usize,
) -> Vec<ScoredNote> {
    rank(query, candidates, exclude, Some(threshold), limit)
}

fn rank(
    query: &[f32],
    candidates: &[(u64, EmbeddingRecord)],
    exclude: &[u64],
    threshold: Option<f32>,
    limit: usize,
) -> Vec<ScoredNote> {
    let mut results: Vec<ScoredNote> = candidates
        .iter()
        .filter(|(id, _)| !exclude.contains(id))
        .map(|(id, record)| ScoredNote {
            note_id: *id,
            score: cosine_similarity(query, &record.vector),
        })
        .filter(|scored| threshold.map_or(true, |t| scored.score > t))
        .collect();

    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.note_id.cmp(&b.note_id))
    });

    results.truncate(limit);
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn candidates(entries: &[(u64, Vec<f32>)]) -> Vec<(u64, EmbeddingRecord)> {
        entries
            .iter()
            .map(|(id, v)| {
                (
                    *id,
                    EmbeddingRecord {
                        version: 1,
                        vector: Arc::new(v.clone()),
                    },
                )
            })
            .collect()
    }

    #[test]
    fn test_cosine_identical_vectors() {
        let v = vec![0.5, 0.5, 0.7];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal_vectors() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_opposite_vectors() {
        let a = vec![1.0, 0.0];
        let b = vec![-1.0, 0.0];
        assert!((cosine_similarity(&a, &b) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_is_symmetric() {
        let a = vec![0.3, -0.2, 0.9];
        let b = vec![0.1, 0.8, 0.4];
        assert_eq!(cosine_similarity(&a, &b), cosine_similarity(&b, &a));
    }

    #[test]
    fn test_cosine_zero_vector_pins_to_minus_one() {
        let zero = vec![0.0, 0.0, 0.0];
        let v = vec![1.0, 0.0, 0.0];
        assert_eq!(cosine_similarity(&zero, &v), -1.0);
        assert_eq!(cosine_similarity(&v, &zero), -1.0);
        assert_eq!(cosine_similarity(&zero, &zero), -1.0);
    }

    #[test]
    fn test_cosine_never_exceeds_bounds() {
        // Norms of tiny magnitudes lose precision; the clamp keeps the
        // score inside [-1, 1] anyway.
        let a = vec![1e-18, 1e-18, 1e-18];
        let b = vec![1e-18, 1e-18, 1e-18];
        let score = cosine_similarity(&a, &b);
        assert!((-1.0..=1.0).contains(&score));
    }

    #[test]
    fn test_top_k_ranks_and_limits() {
        let cands = candidates(&[
            (1, vec![1.0, 0.0, 0.0]),
            (2, vec![0.0, 1.0, 0.0]),
            (3, vec![0.9, 0.1, 0.0]),
        ]);
        let query = vec![1.0, 0.0, 0.0];

        let results = top_k(&query, &cands, &[], 2);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].note_id, 1);
        assert!((results[0].score - 1.0).abs() < 1e-6);
        assert_eq!(results[1].note_id, 3);
        assert!(results[1].score > 0.99 && results[1].score < 0.995);
    }

    #[test]
    fn test_top_k_returns_fewer_when_index_is_small() {
        let cands = candidates(&[(1, vec![1.0, 0.0])]);
        let results = top_k(&[1.0, 0.0], &cands, &[], 10);
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn test_exclusion_happens_before_ranking() {
        // The excluded id would be the best match; limit 2 must still be
        // filled from the remaining candidates.
        let cands = candidates(&[
            (1, vec![1.0, 0.0]),
            (2, vec![0.9, 0.1]),
            (3, vec![0.8, 0.2]),
        ]);
        let results = top_k(&[1.0, 0.0], &cands, &[1], 2);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].note_id, 2);
        assert_eq!(results[1].note_id, 3);
    }

    #[test]
    fn test_tied_scores_order_by_id() {
        let cands = candidates(&[
            (9, vec![1.0, 0.0]),
            (2, vec![1.0, 0.0]),
            (5, vec![1.0, 0.0]),
        ]);
        let results = top_k(&[1.0, 0.0], &cands, &[], 10);
        let ids: Vec<u64> = results.iter().map(|r| r.note_id).collect();
        assert_eq!(ids, vec![2, 5, 9]);
    }

    #[test]
    fn test_zero_candidate_sorts_last() {
        let cands = candidates(&[
            (1, vec![0.0, 0.0]),
            (2, vec![0.7, 0.7]),
        ]);
        let results = top_k(&[1.0, 0.0], &cands, &[], 10);
        assert_eq!(results[0].note_id, 2);
        assert_eq!(results[1].note_id, 1);
        assert_eq!(results[1].score, -1.0);
    }

    #[test]
    fn test_threshold_is_strict() {
        // [4,3] vs [3,4]: dot 24, norms 5 and 5, score exactly 24/25
        let cands = candidates(&[(1, vec![3.0, 4.0])]);
        let query = vec![4.0, 3.0];

        let at = top_k_above(&query, &cands, &[], 0.96, 10);
        assert!(at.is_empty());

        let below = top_k_above(&query, &cands, &[], 0.95, 10);
        assert_eq!(below.len(), 1);
        assert_eq!(below[0].note_id, 1);
    }

    #[test]
    fn test_threshold_keeps_ordering() {
        let cands = candidates(&[
            (1, vec![1.0, 0.0]),
            (2, vec![0.9, 0.1]),
            (3, vec![0.0, 1.0]),
        ]);
        let results = top_k_above(&[1.0, 0.0], &cands, &[], 0.5, 10);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].note_id, 1);
        assert_eq!(results[1].note_id, 2);
    }

    #[test]
    fn test_empty_candidates() {
        let results = top_k(&[1.0, 0.0], &[], &[], 10);
        assert!(results.is_empty());
    }
}
