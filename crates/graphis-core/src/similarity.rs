//! Similarity scoring and candidate ranking.

use std::cmp::Ordering;

use crate::error::SimilarityError;
use crate::types::{Embedding, MatchResult};

/// Cosine similarity between two embeddings: `dot(a,b) / (‖a‖·‖b‖)`.
///
/// In `[-1, 1]` for arbitrary embeddings; relu-constrained extractors only
/// produce non-negative components, so scores land in `[0, 1]` in practice.
/// A zero-norm vector has no defined direction: that case fails with
/// `DegenerateEmbedding` rather than silently dividing by zero.
pub fn similarity(a: &Embedding, b: &Embedding) -> Result<f32, SimilarityError> {
    if a.dim() != b.dim() {
        return Err(SimilarityError::DimensionMismatch {
            a: a.dim(),
            b: b.dim(),
        });
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (&x, &y) in a.as_slice().iter().zip(b.as_slice()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a <= 0.0 || norm_b <= 0.0 {
        return Err(SimilarityError::DegenerateEmbedding);
    }
    Ok(dot / (norm_a.sqrt() * norm_b.sqrt()))
}

/// Rank candidates against a query embedding, best match first.
///
/// Descending by score, ties broken by preserving input order (stable
/// sort). Tie stability is part of the contract: it makes "top match"
/// results reproducible when several candidates score identically.
pub fn rank(
    query: &Embedding,
    candidates: &[(String, Embedding)],
) -> Result<Vec<MatchResult>, SimilarityError> {
    let mut matches = Vec::with_capacity(candidates.len());
    for (writer_id, embedding) in candidates {
        let score = similarity(query, embedding)?;
        matches.push(MatchResult {
            writer_id: writer_id.clone(),
            score,
        });
    }
    // Scores are never NaN here (degenerate vectors already errored), so
    // partial_cmp only falls back on exact ties, which Equal preserves.
    matches.sort_by(|x, y| y.score.partial_cmp(&x.score).unwrap_or(Ordering::Equal));
    Ok(matches)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn emb(values: &[f32]) -> Embedding {
        Embedding::new(values.to_vec())
    }

    #[test]
    fn test_similarity_bounds() {
        let a = emb(&[1.0, 2.0, -3.0]);
        let b = emb(&[-2.0, 0.5, 1.0]);
        let s = similarity(&a, &b).unwrap();
        assert!((-1.0..=1.0).contains(&s));
    }

    #[test]
    fn test_self_similarity_is_one() {
        let a = emb(&[0.3, 0.7, 0.1, 0.9]);
        let s = similarity(&a, &a).unwrap();
        assert!((s - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_similarity_symmetric() {
        let a = emb(&[1.0, 0.0, 2.0]);
        let b = emb(&[0.5, 1.5, 0.25]);
        assert_eq!(similarity(&a, &b).unwrap(), similarity(&b, &a).unwrap());
    }

    #[test]
    fn test_opposite_vectors_score_minus_one() {
        let a = emb(&[1.0, 2.0]);
        let b = emb(&[-1.0, -2.0]);
        let s = similarity(&a, &b).unwrap();
        assert!((s + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_zero_norm_is_degenerate() {
        let a = emb(&[0.0, 0.0, 0.0]);
        let b = emb(&[1.0, 2.0, 3.0]);
        assert!(matches!(
            similarity(&a, &b),
            Err(SimilarityError::DegenerateEmbedding)
        ));
        assert!(matches!(
            similarity(&b, &a),
            Err(SimilarityError::DegenerateEmbedding)
        ));
    }

    #[test]
    fn test_dimension_mismatch() {
        let a = emb(&[1.0, 2.0]);
        let b = emb(&[1.0, 2.0, 3.0]);
        assert!(matches!(
            similarity(&a, &b),
            Err(SimilarityError::DimensionMismatch { a: 2, b: 3 })
        ));
    }

    #[test]
    fn test_rank_descending() {
        let query = emb(&[1.0, 0.0]);
        let candidates = vec![
            ("far".to_string(), emb(&[0.0, 1.0])),
            ("near".to_string(), emb(&[1.0, 0.1])),
            ("mid".to_string(), emb(&[1.0, 1.0])),
        ];
        let ranked = rank(&query, &candidates).unwrap();
        let ids: Vec<&str> = ranked.iter().map(|m| m.writer_id.as_str()).collect();
        assert_eq!(ids, ["near", "mid", "far"]);
    }

    #[test]
    fn test_rank_ties_preserve_input_order() {
        let query = emb(&[1.0, 0.0]);
        // A and B are both exactly colinear with the query (score 1.0);
        // C clearly scores lower.
        let candidates = vec![
            ("a".to_string(), emb(&[2.0, 0.0])),
            ("b".to_string(), emb(&[5.0, 0.0])),
            ("c".to_string(), emb(&[1.0, 1.0])),
        ];
        let ranked = rank(&query, &candidates).unwrap();
        let ids: Vec<&str> = ranked.iter().map(|m| m.writer_id.as_str()).collect();
        assert_eq!(ids, ["a", "b", "c"]);
    }

    #[test]
    fn test_rank_propagates_degenerate_candidate() {
        let query = emb(&[1.0, 0.0]);
        let candidates = vec![
            ("ok".to_string(), emb(&[1.0, 1.0])),
            ("zero".to_string(), emb(&[0.0, 0.0])),
        ];
        assert!(rank(&query, &candidates).is_err());
    }
}
