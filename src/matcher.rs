use serde::Serialize;

use crate::embedding::Embedding;
use crate::errors::{EngineError, EngineResult};

/// Outcome of comparing two embeddings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Comparison {
    /// Cosine similarity clamped into [0, 1].
    pub similarity: f32,
    /// Whether `similarity` met the threshold in effect for this call.
    pub verified: bool,
}

/// Compare two embeddings against a verification threshold.
///
/// Pure and stateless; safe to call from any number of threads.
pub fn compare(a: &Embedding, b: &Embedding, threshold: f32) -> EngineResult<Comparison> {
    let similarity = cosine_similarity(a, b)?;
    Ok(Comparison {
        similarity,
        verified: similarity >= threshold,
    })
}

/// Cosine similarity of two equal-length embeddings, clamped into [0, 1].
///
/// Fails with `DimensionMismatch` on unequal lengths. A zero vector on
/// either side yields 0.0 rather than an error.
pub fn cosine_similarity(a: &Embedding, b: &Embedding) -> EngineResult<f32> {
    if a.dim() != b.dim() {
        return Err(EngineError::DimensionMismatch {
            expected: a.dim(),
            found: b.dim(),
        });
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.as_slice().iter().zip(b.as_slice()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        return Ok(0.0);
    }

    // Rounding can push the ratio slightly outside [-1, 1]; a negative
    // cosine means "no match", so the whole range below zero clamps to 0.
    Ok((dot / denom).clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f32 = 1e-6;

    fn emb(values: &[f32]) -> Embedding {
        Embedding::from_raw(values.to_vec())
    }

    #[test]
    fn reflexive_similarity_is_one() {
        let a = emb(&[0.3, -0.2, 0.9, 0.1]);
        let c = compare(&a, &a, 0.6).unwrap();
        assert!((c.similarity - 1.0).abs() < EPS);
        assert!(c.verified);
    }

    #[test]
    fn symmetric() {
        let a = emb(&[1.0, 2.0, 3.0]);
        let b = emb(&[-0.5, 0.25, 4.0]);
        let ab = cosine_similarity(&a, &b).unwrap();
        let ba = cosine_similarity(&b, &a).unwrap();
        assert!((ab - ba).abs() < EPS);
    }

    #[test]
    fn mismatched_lengths_rejected() {
        let a = emb(&[1.0, 0.0]);
        let b = emb(&[1.0, 0.0, 0.0]);
        match cosine_similarity(&a, &b) {
            Err(EngineError::DimensionMismatch {
                expected: 2,
                found: 3,
            }) => {}
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn opposite_vectors_clamp_to_zero() {
        let a = emb(&[1.0, 0.0]);
        let b = emb(&[-1.0, 0.0]);
        assert_eq!(cosine_similarity(&a, &b).unwrap(), 0.0);
    }

    #[test]
    fn zero_vector_scores_zero() {
        let a = emb(&[0.0, 0.0, 0.0]);
        let b = emb(&[1.0, 0.0, 0.0]);
        assert_eq!(cosine_similarity(&a, &b).unwrap(), 0.0);
    }

    #[test]
    fn threshold_controls_verified() {
        let a = emb(&[1.0, 0.0, 0.0, 0.0]);
        let b = emb(&[0.9, 0.1, 0.0, 0.0]);
        let c = compare(&a, &b, 0.6).unwrap();
        assert!((c.similarity - 0.9939).abs() < 1e-3);
        assert!(c.verified);
        let strict = compare(&a, &b, 0.999).unwrap();
        assert!(!strict.verified);
    }
}
