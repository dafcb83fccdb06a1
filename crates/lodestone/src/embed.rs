//! Embedding collaborator.
//!
//! The engine never produces embedding vectors; a host that wants semantic
//! ranking injects an [`Embedder`] and supplies pre-computed vectors on its
//! candidate files. The engine only consumes similarity between opaque
//! fixed-dimension vectors.

use async_trait::async_trait;

use crate::error::Result;

/// Produces embedding vectors for text.
///
/// Optional collaborator: the context builder works without one (the
/// embedding component of the hybrid score contributes zero when vectors
/// are absent).
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a piece of text into a fixed-dimension vector.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Cosine similarity between two vectors.
///
/// Returns `0.0` for mismatched dimensions or zero-magnitude vectors; the
/// ranking paths treat that as "no signal" rather than an error.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0_f64;
    let mut norm_a = 0.0_f64;
    let mut norm_b = 0.0_f64;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += f64::from(*x) * f64::from(*y);
        norm_a += f64::from(*x) * f64::from(*x);
        norm_b += f64::from(*y) * f64::from(*y);
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_vectors_score_one() {
        let v = vec![0.5, 0.25, 0.1];
        let sim = cosine_similarity(&v, &v);
        assert!((sim - 1.0).abs() < 1e-9);
    }

    #[test]
    fn orthogonal_vectors_score_zero() {
        let sim = cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]);
        assert!(sim.abs() < 1e-9);
    }

    #[test]
    fn opposite_vectors_score_negative_one() {
        let sim = cosine_similarity(&[1.0, 2.0], &[-1.0, -2.0]);
        assert!((sim + 1.0).abs() < 1e-9);
    }

    #[test]
    fn dimension_mismatch_is_no_signal() {
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }

    #[test]
    fn zero_vector_is_no_signal() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
    }
}
