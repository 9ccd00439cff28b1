//! Embedding gateway trait and vector utilities.
//!
//! Defines the [`Embedder`] trait that all embedding backends implement,
//! plus pure helpers for vector serialization and similarity.
//!
//! Concrete HTTP providers (OpenAI, Ollama) live in the `policy-check` app
//! crate.

use async_trait::async_trait;

use crate::error::ComplianceError;

/// Converts texts into fixed-dimension vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;

    /// Returns the embedding vector dimensionality (e.g. `1536`).
    fn dims(&self) -> usize;

    /// Embed a batch of texts as one logical call.
    ///
    /// HTTP providers may split a large batch into several requests of at
    /// most `embedding.batch_size` texts; the first failing request fails
    /// the whole call.
    ///
    /// Returns one vector per input, in input order. Any failure, including
    /// a response with the wrong number of vectors, is an
    /// [`ComplianceError::EmbeddingService`]; there is no partial success.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ComplianceError>;
}

/// Verify that a provider returned exactly one vector per input, each of
/// `dims` components.
pub fn ensure_batch_shape(
    expected: usize,
    dims: usize,
    vectors: Vec<Vec<f32>>,
) -> Result<Vec<Vec<f32>>, ComplianceError> {
    if vectors.len() != expected {
        return Err(ComplianceError::EmbeddingService(format!(
            "expected {} embeddings, got {}",
            expected,
            vectors.len()
        )));
    }
    if let Some((i, v)) = vectors.iter().enumerate().find(|(_, v)| v.len() != dims) {
        return Err(ComplianceError::EmbeddingService(format!(
            "embedding {} has {} dimensions, expected {}",
            i,
            v.len(),
            dims
        )));
    }
    Ok(vectors)
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// # Example
///
/// ```rust
/// use policy_check_core::embedding::{vec_to_blob, blob_to_vec};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12);
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB produced by [`vec_to_blob`].
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity in `[-1.0, 1.0]`.
///
/// Returns `0.0` for empty vectors, vectors of different lengths, or a
/// zero-magnitude vector.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec_blob_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        assert_eq!(blob_to_vec(&vec_to_blob(&vec)), vec);
    }

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        let sim = cosine_similarity(&[1.0, 0.0, 0.0], &[0.0, 1.0, 0.0]);
        assert!(sim.abs() < 1e-6);
    }

    #[test]
    fn test_cosine_degenerate_inputs() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn test_batch_len_mismatch() {
        let err = ensure_batch_shape(2, 1, vec![vec![1.0]]).unwrap_err();
        assert!(matches!(err, ComplianceError::EmbeddingService(_)));
        assert_eq!(ensure_batch_shape(1, 1, vec![vec![1.0]]).unwrap().len(), 1);
    }

    #[test]
    fn test_batch_dims_mismatch() {
        let err = ensure_batch_shape(2, 3, vec![vec![1.0, 0.0, 0.0], vec![1.0, 0.0]]).unwrap_err();
        assert!(matches!(err, ComplianceError::EmbeddingService(_)));
        assert!(err.to_string().contains("embedding 1 has 2 dimensions, expected 3"));
    }
}
