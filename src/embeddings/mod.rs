//! Sentence embedding providers.
//!
//! The service embeds chunks and queries with the same model so that cosine
//! similarity between them is meaningful.

pub mod huggingface;

use async_trait::async_trait;

use crate::error::{RagError, Result};

pub use huggingface::{HuggingFaceEmbedder, HuggingFaceEmbedderConfig};

/// A single embedding vector.
pub type Embedding = Vec<f32>;

/// Text-to-vector conversion.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model identifier, for logging.
    fn model_name(&self) -> &str;

    /// Length of every vector this embedder produces.
    fn dimension(&self) -> usize;

    /// Embed a batch of documents, one vector per input, in input order.
    async fn embed_documents(&self, documents: &[String]) -> Result<Vec<Embedding>>;

    /// Embed a single query string.
    async fn embed_query(&self, query: &str) -> Result<Embedding> {
        self.embed_documents(&[query.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| RagError::embedding("embedding service returned no vector for query"))
    }
}

/// Check that a batch response lines up with its inputs.
pub(crate) fn validate_batch(
    vectors: &[Embedding],
    expected_len: usize,
    dimension: usize,
) -> Result<()> {
    if vectors.len() != expected_len {
        return Err(RagError::embedding(format!(
            "expected {} vectors, got {}",
            expected_len,
            vectors.len()
        )));
    }
    if let Some((i, v)) = vectors.iter().enumerate().find(|(_, v)| v.len() != dimension) {
        return Err(RagError::embedding(format!(
            "vector {} has dimension {}, expected {}",
            i,
            v.len(),
            dimension
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedEmbedder;

    #[async_trait]
    impl Embedder for FixedEmbedder {
        fn model_name(&self) -> &str {
            "fixed"
        }

        fn dimension(&self) -> usize {
            2
        }

        async fn embed_documents(&self, documents: &[String]) -> Result<Vec<Embedding>> {
            Ok(documents
                .iter()
                .map(|d| vec![d.len() as f32, 1.0])
                .collect())
        }
    }

    #[test]
    fn test_embed_query_uses_batch() {
        let v = tokio_test::block_on(FixedEmbedder.embed_query("abc")).unwrap();
        assert_eq!(v, vec![3.0, 1.0]);
    }

    #[test]
    fn test_validate_batch() {
        assert!(validate_batch(&[vec![1.0, 2.0]], 1, 2).is_ok());
        let err = validate_batch(&[vec![1.0, 2.0]], 2, 2).unwrap_err();
        assert!(err.to_string().contains("expected 2 vectors"));
        let err = validate_batch(&[vec![1.0, 2.0], vec![1.0]], 2, 2).unwrap_err();
        assert!(err.to_string().contains("vector 1 has dimension 1"));
    }
}
