//! Deterministic, offline embedding provider.
//!
//! Feature-hashed bag of words: each lowercase word is hashed with
//! SHA-256; the first eight digest bytes pick a bucket and the ninth picks
//! a sign. The summed vector is L2-normalised. Texts that share words
//! land close together, which is enough for tests and for running the
//! pipeline without network access.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::{EmbeddingBatch, EmbeddingProvider};
use crate::error::ProviderError;

pub const HASH_MODEL_NAME: &str = "hash-bow";

#[derive(Debug, Clone)]
pub struct HashEmbeddingProvider {
    dims: usize,
}

impl HashEmbeddingProvider {
    /// `dims` of zero is raised to one.
    pub fn new(dims: usize) -> Self {
        Self { dims: dims.max(1) }
    }

    /// Embed one text. Text with no word characters maps to the zero vector.
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dims];
        for word in words(text) {
            let digest = Sha256::digest(word.as_bytes());
            let mut bucket_bytes = [0u8; 8];
            bucket_bytes.copy_from_slice(&digest[..8]);
            let bucket = (u64::from_le_bytes(bucket_bytes) % self.dims as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            for x in vector.iter_mut() {
                *x /= norm;
            }
        }
        vector
    }
}

fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
}

#[async_trait]
impl EmbeddingProvider for HashEmbeddingProvider {
    fn model_name(&self) -> &str {
        HASH_MODEL_NAME
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<EmbeddingBatch, ProviderError> {
        let total_tokens = texts.iter().map(|t| words(t).count() as u64).sum();
        Ok(EmbeddingBatch {
            vectors: texts.iter().map(|t| self.embed_text(t)).collect(),
            total_tokens,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::cosine_similarity;

    #[test]
    fn test_deterministic_and_normalised() {
        let p = HashEmbeddingProvider::new(64);
        let a = p.embed_text("Rust ownership and borrowing");
        let b = p.embed_text("rust OWNERSHIP and borrowing!");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        let norm = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_shared_words_are_closer() {
        let p = HashEmbeddingProvider::new(256);
        let query = p.embed_text("photosynthesis in green plants");
        let related = p.embed_text("Green plants perform photosynthesis using light");
        let unrelated = p.embed_text("The stock market closed higher on Friday");
        assert!(cosine_similarity(&query, &related) > cosine_similarity(&query, &unrelated));
    }

    #[test]
    fn test_no_words_is_zero_vector() {
        let p = HashEmbeddingProvider::new(8);
        assert!(p.embed_text("  ...  ").iter().all(|x| *x == 0.0));
    }

    #[tokio::test]
    async fn test_embed_batch_counts_words() {
        let p = HashEmbeddingProvider::new(16);
        let batch = p
            .embed_batch(&["one two".to_string(), "three".to_string()])
            .await
            .unwrap();
        assert_eq!(batch.vectors.len(), 2);
        assert_eq!(batch.total_tokens, 3);
        assert_eq!(p.model_name(), HASH_MODEL_NAME);
    }
}
