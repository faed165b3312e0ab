//! Embedding service trait and the hashed bag-of-words implementation.
//!
//! `HashEmbedding` maps each lower-cased word to a signed bucket of a
//! fixed-width vector and L2-normalizes the result. Texts that share words
//! get a positive cosine similarity, which is enough for passage ranking over
//! a small document set without a model download.

use std::future::Future;
use std::pin::Pin;

use northstar_core::error::NorthstarError;

/// Dimensionality of [`HashEmbedding`] vectors.
pub const HASH_DIMENSIONS: usize = 256;

/// Service for generating text embeddings.
pub trait EmbeddingService: Send + Sync {
    /// Generate an embedding vector for the given text.
    fn embed(&self, text: &str) -> impl Future<Output = Result<Vec<f32>, NorthstarError>> + Send;

    /// Return the dimensionality of vectors produced by this service.
    fn dimensions(&self) -> usize;
}

/// Object-safe version of [`EmbeddingService`] for dynamic dispatch.
pub trait DynEmbeddingService: Send + Sync {
    fn embed_boxed<'a>(
        &'a self,
        text: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<f32>, NorthstarError>> + Send + 'a>>;

    fn dimensions(&self) -> usize;
}

impl<T: EmbeddingService> DynEmbeddingService for T {
    fn embed_boxed<'a>(
        &'a self,
        text: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<f32>, NorthstarError>> + Send + 'a>> {
        Box::pin(self.embed(text))
    }

    fn dimensions(&self) -> usize {
        EmbeddingService::dimensions(self)
    }
}

/// Deterministic hashed bag-of-words embedding.
#[derive(Debug, Clone, Default)]
pub struct HashEmbedding;

impl HashEmbedding {
    pub fn new() -> Self {
        Self
    }

    /// FNV-1a, stable across platforms and compiler versions.
    fn fnv1a(token: &str) -> u64 {
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in token.bytes() {
            hash ^= byte as u64;
            hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
        }
        hash
    }

    fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(|t| t.to_lowercase())
    }

    fn hash_to_vector(text: &str) -> Vec<f32> {
        let mut result = vec![0.0f32; HASH_DIMENSIONS];
        for token in Self::tokens(text) {
            let h = Self::fnv1a(&token);
            let bucket = (h % HASH_DIMENSIONS as u64) as usize;
            let sign = if (h >> 63) == 0 { 1.0 } else { -1.0 };
            result[bucket] += sign;
        }

        let norm: f32 = result.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for val in &mut result {
                *val /= norm;
            }
        }
        result
    }
}

impl EmbeddingService for HashEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, NorthstarError> {
        if text.trim().is_empty() {
            return Err(NorthstarError::Search("Cannot embed empty text".to_string()));
        }
        Ok(Self::hash_to_vector(text))
    }

    fn dimensions(&self) -> usize {
        HASH_DIMENSIONS
    }
}
