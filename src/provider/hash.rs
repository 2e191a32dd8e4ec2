//! Deterministic offline embedding backend.
//!
//! Hashes whitespace tokens into buckets of a fixed-size vector and
//! L2-normalizes the result. Texts sharing tokens land near each other,
//! which is enough for development and tests without network access. Not a
//! substitute for a real embedding model.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::provider::{EmbeddingProvider, ProviderError};

pub struct HashProvider {
    dimensions: usize,
}

impl HashProvider {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    fn embed_one(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        if text.trim().is_empty() {
            return Err(ProviderError::EmptyInput);
        }

        let mut vector = vec![0.0f32; self.dimensions];
        for token in text.to_lowercase().split_whitespace() {
            let mut hasher = DefaultHasher::new();
            token.hash(&mut hasher);
            let h = hasher.finish();

            let bucket = (h % self.dimensions as u64) as usize;
            // take the sign from a high bit so unrelated texts spread out
            // instead of all pointing into the positive orthant
            let sign = if h & (1 << 63) == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            for x in vector.iter_mut() {
                *x /= norm;
            }
        }

        Ok(vector)
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for HashProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        self.embed_one(text)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        texts.iter().map(|t| self.embed_one(t)).collect()
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn id(&self) -> String {
        format!("hash:{}", self.dimensions)
    }
}
