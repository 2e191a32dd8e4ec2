//! Embedding provider boundary.
//!
//! Everything that turns text into vectors lives behind the
//! [`EmbeddingProvider`] trait so retrieval logic never talks to a network
//! client directly. Two backends:
//!
//! - `openai`: OpenAI-compatible HTTP endpoint with timeout and bounded retry
//! - `hash`: deterministic offline embedder for development and tests

mod hash;
mod openai;

pub use hash::HashProvider;
pub use openai::OpenAiProvider;

use std::sync::Arc;

use anyhow::Context;

use crate::config::{ProviderConfig, ProviderKind};

/// Errors from the embedding boundary.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// Empty or whitespace-only input, rejected before any I/O.
    #[error("embedding input is empty")]
    EmptyInput,

    /// The provider produced a vector of the wrong size. Permanent; the
    /// vector must never reach the index.
    #[error("provider returned {got} dimensions, expected {expected}")]
    DimensionMismatch { expected: usize, got: usize },

    /// Worth retrying: timeouts, connection failures, rate limits, 5xx.
    #[error("transient provider failure: {0}")]
    Transient(String),

    /// Not worth retrying: auth failures, malformed requests or responses.
    #[error("permanent provider failure: {0}")]
    Permanent(String),
}

impl ProviderError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderError::Transient(_))
    }
}

/// A source of fixed-dimension text embeddings.
///
/// Implementations retry transient failures internally; an `Err` returned
/// from `embed` is final as far as the adapter is concerned.
#[async_trait::async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError>;

    /// Embed several texts, preserving input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError>;

    /// Embedding dimension D. Every vector this provider returns has
    /// exactly this length.
    fn dimensions(&self) -> usize;

    /// Stable identity of this provider configuration. Vectors produced
    /// under one identity must never be compared against another, so this
    /// string is fingerprinted into the on-disk vector snapshot.
    fn id(&self) -> String;
}

/// Construct the provider described by the configuration.
pub fn create_provider(config: &ProviderConfig) -> anyhow::Result<Arc<dyn EmbeddingProvider>> {
    match config.kind {
        ProviderKind::Openai => {
            let api_key = std::env::var(&config.api_key_env).with_context(|| {
                format!(
                    "embedding provider needs an API key in ${}",
                    config.api_key_env
                )
            })?;
            let provider = OpenAiProvider::new(config, &api_key)?;
            Ok(Arc::new(provider))
        }
        ProviderKind::Hash => Ok(Arc::new(HashProvider::new(config.dimensions))),
    }
}
