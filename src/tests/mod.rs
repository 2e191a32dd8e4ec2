//! Integration tests over the assembled application.
//!
//! Each test builds its own [`App`] in a unique temp directory, so parallel
//! tests never collide and no real data is touched. The hash provider keeps
//! everything offline and deterministic.


use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::app::App;
use crate::config::{Config, ProviderKind};
use crate::notes::{BackendJson, NoteDraft};
use crate::provider::{EmbeddingProvider, HashProvider, ProviderError};
use crate::semantic::RetrievalService;

/// Embedding dimension for tests. Small enough to stay cheap, large enough
/// that unrelated topics rarely collide in the hash buckets.
pub const TEST_DIMENSIONS: usize = 64;

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.provider.kind = ProviderKind::Hash;
    config.provider.dimensions = TEST_DIMENSIONS;
    config
}

/// Creates an isolated [`App`] using a unique temp directory.
pub fn create_app() -> (App, tempfile::TempDir) {
    create_app_with(Arc::new(HashProvider::new(TEST_DIMENSIONS)))
}

/// Creates an isolated [`App`] around the given provider, so tests can
/// count embedding calls or inject failures.
pub fn create_app_with(provider: Arc<dyn EmbeddingProvider>) -> (App, tempfile::TempDir) {
    let tmp = tempfile::tempdir().expect("failed to create temp dir");
    let app = open_app(provider, tmp.path());
    (app, tmp)
}

/// Opens an [`App`] over an existing directory, the way a restart would.
pub fn open_app(provider: Arc<dyn EmbeddingProvider>, dir: &Path) -> App {
    let notes_path = dir.join("notes.json");
    let notes = BackendJson::load(notes_path.to_str().unwrap()).expect("failed to open note store");

    let config = test_config();
    let retrieval = RetrievalService::open(
        provider,
        dir.join("vectors.bin"),
        config.retrieval.clone(),
    );

    App::with_parts(Arc::new(notes), Arc::new(retrieval), config)
}

pub fn draft(title: &str, content: &str) -> NoteDraft {
    NoteDraft {
        title: title.to_string(),
        content: content.to_string(),
        tags: vec![],
    }
}

/// Hash provider wrapper that counts calls, optionally delays, and can be
/// flipped into a failing state mid-test.
pub struct StubProvider {
    inner: HashProvider,
    calls: AtomicUsize,
    delay: Duration,
    failing: AtomicBool,
}

impl StubProvider {
    pub fn new(dimensions: usize) -> Self {
        Self {
            inner: HashProvider::new(dimensions),
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
            failing: AtomicBool::new(false),
        }
    }

    pub fn with_delay(dimensions: usize, delay: Duration) -> Self {
        let mut stub = Self::new(dimensions);
        stub.delay = delay;
        stub
    }

    /// Provider calls made so far, single and batch alike.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    async fn checkpoint(&self) -> Result<(), ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(ProviderError::Transient("stub provider is offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for StubProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        self.checkpoint().await?;
        self.inner.embed(text).await
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        self.checkpoint().await?;
        self.inner.embed_batch(texts).await
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    fn id(&self) -> String {
        format!("stub:{}", self.inner.dimensions())
    }
}
