//! Retrieval operations over the vector index.
//!
//! `RetrievalService` coordinates the embedding provider, the in-memory
//! index and the on-disk snapshot. It owns the query-side semantics
//! (search, related notes, duplicate detection) and the index maintenance
//! path (upserts, removal, reconcile).
//!
//! Locking discipline: embedding happens before any index access, and
//! ranking happens over snapshots, so no provider call or score loop ever
//! runs under a shard lock.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::RetrievalConfig;
use crate::notes::Note;
use crate::provider::{EmbeddingProvider, ProviderError};
use crate::semantic::index::{IndexError, UpsertOutcome, VectorIndex};
use crate::semantic::preprocess::compose_text;
use crate::semantic::ranker::{self, ScoredNote};
use crate::semantic::storage::{provider_fingerprint, VectorStorage, VectorStorageError};

/// Notes embedded per provider call during reconcile
const RECONCILE_BATCH: usize = 32;

/// Errors that can occur during retrieval operations.
#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Note {0} has no embedding")]
    NotFound(u64),

    #[error("Embedding provider unavailable: {0}")]
    EmbeddingUnavailable(#[source] ProviderError),

    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    #[error("Storage error: {0}")]
    Storage(#[from] VectorStorageError),
}

/// Map a provider failure onto the retrieval error taxonomy. Rejected
/// input is the caller's fault, everything else means the provider could
/// not be reached or refused us.
fn embed_err(err: ProviderError) -> RetrievalError {
    match err {
        ProviderError::EmptyInput => {
            RetrievalError::InvalidInput("embedding input is empty".to_string())
        }
        other => RetrievalError::EmbeddingUnavailable(other),
    }
}

/// What a reconcile pass did.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct ReconcileSummary {
    /// Notes whose vector was missing or stale and got re-embedded
    pub embedded: usize,
    /// Index entries dropped because their note no longer exists
    pub removed: usize,
    /// Notes whose vector was already up to date
    pub unchanged: usize,
}

/// Service for semantic retrieval over notes.
pub struct RetrievalService {
    provider: Arc<dyn EmbeddingProvider>,
    index: VectorIndex,
    storage: VectorStorage,
    config: RetrievalConfig,
    fingerprint: [u8; 32],
}

impl RetrievalService {
    /// Open the service: load the vector snapshot if one exists and is
    /// compatible, otherwise start with an empty index.
    ///
    /// The snapshot is derived data, so every load failure degrades to an
    /// empty index rather than an error; a reconcile pass rebuilds it.
    pub fn open(
        provider: Arc<dyn EmbeddingProvider>,
        vectors_path: PathBuf,
        config: RetrievalConfig,
    ) -> Self {
        let dimensions = provider.dimensions();
        let fingerprint = provider_fingerprint(&provider.id());
        let storage = VectorStorage::new(vectors_path);

        let index = if storage.exists() {
            match storage.load(&fingerprint, dimensions) {
                Ok(index) => {
                    log::info!("Loaded {} vectors from storage", index.len());
                    index
                }
                Err(VectorStorageError::ProviderMismatch) => {
                    log::warn!("Embedding provider changed, starting with a fresh index");
                    VectorIndex::new(dimensions)
                }
                Err(VectorStorageError::VersionMismatch(file_ver, _)) => {
                    log::warn!(
                        "Vector snapshot format version {} unsupported, starting fresh",
                        file_ver
                    );
                    VectorIndex::new(dimensions)
                }
                Err(e) => {
                    log::warn!("Discarding unreadable vector snapshot ({}); reindex rebuilds it", e);
                    VectorIndex::new(dimensions)
                }
            }
        } else {
            log::info!("No existing vector snapshot, starting fresh");
            VectorIndex::new(dimensions)
        };

        Self {
            provider,
            index,
            storage,
            config,
            fingerprint,
        }
    }

    /// Get the number of indexed notes.
    pub fn indexed_count(&self) -> usize {
        self.index.len()
    }

    /// Search all notes by free-text query.
    ///
    /// Results are sorted by score descending, ties broken by note id, at
    /// most `limit` entries (config default when `None`).
    pub async fn search(
        &self,
        query: &str,
        limit: Option<usize>,
    ) -> Result<Vec<ScoredNote>, RetrievalError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(RetrievalError::InvalidInput("search query is empty".to_string()));
        }

        let vector = self.provider.embed(query).await.map_err(embed_err)?;
        let candidates = self.index.snapshot();
        Ok(ranker::top_k(
            &vector,
            &candidates,
            &[],
            limit.unwrap_or(self.config.search_limit),
        ))
    }

    /// Notes most similar to an already-indexed note.
    ///
    /// Uses the stored vector, so no provider call happens. The note
    /// itself is excluded before ranking. Fails with
    /// [`RetrievalError::NotFound`] when the note has no vector.
    pub fn related_to(
        &self,
        note_id: u64,
        limit: Option<usize>,
    ) -> Result<Vec<ScoredNote>, RetrievalError> {
        let record = self
            .index
            .get(note_id)
            .ok_or(RetrievalError::NotFound(note_id))?;

        let candidates = self.index.snapshot();
        Ok(ranker::top_k(
            &record.vector,
            &candidates,
            &[note_id],
            limit.unwrap_or(self.config.related_limit),
        ))
    }

    /// Notes related to draft text that has not been saved yet.
    ///
    /// Short drafts return no results without touching the provider; a
    /// few characters do not carry enough meaning to embed, and this path
    /// runs on every keystroke burst.
    pub async fn related_by_content(
        &self,
        content: &str,
        limit: Option<usize>,
    ) -> Result<Vec<ScoredNote>, RetrievalError> {
        let content = content.trim();
        if content.chars().count() < self.config.min_live_chars {
            return Ok(Vec::new());
        }

        let vector = self.provider.embed(content).await.map_err(embed_err)?;
        let candidates = self.index.snapshot();
        Ok(ranker::top_k(
            &vector,
            &candidates,
            &[],
            limit.unwrap_or(self.config.related_limit),
        ))
    }

    /// Find likely duplicates of a draft note.
    ///
    /// Only candidates scoring strictly above the configured threshold are
    /// returned. `exclude` removes the note being edited so it never flags
    /// itself.
    pub async fn check_duplicates(
        &self,
        title: &str,
        content: &str,
        exclude: Option<u64>,
    ) -> Result<Vec<ScoredNote>, RetrievalError> {
        let Some(text) = compose_text(title, content) else {
            return Err(RetrievalError::InvalidInput(
                "title and content are both empty".to_string(),
            ));
        };

        let vector = self.provider.embed(&text).await.map_err(embed_err)?;
        let candidates = self.index.snapshot();
        let exclude: Vec<u64> = exclude.into_iter().collect();
        Ok(ranker::top_k_above(
            &vector,
            &candidates,
            &exclude,
            self.config.duplicate_threshold,
            self.config.related_limit,
        ))
    }

    /// Embed a note document (title plus content).
    ///
    /// This is the write-path half that talks to the provider; pair it
    /// with [`RetrievalService::upsert_vector`] once the note revision is
    /// known.
    pub async fn embed_note_text(
        &self,
        title: &str,
        content: &str,
    ) -> Result<Vec<f32>, RetrievalError> {
        let Some(text) = compose_text(title, content) else {
            return Err(RetrievalError::InvalidInput(
                "title and content are both empty".to_string(),
            ));
        };
        self.provider.embed(&text).await.map_err(embed_err)
    }

    /// Store a previously computed vector under the note's revision.
    pub fn upsert_vector(
        &self,
        note_id: u64,
        version: u64,
        vector: Vec<f32>,
    ) -> Result<UpsertOutcome, RetrievalError> {
        let outcome = self.index.upsert(note_id, version, vector)?;
        log::debug!("Vector upsert for note {} (v{}): {:?}", note_id, version, outcome);
        Ok(outcome)
    }

    /// Drop a note's vector. Returns whether one was present.
    pub fn remove_note(&self, note_id: u64) -> bool {
        self.index.delete(note_id)
    }

    /// Bring the index in line with the given notes.
    ///
    /// Embeds notes whose vector is missing or older than the note
    /// revision, drops vectors whose note no longer exists, and leaves
    /// up-to-date entries alone. With `force` every note is re-embedded.
    ///
    /// Notes are embedded in batches; a provider failure aborts the pass
    /// but keeps whatever was already upserted, so a retry picks up where
    /// this one stopped.
    pub async fn reconcile(
        &self,
        notes: &[Note],
        force: bool,
    ) -> Result<ReconcileSummary, RetrievalError> {
        let mut summary = ReconcileSummary::default();

        // Drop vectors for notes that no longer exist
        let live_ids: HashSet<u64> = notes.iter().map(|n| n.id).collect();
        for id in self.index.ids() {
            if !live_ids.contains(&id) && self.index.delete(id) {
                summary.removed += 1;
            }
        }

        // Collect notes whose vector is missing or stale
        let mut pending: Vec<&Note> = Vec::new();
        for note in notes {
            match self.index.get(note.id) {
                Some(record) if !force && record.version >= note.revision => {
                    summary.unchanged += 1;
                }
                _ => pending.push(note),
            }
        }

        for chunk in pending.chunks(RECONCILE_BATCH) {
            let mut batch_notes: Vec<&Note> = Vec::with_capacity(chunk.len());
            let mut batch_texts: Vec<String> = Vec::with_capacity(chunk.len());
            for note in chunk {
                match compose_text(&note.title, &note.content) {
                    Some(text) => {
                        batch_notes.push(note);
                        batch_texts.push(text);
                    }
                    None => {
                        // A blank note cannot be embedded; make sure no
                        // stale vector lingers for it either
                        log::warn!("Note {} has no embeddable content, skipping", note.id);
                        if self.index.delete(note.id) {
                            summary.removed += 1;
                        }
                    }
                }
            }
            if batch_notes.is_empty() {
                continue;
            }

            let vectors = self
                .provider
                .embed_batch(&batch_texts)
                .await
                .map_err(embed_err)?;
            for (note, vector) in batch_notes.iter().zip(vectors) {
                self.index.upsert(note.id, note.revision, vector)?;
                summary.embedded += 1;
            }
        }

        Ok(summary)
    }

    /// Persist the current index state to vectors.bin.
    pub fn save(&self) -> Result<(), RetrievalError> {
        self.storage.save(&self.index, &self.fingerprint)?;
        log::debug!("Saved {} vectors to {}", self.index.len(), self.storage.path().display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notes::now_millis;
    use crate::provider::HashProvider;
    use std::sync::atomic::{AtomicU64, Ordering};

    static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

    fn temp_vectors_path() -> PathBuf {
        let counter = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
        std::env::temp_dir().join(format!(
            "notevault-service-test-{}-{}.bin",
            std::process::id(),
            counter
        ))
    }

    fn test_service() -> RetrievalService {
        RetrievalService::open(
            Arc::new(HashProvider::new(64)),
            temp_vectors_path(),
            RetrievalConfig::default(),
        )
    }

    fn note(id: u64, revision: u64, title: &str, content: &str) -> Note {
        let now = now_millis();
        Note {
            id,
            title: title.to_string(),
            content: content.to_string(),
            tags: Vec::new(),
            created_at: now,
            updated_at: now,
            revision,
        }
    }

    async fn seed(service: &RetrievalService, id: u64, version: u64, title: &str, content: &str) {
        let vector = service.embed_note_text(title, content).await.unwrap();
        service.upsert_vector(id, version, vector).unwrap();
    }

    #[tokio::test]
    async fn test_search_rejects_empty_query() {
        let service = test_service();
        let result = service.search("   ", None).await;
        assert!(matches!(result, Err(RetrievalError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_search_ranks_by_similarity() {
        let service = test_service();
        seed(&service, 1, 1, "Rust ownership", "borrow checker lifetimes ownership").await;
        seed(&service, 2, 1, "Banana bread", "flour sugar banana oven").await;

        let results = service.search("rust lifetimes ownership", None).await.unwrap();
        assert_eq!(results[0].note_id, 1);
        assert!(results[0].score > results[1].score);
    }

    #[tokio::test]
    async fn test_search_respects_limit() {
        let service = test_service();
        for id in 1..=5 {
            seed(&service, id, 1, "note", "shared words here").await;
        }

        let results = service.search("shared words", Some(2)).await.unwrap();
        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn test_related_to_unknown_note() {
        let service = test_service();
        let result = service.related_to(99, None);
        assert!(matches!(result, Err(RetrievalError::NotFound(99))));
    }

    #[tokio::test]
    async fn test_related_to_excludes_self() {
        let service = test_service();
        seed(&service, 1, 1, "Coffee brewing", "grind beans pour water").await;
        seed(&service, 2, 1, "Espresso notes", "grind beans pressure water").await;

        let results = service.related_to(1, None).unwrap();
        assert!(!results.iter().any(|r| r.note_id == 1));
        assert!(results.iter().any(|r| r.note_id == 2));
    }

    #[tokio::test]
    async fn test_related_by_content_short_draft_is_empty() {
        let service = test_service();
        seed(&service, 1, 1, "Something", "indexed content words").await;

        let results = service.related_by_content("too short", None).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_related_by_content_threshold_is_in_chars() {
        let service = test_service();
        let text = "x".repeat(30);
        seed(&service, 1, 1, &text, "").await;

        // 29 chars is below the default minimum of 30, 30 is not
        let below = service.related_by_content(&"x".repeat(29), None).await.unwrap();
        assert!(below.is_empty());

        let at = service.related_by_content(&text, None).await.unwrap();
        assert_eq!(at[0].note_id, 1);
    }

    #[tokio::test]
    async fn test_check_duplicates_flags_same_text() {
        let service = test_service();
        seed(&service, 1, 1, "Meeting notes", "discuss roadmap with platform team").await;
        seed(&service, 2, 1, "Groceries", "eggs milk butter").await;

        let hits = service
            .check_duplicates("Meeting notes", "discuss roadmap with platform team", None)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].note_id, 1);
        assert!(hits[0].score > 0.99);
    }

    #[tokio::test]
    async fn test_check_duplicates_excludes_edited_note() {
        let service = test_service();
        seed(&service, 1, 1, "Meeting notes", "discuss roadmap with platform team").await;

        let hits = service
            .check_duplicates("Meeting notes", "discuss roadmap with platform team", Some(1))
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_check_duplicates_rejects_blank_draft() {
        let service = test_service();
        let result = service.check_duplicates("  ", "", None).await;
        assert!(matches!(result, Err(RetrievalError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_embed_note_text_rejects_blank() {
        let service = test_service();
        let result = service.embed_note_text("", "  ").await;
        assert!(matches!(result, Err(RetrievalError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_reconcile_embeds_missing_and_drops_orphans() {
        let service = test_service();
        let notes = vec![
            note(1, 1, "First", "some content here"),
            note(2, 1, "Second", "other content there"),
        ];

        // Orphan vector with no backing note
        seed(&service, 99, 1, "Ghost", "deleted long ago").await;

        let summary = service.reconcile(&notes, false).await.unwrap();
        assert_eq!(summary.embedded, 2);
        assert_eq!(summary.removed, 1);
        assert_eq!(summary.unchanged, 0);
        assert_eq!(service.indexed_count(), 2);
    }

    #[tokio::test]
    async fn test_reconcile_is_idempotent() {
        let service = test_service();
        let notes = vec![note(1, 1, "First", "some content here")];

        service.reconcile(&notes, false).await.unwrap();
        let second = service.reconcile(&notes, false).await.unwrap();
        assert_eq!(second.embedded, 0);
        assert_eq!(second.unchanged, 1);
    }

    #[tokio::test]
    async fn test_reconcile_reembeds_stale_revision() {
        let service = test_service();
        let mut notes = vec![note(1, 1, "First", "some content here")];
        service.reconcile(&notes, false).await.unwrap();

        notes[0].revision = 2;
        notes[0].content = "edited content here".to_string();
        let summary = service.reconcile(&notes, false).await.unwrap();
        assert_eq!(summary.embedded, 1);
        assert_eq!(service.indexed_count(), 1);
    }

    #[tokio::test]
    async fn test_reconcile_force_reembeds_everything() {
        let service = test_service();
        let notes = vec![
            note(1, 1, "First", "some content here"),
            note(2, 1, "Second", "other content there"),
        ];
        service.reconcile(&notes, false).await.unwrap();

        let summary = service.reconcile(&notes, true).await.unwrap();
        assert_eq!(summary.embedded, 2);
        assert_eq!(summary.unchanged, 0);
    }

    #[tokio::test]
    async fn test_reconcile_skips_blank_notes() {
        let service = test_service();
        let notes = vec![note(1, 1, "", "   ")];

        let summary = service.reconcile(&notes, false).await.unwrap();
        assert_eq!(summary.embedded, 0);
        assert_eq!(service.indexed_count(), 0);
    }

    #[tokio::test]
    async fn test_save_and_reopen_round_trip() {
        let path = temp_vectors_path();
        let provider: Arc<dyn EmbeddingProvider> = Arc::new(HashProvider::new(64));

        {
            let service = RetrievalService::open(
                provider.clone(),
                path.clone(),
                RetrievalConfig::default(),
            );
            let vector = service.embed_note_text("Persistent", "survives restarts").await.unwrap();
            service.upsert_vector(7, 3, vector).unwrap();
            service.save().unwrap();
        }

        let reopened = RetrievalService::open(provider, path.clone(), RetrievalConfig::default());
        assert_eq!(reopened.indexed_count(), 1);
        let results = reopened.related_to(7, None).unwrap();
        assert!(results.is_empty());

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_open_with_unreadable_snapshot_starts_fresh() {
        let path = temp_vectors_path();
        std::fs::write(&path, b"not a vector snapshot").unwrap();

        let service = RetrievalService::open(
            Arc::new(HashProvider::new(64)),
            path.clone(),
            RetrievalConfig::default(),
        );
        assert_eq!(service.indexed_count(), 0);

        let _ = std::fs::remove_file(&path);
    }
}
