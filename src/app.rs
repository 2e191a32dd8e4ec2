//! Application facade: the note lifecycle wired to the retrieval core.
//!
//! `App` owns the note store and the retrieval service and keeps the two
//! consistent. The write path embeds before persisting: create and update
//! call the provider first, write the note second and upsert the vector
//! last, so a provider failure leaves neither a half-indexed note nor a
//! note that silently cannot be found by similarity.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use homedir::my_home;
use serde::Serialize;

use crate::config::Config;
use crate::notes::{BackendJson, Note, NoteDraft, NoteStore};
use crate::provider;
use crate::semantic::{ReconcileSummary, RetrievalError, RetrievalService, ScoredNote};

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("note not found")]
    NotFound,

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("embedding provider unavailable: {0}")]
    EmbeddingUnavailable(String),

    #[error("unexpected error: {0:?}")]
    Other(#[from] anyhow::Error),
}

impl From<RetrievalError> for AppError {
    fn from(err: RetrievalError) -> Self {
        match err {
            RetrievalError::InvalidInput(msg) => AppError::InvalidInput(msg),
            RetrievalError::NotFound(_) => AppError::NotFound,
            RetrievalError::EmbeddingUnavailable(e) => AppError::EmbeddingUnavailable(e.to_string()),
            other => AppError::Other(anyhow::Error::new(other)),
        }
    }
}

/// A ranked result joined with its note, for surfaces that show titles
/// instead of bare ids.
#[derive(Debug, Clone, Serialize)]
pub struct NoteHit {
    #[serde(flatten)]
    pub note: Note,
    pub score: f32,
}

/// Resolved data file locations.
pub struct AppPaths {
    pub base_path: String,
    pub notes_path: String,
    pub vectors_path: String,
}

/// Resolve the data directory, creating it if needed.
///
/// `NOTEVAULT_BASE_PATH` overrides the default of
/// `~/.local/share/notevault`.
pub fn get_paths() -> anyhow::Result<AppPaths> {
    let base_path = std::env::var("NOTEVAULT_BASE_PATH").unwrap_or(format!(
        "{}/.local/share/notevault",
        my_home()
            .expect("couldnt find home dir")
            .expect("couldnt find home dir")
            .to_string_lossy()
    ));

    std::fs::create_dir_all(&base_path)
        .with_context(|| format!("failed to create data directory {base_path}"))?;

    Ok(AppPaths {
        notes_path: format!("{base_path}/notes.json"),
        vectors_path: format!("{base_path}/vectors.bin"),
        base_path,
    })
}

pub struct App {
    notes: Arc<dyn NoteStore>,
    retrieval: Arc<RetrievalService>,
    config: Config,
}

impl App {
    /// Open the app with the config file under `paths.base_path`.
    pub fn open(paths: &AppPaths) -> anyhow::Result<App> {
        let config = Config::load_with(&paths.base_path);
        Self::open_with(paths, config)
    }

    /// Open the app with an explicit config. Used directly by tests.
    pub fn open_with(paths: &AppPaths, config: Config) -> anyhow::Result<App> {
        let provider = provider::create_provider(&config.provider)?;
        let notes = BackendJson::load(&paths.notes_path)?;
        let retrieval = RetrievalService::open(
            provider,
            PathBuf::from(&paths.vectors_path),
            config.retrieval.clone(),
        );

        Ok(App {
            notes: Arc::new(notes),
            retrieval: Arc::new(retrieval),
            config,
        })
    }

    /// Assemble an app from pre-built parts, so tests can inject their
    /// own provider behind the retrieval service.
    #[cfg(test)]
    pub(crate) fn with_parts(
        notes: Arc<dyn NoteStore>,
        retrieval: Arc<RetrievalService>,
        config: Config,
    ) -> App {
        App {
            notes,
            retrieval,
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Retrieval service handle, for wiring up a live query controller.
    pub fn retrieval(&self) -> Arc<RetrievalService> {
        self.retrieval.clone()
    }

    pub fn indexed_count(&self) -> usize {
        self.retrieval.indexed_count()
    }

    /// Create a note. The draft is embedded before anything is persisted;
    /// a provider failure means no note is written.
    pub async fn create_note(&self, draft: NoteDraft) -> Result<Note, AppError> {
        validate_draft(&draft)?;

        let vector = self
            .retrieval
            .embed_note_text(&draft.title, &draft.content)
            .await?;
        let note = self.notes.create(draft)?;
        self.retrieval.upsert_vector(note.id, note.revision, vector)?;

        log::info!("Created note {} (\"{}\")", note.id, note.title);
        Ok(note)
    }

    /// Replace a note's title, content and tags.
    ///
    /// Updates are whole-document: the new vector is computed from the
    /// full draft, so the stored text and its embedding always describe
    /// the same revision even when updates race.
    pub async fn update_note(&self, id: u64, draft: NoteDraft) -> Result<Note, AppError> {
        validate_draft(&draft)?;

        // Cheap existence check so a missing id does not cost a provider
        // call; replace() re-checks under its own lock.
        if self.notes.get(id)?.is_none() {
            return Err(AppError::NotFound);
        }

        let vector = self
            .retrieval
            .embed_note_text(&draft.title, &draft.content)
            .await?;
        let note = self.notes.replace(id, draft)?.ok_or(AppError::NotFound)?;
        self.retrieval.upsert_vector(note.id, note.revision, vector)?;

        log::info!("Updated note {} to revision {}", note.id, note.revision);
        Ok(note)
    }

    /// Delete a note and its vector. By the time this returns, the note
    /// can no longer appear in any retrieval result.
    pub fn delete_note(&self, id: u64) -> Result<(), AppError> {
        if !self.notes.delete(id)? {
            return Err(AppError::NotFound);
        }
        self.retrieval.remove_note(id);

        log::info!("Deleted note {}", id);
        Ok(())
    }

    pub fn get_note(&self, id: u64) -> Result<Note, AppError> {
        self.notes.get(id)?.ok_or(AppError::NotFound)
    }

    pub fn list_notes(&self) -> Result<Vec<Note>, AppError> {
        Ok(self.notes.list()?)
    }

    pub async fn search(
        &self,
        query: &str,
        limit: Option<usize>,
    ) -> Result<Vec<ScoredNote>, AppError> {
        Ok(self.retrieval.search(query, limit).await?)
    }

    pub fn related_to(&self, id: u64, limit: Option<usize>) -> Result<Vec<ScoredNote>, AppError> {
        Ok(self.retrieval.related_to(id, limit)?)
    }

    pub async fn related_by_content(
        &self,
        content: &str,
        limit: Option<usize>,
    ) -> Result<Vec<ScoredNote>, AppError> {
        Ok(self.retrieval.related_by_content(content, limit).await?)
    }

    pub async fn check_duplicates(
        &self,
        title: &str,
        content: &str,
        exclude: Option<u64>,
    ) -> Result<Vec<ScoredNote>, AppError> {
        Ok(self.retrieval.check_duplicates(title, content, exclude).await?)
    }

    /// Join ranked results with their notes. Hits whose note vanished
    /// between ranking and the join are dropped.
    pub fn with_notes(&self, hits: Vec<ScoredNote>) -> Result<Vec<NoteHit>, AppError> {
        let mut joined = Vec::with_capacity(hits.len());
        for hit in hits {
            if let Some(note) = self.notes.get(hit.note_id)? {
                joined.push(NoteHit {
                    note,
                    score: hit.score,
                });
            }
        }
        Ok(joined)
    }

    /// Bring the vector index in line with the note store, then persist
    /// the snapshot.
    pub async fn reconcile(&self, force: bool) -> Result<ReconcileSummary, AppError> {
        let notes = self.notes.list()?;
        let summary = self.retrieval.reconcile(&notes, force).await?;
        log::info!(
            "Reconcile: {} embedded, {} removed, {} unchanged",
            summary.embedded,
            summary.removed,
            summary.unchanged
        );
        self.save_vectors()?;
        Ok(summary)
    }

    /// Persist the vector snapshot.
    pub fn save_vectors(&self) -> Result<(), AppError> {
        Ok(self.retrieval.save()?)
    }
}

fn validate_draft(draft: &NoteDraft) -> Result<(), AppError> {
    if draft.title.trim().is_empty() {
        return Err(AppError::InvalidInput("title must not be empty".to_string()));
    }
    if draft.content.trim().is_empty() {
        return Err(AppError::InvalidInput("content must not be empty".to_string()));
    }
    Ok(())
}
