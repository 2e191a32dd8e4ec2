use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashSet,
    hash::Hash,
    sync::{Arc, RwLock},
};

#[derive(Debug, Clone, Eq, Default, Serialize, Deserialize)]
pub struct Note {
    pub id: u64,

    pub title: String,
    pub content: String,
    pub tags: Vec<String>,

    /// Bumped on every write; doubles as the index version for this note's
    /// embedding so stale re-embeds can be detected.
    pub revision: u64,

    /// Unix milliseconds
    pub created_at: u64,
    /// Unix milliseconds
    pub updated_at: u64,
}

impl Hash for Note {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state)
    }
}

impl PartialEq for Note {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

/// Full document for a create or replace operation.
///
/// Updates are whole-document: the draft becomes the note's new title,
/// content and tags in one write, so the text that was embedded always
/// matches the text that was stored at that revision.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct NoteDraft {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

pub trait NoteStore: Send + Sync {
    fn create(&self, draft: NoteDraft) -> anyhow::Result<Note>;
    /// Replace the whole document, bumping the revision. `None` if the id
    /// does not exist.
    fn replace(&self, id: u64, draft: NoteDraft) -> anyhow::Result<Option<Note>>;
    fn get(&self, id: u64) -> anyhow::Result<Option<Note>>;
    /// Returns whether a note was actually removed.
    fn delete(&self, id: u64) -> anyhow::Result<bool>;
    fn list(&self) -> anyhow::Result<Vec<Note>>;
}

pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

fn dedup_tags(tags: &mut Vec<String>) {
    let mut seen = HashSet::new();
    tags.retain(|item| seen.insert(item.clone()));
}

/// On-disk layout of notes.json. `next_id` is persisted so deleted ids are
/// never reused.
#[derive(Debug, Default, Serialize, Deserialize)]
struct NotesFile {
    next_id: u64,
    notes: Vec<Note>,
}

#[derive(Debug, Clone, Default)]
pub struct BackendJson {
    state: Arc<RwLock<NotesFile>>,
    path: String,
}

impl BackendJson {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let state = match std::fs::read(path) {
            Ok(data) => serde_json::from_slice::<NotesFile>(&data)
                .with_context(|| format!("notes database at {path} is malformed"))?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                log::info!("Creating new notes database at {path}");
                NotesFile {
                    next_id: 1,
                    notes: vec![],
                }
            }
            Err(err) => return Err(err).with_context(|| format!("could not read {path}")),
        };

        let store = BackendJson {
            state: Arc::new(RwLock::new(state)),
            path: path.to_string(),
        };
        store.save()?;

        Ok(store)
    }

    fn save(&self) -> anyhow::Result<()> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());

        let data = serde_json::to_vec_pretty(&*state)?;
        let temp_path = format!("{}.tmp", &self.path);
        std::fs::write(&temp_path, data)
            .with_context(|| format!("could not write {temp_path}"))?;
        std::fs::rename(&temp_path, &self.path)
            .with_context(|| format!("could not replace {}", self.path))?;

        Ok(())
    }
}

impl NoteStore for BackendJson {
    fn create(&self, draft: NoteDraft) -> anyhow::Result<Note> {
        let mut draft = draft;
        dedup_tags(&mut draft.tags);

        let note = {
            let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());

            let id = state.next_id;
            state.next_id += 1;

            let now = now_millis();
            let note = Note {
                id,
                title: draft.title,
                content: draft.content,
                tags: draft.tags,
                revision: 1,
                created_at: now,
                updated_at: now,
            };
            state.notes.push(note.clone());
            note
        };

        self.save()?;

        Ok(note)
    }

    fn replace(&self, id: u64, draft: NoteDraft) -> anyhow::Result<Option<Note>> {
        let mut draft = draft;
        dedup_tags(&mut draft.tags);

        let updated = {
            let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());

            let Some(note) = state.notes.iter_mut().find(|n| n.id == id) else {
                return Ok(None);
            };

            note.title = draft.title;
            note.content = draft.content;
            note.tags = draft.tags;
            note.revision += 1;
            note.updated_at = now_millis();

            note.clone()
        };

        self.save()?;

        Ok(Some(updated))
    }

    fn get(&self, id: u64) -> anyhow::Result<Option<Note>> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        Ok(state.notes.iter().find(|n| n.id == id).cloned())
    }

    fn delete(&self, id: u64) -> anyhow::Result<bool> {
        let removed = {
            let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
            let before = state.notes.len();
            state.notes.retain(|n| n.id != id);
            state.notes.len() != before
        };

        if removed {
            self.save()?;
        }

        Ok(removed)
    }

    fn list(&self) -> anyhow::Result<Vec<Note>> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        Ok(state.notes.clone())
    }
}
