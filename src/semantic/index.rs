//! In-memory vector index.
//!
//! Stores note embeddings keyed by note id. The index is the authoritative
//! `note_id -> embedding` mapping while the process runs; ranking happens in
//! [`crate::semantic::ranker`] over snapshots taken from here.
//!
//! Entries live in lock-striped shards so writers touching different notes
//! do not contend, and queries clone entries out instead of ranking under a
//! lock. Every entry carries the note revision its vector was computed from,
//! and writes are version-guarded: an upsert with an older revision than the
//! stored one is dropped, so delayed writes can never clobber newer vectors.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Number of lock stripes.
const SHARD_COUNT: usize = 16;

/// An entry in the vector index.
#[derive(Debug, Clone)]
pub struct EmbeddingRecord {
    /// Revision of the note this vector was computed from
    pub version: u64,
    /// The embedding, Arc-shared so snapshots do not copy vector data
    pub vector: Arc<Vec<f32>>,
}

/// What a version-guarded upsert did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// No entry existed for this note; the vector was stored
    Inserted,
    /// An older entry existed; the vector replaced it
    Updated,
    /// An entry with the same version existed; nothing changed
    Unchanged,
    /// A newer entry existed; the write was dropped
    Stale,
}

/// In-memory vector index for semantic retrieval.
///
/// All methods take `&self`; synchronization is internal per shard.
pub struct VectorIndex {
    shards: Vec<RwLock<HashMap<u64, EmbeddingRecord>>>,
    /// Expected embedding dimensions
    dimensions: usize,
}

impl VectorIndex {
    /// Create a new empty vector index with specified dimensions.
    pub fn new(dimensions: usize) -> Self {
        let shards = (0..SHARD_COUNT).map(|_| RwLock::new(HashMap::new())).collect();
        Self { shards, dimensions }
    }

    fn shard(&self, id: u64) -> &RwLock<HashMap<u64, EmbeddingRecord>> {
        &self.shards[(id as usize) % SHARD_COUNT]
    }

    /// Get the expected embedding dimensions.
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Get the number of entries in the index.
    pub fn len(&self) -> usize {
        self.shards
            .iter()
            .map(|s| s.read().unwrap_or_else(|e| e.into_inner()).len())
            .sum()
    }

    /// Check if the index is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Insert or update an entry, guarded by version.
    ///
    /// The entry is replaced only when `version` is newer than what is
    /// stored. An equal version is a no-op ([`UpsertOutcome::Unchanged`]),
    /// an older one is dropped ([`UpsertOutcome::Stale`]). Zero vectors are
    /// accepted; the ranker sorts them last.
    pub fn upsert(&self, id: u64, version: u64, vector: Vec<f32>) -> Result<UpsertOutcome, IndexError> {
        if vector.len() != self.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                got: vector.len(),
            });
        }

        // Validation and allocation happen before the lock; a rejected
        // write never touches the shard.
        let record = EmbeddingRecord {
            version,
            vector: Arc::new(vector),
        };

        let mut shard = self.shard(id).write().unwrap_or_else(|e| e.into_inner());
        match shard.get(&id) {
            Some(existing) if existing.version > version => Ok(UpsertOutcome::Stale),
            Some(existing) if existing.version == version => Ok(UpsertOutcome::Unchanged),
            Some(_) => {
                shard.insert(id, record);
                Ok(UpsertOutcome::Updated)
            }
            None => {
                shard.insert(id, record);
                Ok(UpsertOutcome::Inserted)
            }
        }
    }

    /// Remove an entry by note ID. Returns whether an entry was present.
    pub fn delete(&self, id: u64) -> bool {
        let mut shard = self.shard(id).write().unwrap_or_else(|e| e.into_inner());
        shard.remove(&id).is_some()
    }

    /// Get an entry by note ID.
    pub fn get(&self, id: u64) -> Option<EmbeddingRecord> {
        let shard = self.shard(id).read().unwrap_or_else(|e| e.into_inner());
        shard.get(&id).cloned()
    }

    /// Check if an entry exists for the given ID.
    pub fn contains(&self, id: u64) -> bool {
        let shard = self.shard(id).read().unwrap_or_else(|e| e.into_inner());
        shard.contains_key(&id)
    }

    /// Get all note IDs in the index.
    pub fn ids(&self) -> Vec<u64> {
        self.shards
            .iter()
            .flat_map(|s| {
                s.read()
                    .unwrap_or_else(|e| e.into_inner())
                    .keys()
                    .copied()
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    /// Clone out all entries, shard by shard.
    ///
    /// Vectors are Arc-shared, so this copies ids and versions rather than
    /// vector data. The snapshot is not a point-in-time cut across shards;
    /// a write racing the walk may or may not appear, which is fine for
    /// ranking since the caller observes either the old or the new entry.
    pub fn snapshot(&self) -> Vec<(u64, EmbeddingRecord)> {
        let mut entries = Vec::with_capacity(self.len());
        for shard in &self.shards {
            let shard = shard.read().unwrap_or_else(|e| e.into_inner());
            entries.extend(shard.iter().map(|(id, record)| (*id, record.clone())));
        }
        entries
    }

    /// Clear all entries from the index.
    pub fn clear(&self) {
        for shard in &self.shards {
            shard.write().unwrap_or_else(|e| e.into_inner()).clear();
        }
    }
}

/// Errors that can occur during index operations.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
}
