//! Semantic retrieval core.
//!
//! Turns notes into vectors, keeps the authoritative `note_id -> embedding`
//! mapping, and answers similarity queries over it.
//!
//! # Architecture
//!
//! - `preprocess`: composes note title and content into embedding input
//! - `index`: sharded in-memory vector index with versioned upserts
//! - `ranker`: cosine ranking over index snapshots
//! - `storage`: binary file I/O for vectors.bin persistence
//! - `service`: the retrieval operations (search, related, duplicates)
//! - `live`: debounced, cancellable related-as-you-type queries

mod index;
mod live;
mod preprocess;
mod ranker;
mod service;
mod storage;

pub use index::{EmbeddingRecord, IndexError, UpsertOutcome, VectorIndex};
pub use live::{LiveOutcome, LiveQueryController, LiveUpdate};
pub use preprocess::compose_text;
pub use ranker::ScoredNote;
pub use service::{ReconcileSummary, RetrievalError, RetrievalService};
pub use storage::{provider_fingerprint, VectorStorage, VectorStorageError};
