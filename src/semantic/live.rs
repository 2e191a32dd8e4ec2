//! Debounced live retrieval for related-as-you-type.
//!
//! Every text change (re)arms a debounce timer and supersedes whatever was
//! in flight; only the newest draft when a timer fires reaches the
//! provider. Updates carry a monotonically increasing sequence number and
//! delivery is last-writer-wins: once an update for sequence N goes out,
//! nothing older than N ever will.
//!
//! Cancellation of superseded tasks is best effort. Correctness does not
//! depend on an abort landing, because every task re-checks the current
//! sequence before delivering and the delivery gate drops stale updates.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::semantic::ranker::ScoredNote;
use crate::semantic::service::RetrievalService;

/// What a fired live query produced.
#[derive(Debug, Clone)]
pub enum LiveOutcome {
    /// Related notes for the draft, possibly empty
    Results(Vec<ScoredNote>),
    /// The query ran and failed; the draft itself is fine
    Failed(String),
}

/// One delivered update. `seq` identifies which text change it answers.
#[derive(Debug, Clone)]
pub struct LiveUpdate {
    pub seq: u64,
    pub outcome: LiveOutcome,
}

/// Serializes the deliver-or-drop decision with the send itself, so two
/// tasks racing past their sequence checks still deliver in order.
struct DeliveryGate {
    last_delivered: Mutex<u64>,
    tx: mpsc::UnboundedSender<LiveUpdate>,
}

impl DeliveryGate {
    fn deliver(&self, update: LiveUpdate) {
        let mut last = self
            .last_delivered
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        if update.seq > *last {
            *last = update.seq;
            // Receiver may already be gone during shutdown
            let _ = self.tx.send(update);
        }
    }
}

/// Controller for live related-note queries.
///
/// Feed it text changes with [`LiveQueryController::text_changed`] and read
/// updates from the receiver returned by [`LiveQueryController::new`].
/// Methods must be called from within a Tokio runtime.
pub struct LiveQueryController {
    service: Arc<RetrievalService>,
    debounce: Duration,
    seq: Arc<AtomicU64>,
    gate: Arc<DeliveryGate>,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl LiveQueryController {
    pub fn new(
        service: Arc<RetrievalService>,
        debounce: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<LiveUpdate>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let controller = Self {
            service,
            debounce,
            seq: Arc::new(AtomicU64::new(0)),
            gate: Arc::new(DeliveryGate {
                last_delivered: Mutex::new(0),
                tx,
            }),
            pending: Mutex::new(None),
        };
        (controller, rx)
    }

    /// Record a draft text change.
    ///
    /// Starts a fresh debounce window, supersedes any in-flight query and
    /// returns the sequence number assigned to this change. If no newer
    /// change arrives within the window, this draft is embedded and its
    /// related notes are delivered under that sequence number.
    pub fn text_changed(&self, content: String) -> u64 {
        let seq = self.seq.fetch_add(1, Ordering::SeqCst) + 1;

        let service = self.service.clone();
        let latest = self.seq.clone();
        let gate = self.gate.clone();
        let debounce = self.debounce;

        let handle = tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            if latest.load(Ordering::SeqCst) != seq {
                // Superseded while waiting out the debounce window
                return;
            }

            let outcome = match service.related_by_content(&content, None).await {
                Ok(results) => LiveOutcome::Results(results),
                Err(err) => {
                    log::warn!("Live query {} failed: {}", seq, err);
                    LiveOutcome::Failed(err.to_string())
                }
            };

            if latest.load(Ordering::SeqCst) != seq {
                // Superseded while the provider call was in flight
                return;
            }
            gate.deliver(LiveUpdate { seq, outcome });
        });

        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = pending.replace(handle) {
            previous.abort();
        }

        seq
    }

    /// Sequence number of the newest recorded text change.
    pub fn current_seq(&self) -> u64 {
        self.seq.load(Ordering::SeqCst)
    }

    /// Abort the pending query, if any.
    pub fn close(&self) {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(handle) = pending.take() {
            handle.abort();
        }
    }
}

impl Drop for LiveQueryController {
    fn drop(&mut self) {
        self.close();
    }
}
