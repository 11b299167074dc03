//! Immutable, versioned pairing of vector and lexical state.

use std::collections::{BTreeMap, HashMap};
use std::ops::Deref;
use std::sync::{Arc, Condvar, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use tracing::debug;

use ragidx_core::types::{Chunk, ChunkId, DocumentRecord};
use ragidx_core::{Error, Result};
use ragidx_text::{LexicalStore, LexicalView};
use ragidx_vector::VectorStore;

/// One committed state of an index.
///
/// Built once by [`IndexSnapshot::build`] and never mutated. The manager
/// publishes snapshots behind an `Arc`; queries hold them through a
/// [`SnapshotGuard`]. Only the index name is kept, for logging.
pub struct IndexSnapshot {
    index: String,
    version: u64,
    created: DateTime<Utc>,
    documents: BTreeMap<String, DocumentRecord>,
    chunks: HashMap<ChunkId, Arc<Chunk>>,
    vectors: VectorStore,
    lexical: LexicalView,
}

impl IndexSnapshot {
    /// Fails with `Inconsistent` unless every document's chunks exist and
    /// `vectors == chunks == lexical entries`.
    pub fn build(
        index: impl Into<String>,
        version: u64,
        documents: BTreeMap<String, DocumentRecord>,
        chunks: HashMap<ChunkId, Arc<Chunk>>,
        vectors: VectorStore,
        lexical: LexicalView,
    ) -> Result<Self> {
        let index = index.into();
        let referenced: usize = documents.values().map(|d| d.chunk_ids.len()).sum();
        if referenced != chunks.len() {
            return Err(Error::Inconsistent(format!(
                "{index}: documents reference {referenced} chunks, {} present",
                chunks.len()
            )));
        }
        for doc in documents.values() {
            for id in &doc.chunk_ids {
                match chunks.get(id) {
                    Some(chunk) if chunk.path == doc.path => {}
                    _ => return Err(Error::Inconsistent(format!("{index}: {} lost chunk {id}", doc.path))),
                }
                if !vectors.contains(id) {
                    return Err(Error::Inconsistent(format!("{index}: chunk {id} has no vector")));
                }
            }
        }
        if vectors.len() != chunks.len() || lexical.len() != chunks.len() {
            return Err(Error::Inconsistent(format!(
                "{index}: {} chunks, {} vectors, {} lexical entries",
                chunks.len(),
                vectors.len(),
                lexical.len()
            )));
        }
        Ok(Self { index, version, created: Utc::now(), documents, chunks, vectors, lexical })
    }

    /// Version 0 with no documents, backed by a scratch lexical index.
    pub fn empty(index: impl Into<String>) -> Result<Self> {
        let lexical = LexicalStore::in_memory()?.view()?;
        Self::build(index, 0, BTreeMap::new(), HashMap::new(), VectorStore::new(), lexical)
    }

    pub fn index(&self) -> &str {
        &self.index
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn created(&self) -> DateTime<Utc> {
        self.created
    }

    pub fn documents(&self) -> &BTreeMap<String, DocumentRecord> {
        &self.documents
    }

    pub fn document(&self, path: &str) -> Option<&DocumentRecord> {
        self.documents.get(path)
    }

    pub fn chunks(&self) -> &HashMap<ChunkId, Arc<Chunk>> {
        &self.chunks
    }

    pub fn chunk(&self, id: &str) -> Option<&Chunk> {
        self.chunks.get(id).map(Arc::as_ref)
    }

    pub fn vectors(&self) -> &VectorStore {
        &self.vectors
    }

    pub fn lexical(&self) -> &LexicalView {
        &self.lexical
    }

    pub fn file_count(&self) -> usize {
        self.documents.len()
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }
}

impl Drop for IndexSnapshot {
    fn drop(&mut self) {
        debug!("Releasing snapshot v{} of index {}", self.version, self.index);
    }
}

/// Number of live [`SnapshotGuard`]s for one index.
///
/// Once closed, no new guard can be taken.
#[derive(Debug, Default)]
pub struct InFlight {
    state: Mutex<InFlightState>,
    idle: Condvar,
}

#[derive(Debug, Default)]
struct InFlightState {
    count: usize,
    closed: bool,
}

impl InFlight {
    pub fn count(&self) -> usize {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).count
    }

    /// Block until no guard is alive.
    pub fn wait_idle(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        while state.count > 0 {
            state = self.idle.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Refuse new guards, then block until the live ones are released.
    pub fn close_and_wait_idle(&self) {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).closed = true;
        self.wait_idle();
    }

    fn enter(&self) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.closed {
            return false;
        }
        state.count += 1;
        true
    }

    fn exit(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.count = state.count.saturating_sub(1);
        if state.count == 0 {
            self.idle.notify_all();
        }
    }
}

/// Scoped hold on a snapshot. Released on drop, including during unwinding.
pub struct SnapshotGuard {
    snapshot: Arc<IndexSnapshot>,
    in_flight: Arc<InFlight>,
}

impl SnapshotGuard {
    /// Fails with `NotFound` once the index has been closed for removal.
    pub fn acquire(snapshot: Arc<IndexSnapshot>, in_flight: Arc<InFlight>) -> Result<Self> {
        if !in_flight.enter() {
            return Err(Error::NotFound(format!("index '{}' is closed", snapshot.index)));
        }
        Ok(Self { snapshot, in_flight })
    }

    pub fn snapshot(&self) -> &Arc<IndexSnapshot> {
        &self.snapshot
    }

    pub fn release(self) {}
}

impl Deref for SnapshotGuard {
    type Target = IndexSnapshot;

    fn deref(&self) -> &IndexSnapshot {
        &self.snapshot
    }
}

impl Drop for SnapshotGuard {
    fn drop(&mut self) {
        self.in_flight.exit();
    }
}
