//! Domain types shared by the lexical, vector and index crates.

use std::cmp::Ordering;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::HybridWeights;

pub type ChunkId = String;

/// A bounded span of a document, the unit of both vector and lexical indexing.
///
/// - `id`: derived from `path`, `start` and the hash of `text`, so unchanged
///   content keeps its id across refreshes
/// - `path`: owning document, relative to the index root
/// - `start`/`end`: character offsets into the document text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub path: String,
    pub text: String,
    pub start: usize,
    pub end: usize,
}

/// What the index knows about one source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub path: String,
    pub content_hash: String,
    pub modified: DateTime<Utc>,
    pub size: u64,
    pub chunk_ids: Vec<ChunkId>,
}

/// A file found by a scan, before it is read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub path: PathBuf,
    pub relative: String,
    pub modified: DateTime<Utc>,
    pub size: u64,
}

/// Indicates which engine produced a result.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SourceKind {
    Vector,
    Text,
}

/// The minimal surface returned by both retrieval legs.
///
/// `score` is engine-specific but higher is always better.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchHit {
    pub id: ChunkId,
    pub score: f32,
    pub source: SourceKind,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueryResult {
    pub chunk_id: ChunkId,
    pub file_path: String,
    pub text: String,
    pub start: usize,
    pub end: usize,
    pub score: f32,
}

impl QueryResult {
    /// Score descending, then file path, start offset and chunk id ascending.
    pub fn rank_cmp(&self, other: &Self) -> Ordering {
        other
            .score
            .total_cmp(&self.score)
            .then_with(|| self.file_path.cmp(&other.file_path))
            .then_with(|| self.start.cmp(&other.start))
            .then_with(|| self.chunk_id.cmp(&other.chunk_id))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    pub text: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default)]
    pub min_score: f32,
    /// Falls back to the index's configured weights.
    #[serde(default)]
    pub weights: Option<HybridWeights>,
}

fn default_top_k() -> usize {
    5
}

impl QueryRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into(), top_k: default_top_k(), min_score: 0.0, weights: None }
    }

    #[must_use]
    pub fn top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    #[must_use]
    pub fn min_score(mut self, min_score: f32) -> Self {
        self.min_score = min_score;
        self
    }

    #[must_use]
    pub fn weights(mut self, weights: HybridWeights) -> Self {
        self.weights = Some(weights);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub results: Vec<QueryResult>,
    /// Set when the semantic leg was skipped because the provider failed.
    pub degraded: bool,
    pub snapshot_version: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RefreshReport {
    pub added: usize,
    pub updated: usize,
    pub removed: usize,
    pub unchanged: usize,
    pub failed: usize,
    /// Files in the current snapshot after the refresh.
    pub total: usize,
    pub chunks: usize,
    pub version: u64,
    pub failed_files: Vec<String>,
    pub swapped: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexInfo {
    pub name: String,
    pub root: PathBuf,
    pub version: u64,
    pub file_count: usize,
    pub chunk_count: usize,
    pub vector_count: usize,
    pub lexical_count: usize,
    pub dimension: Option<usize>,
    pub disk_size_bytes: u64,
    pub last_refresh: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeKind {
    Added,
    Modified,
    Removed,
}

/// A single notification from a change source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub path: PathBuf,
    pub kind: ChangeKind,
}

/// Shared cancellation request, checked by long operations at safe points.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, AtomicOrdering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(AtomicOrdering::SeqCst)
    }

    pub fn reset(&self) {
        self.0.store(false, AtomicOrdering::SeqCst);
    }
}
