//! ragidx-core
//!
//! Shared vocabulary of the workspace: error taxonomy, figment-backed
//! settings, domain types, collaborator traits, the chunker and the
//! filesystem loader.
#![deny(warnings)]
#![deny(dead_code)]
#![deny(unused_variables)]
#![deny(unused_imports)]

pub mod chunker;
pub mod config;
pub mod error;
pub mod fsutil;
pub mod loader;
pub mod traits;
pub mod types;

pub use chunker::{chunk_id, hash_content, Chunker, Span};
pub use config::{Config, HybridWeights, IndexConfig, RetryPolicy, Settings};
pub use error::{Error, Result};
pub use loader::{FileFilter, FsLoader};
pub use traits::{DocumentLoader, Embedder};
pub use types::{
    CancelFlag, ChangeEvent, ChangeKind, Chunk, ChunkId, DocumentRecord, FileEntry, IndexInfo, QueryRequest, QueryResponse,
    QueryResult, RefreshReport, SearchHit, SourceKind,
};
