use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use ragidx_core::fsutil;
use ragidx_core::types::{ChunkId, SearchHit, SourceKind};
use ragidx_core::{Error, Result};

use crate::similarity::unit_similarity;

/// Exact-scan vector store keyed by chunk id.
///
/// A value type: cloning shares the vectors, so a refresh can clone the
/// current store, apply its changes and publish the result while readers
/// keep the old one.
#[derive(Debug, Clone, Default)]
pub struct VectorStore {
    vectors: HashMap<ChunkId, Arc<[f32]>>,
    dimension: Option<usize>,
}

#[derive(Serialize, Deserialize)]
struct VectorFile {
    dimension: Option<usize>,
    vectors: BTreeMap<ChunkId, Vec<f32>>,
}

impl VectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `vector` under `chunk_id`, replacing any previous one.
    ///
    /// The first vector fixes the dimension of the store.
    pub fn add(&mut self, chunk_id: impl Into<ChunkId>, vector: impl Into<Arc<[f32]>>) -> Result<()> {
        let vector = vector.into();
        match self.dimension {
            Some(expected) if expected != vector.len() => {
                return Err(Error::DimensionMismatch { expected, actual: vector.len() });
            }
            Some(_) => {}
            None => self.dimension = Some(vector.len()),
        }
        self.vectors.insert(chunk_id.into(), vector);
        Ok(())
    }

    pub fn remove(&mut self, chunk_id: &str) -> bool {
        self.vectors.remove(chunk_id).is_some()
    }

    pub fn get(&self, chunk_id: &str) -> Option<&Arc<[f32]>> {
        self.vectors.get(chunk_id)
    }

    pub fn contains(&self, chunk_id: &str) -> bool {
        self.vectors.contains_key(chunk_id)
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    /// Top `k` entries by similarity to `query`, scores in [0, 1], ties broken by id.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        let Some(expected) = self.dimension else {
            return Ok(Vec::new());
        };
        if query.len() != expected {
            return Err(Error::DimensionMismatch { expected, actual: query.len() });
        }
        if k == 0 || self.vectors.is_empty() {
            return Ok(Vec::new());
        }
        let mut hits: Vec<SearchHit> = self
            .vectors
            .iter()
            .map(|(id, vector)| SearchHit { id: id.clone(), score: unit_similarity(query, vector), source: SourceKind::Vector })
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
        hits.truncate(k);
        Ok(hits)
    }

    pub fn persist(&self, path: &Path) -> Result<()> {
        let file = VectorFile {
            dimension: self.dimension,
            vectors: self.vectors.iter().map(|(id, v)| (id.clone(), v.to_vec())).collect(),
        };
        fsutil::write_json(path, &file)?;
        debug!("Persisted {} vectors to {}", self.vectors.len(), path.display());
        Ok(())
    }

    /// Load a store written by [`VectorStore::persist`]. Unreadable files and
    /// vectors that disagree with the recorded dimension are `Corrupt`.
    pub fn load(path: &Path) -> Result<Self> {
        let file: VectorFile = fsutil::read_json(path)?;
        match file.dimension {
            None if !file.vectors.is_empty() => {
                return Err(Error::Corrupt(format!("{}: vectors without a dimension", path.display())));
            }
            Some(dim) => {
                if let Some((id, v)) = file.vectors.iter().find(|(_, v)| v.len() != dim) {
                    return Err(Error::Corrupt(format!(
                        "{}: vector {id} has {} components, expected {dim}",
                        path.display(),
                        v.len()
                    )));
                }
            }
            None => {}
        }
        let vectors = file.vectors.into_iter().map(|(id, v)| (id, Arc::from(v))).collect();
        Ok(Self { vectors, dimension: file.dimension })
    }
}
