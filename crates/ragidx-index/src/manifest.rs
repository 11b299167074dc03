//! On-disk layout of one index and the document manifest.
//!
//! ```text
//! <storage_root>/<name>/
//!     config.json     IndexConfig the state was built with
//!     manifest.json   version, provider id, document records and chunks
//!     vectors.json    VectorStore
//!     lexical/        tantivy index
//! ```

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ragidx_core::config::IndexConfig;
use ragidx_core::fsutil;
use ragidx_core::types::{Chunk, DocumentRecord};
use ragidx_core::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexPaths {
    dir: PathBuf,
}

impl IndexPaths {
    pub fn new(storage_root: &Path, name: &str) -> Self {
        Self { dir: storage_root.join(name) }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn config(&self) -> PathBuf {
        self.dir.join("config.json")
    }

    pub fn manifest(&self) -> PathBuf {
        self.dir.join("manifest.json")
    }

    pub fn vectors(&self) -> PathBuf {
        self.dir.join("vectors.json")
    }

    pub fn lexical(&self) -> PathBuf {
        self.dir.join("lexical")
    }
}

pub fn save_config(paths: &IndexPaths, config: &IndexConfig) -> Result<()> {
    fsutil::write_json(&paths.config(), config)
}

pub fn load_config(paths: &IndexPaths) -> Result<IndexConfig> {
    fsutil::read_json(&paths.config())
}

/// Diff baseline persisted after each refresh: enough to rebuild a snapshot
/// on restart without calling the embedding provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub version: u64,
    /// Id of the provider that produced the stored vectors.
    pub embedder: String,
    pub updated: DateTime<Utc>,
    pub documents: Vec<DocumentRecord>,
    pub chunks: Vec<Chunk>,
}

impl Manifest {
    pub fn save(&self, paths: &IndexPaths) -> Result<()> {
        fsutil::write_json(&paths.manifest(), self)
    }

    pub fn load(paths: &IndexPaths) -> Result<Self> {
        fsutil::read_json(&paths.manifest())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragidx_core::Error;

    #[test]
    fn config_and_manifest_round_trip() {
        let tmp = tempfile::tempdir().expect("tmp");
        let paths = IndexPaths::new(tmp.path(), "docs");
        let config = IndexConfig::new("docs", "/srv/docs").chunking(100, 10).file_types([".md"]);
        save_config(&paths, &config).expect("save config");
        assert_eq!(load_config(&paths).expect("load config"), config);

        let manifest = Manifest {
            version: 4,
            embedder: "fake:8".into(),
            updated: Utc::now(),
            documents: vec![DocumentRecord {
                path: "a.md".into(),
                content_hash: "abc".into(),
                modified: Utc::now(),
                size: 3,
                chunk_ids: vec!["c1".into()],
            }],
            chunks: vec![Chunk { id: "c1".into(), path: "a.md".into(), text: "abc".into(), start: 0, end: 3 }],
        };
        manifest.save(&paths).expect("save manifest");
        let loaded = Manifest::load(&paths).expect("load manifest");
        assert_eq!(loaded.version, 4);
        assert_eq!(loaded.documents, manifest.documents);
        assert_eq!(loaded.chunks, manifest.chunks);
        assert_eq!(paths.dir(), tmp.path().join("docs"));
    }

    #[test]
    fn missing_manifest_is_corrupt() {
        let tmp = tempfile::tempdir().expect("tmp");
        let paths = IndexPaths::new(tmp.path(), "docs");
        assert!(matches!(Manifest::load(&paths), Err(Error::Corrupt(_))));
    }
}
