use std::fs;
use std::path::{Path, PathBuf};

use tantivy::indexer::NoMergePolicy;
use tantivy::schema::Field;
use tantivy::index::SegmentId;
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy, Term};
use tracing::debug;

use ragidx_core::{Error, Result};

use crate::search::LexicalView;
use crate::tantivy_utils::{build_schema, fields, register_tokenizer};

const WRITER_MEMORY_BUDGET: usize = 50_000_000;
/// Past this many segments a commit folds them all into one.
const MAX_SEGMENTS: usize = 8;

/// Single writer over one tantivy index.
///
/// Mutations are invisible until [`LexicalStore::commit`], which returns a
/// fresh [`LexicalView`]. Views handed out earlier keep reading the state of
/// their own commit.
///
/// Merging is driven by the store, not by tantivy's background policy: every
/// commit folds away segments holding deleted entries, so BM25 statistics
/// only ever count live entries.
pub struct LexicalStore {
    index: Index,
    writer: IndexWriter,
    reader: IndexReader,
    id_field: Field,
    text_field: Field,
    dir: Option<PathBuf>,
}

impl LexicalStore {
    /// Create an empty index in `dir`, replacing whatever was there.
    pub fn create(dir: &Path) -> Result<Self> {
        if dir.exists() {
            fs::remove_dir_all(dir)?;
        }
        fs::create_dir_all(dir)?;
        let index = Index::create_in_dir(dir, build_schema()).map_err(Error::storage)?;
        Self::from_index(index, Some(dir.to_path_buf()))
    }

    /// Open an existing index. Anything unreadable is reported as `Corrupt`.
    pub fn open(dir: &Path) -> Result<Self> {
        if !dir.is_dir() {
            return Err(Error::Corrupt(format!("missing lexical index at {}", dir.display())));
        }
        let index =
            Index::open_in_dir(dir).map_err(|e| Error::Corrupt(format!("lexical index {}: {e}", dir.display())))?;
        let mut store = Self::from_index(index, Some(dir.to_path_buf())).map_err(|e| match e {
            Error::Corrupt(_) => e,
            other => Error::Corrupt(other.to_string()),
        })?;
        store.purge_deleted()?;
        Ok(store)
    }

    pub fn in_memory() -> Result<Self> {
        Self::from_index(Index::create_in_ram(build_schema()), None)
    }

    fn from_index(index: Index, dir: Option<PathBuf>) -> Result<Self> {
        register_tokenizer(&index);
        let (id_field, text_field) = fields(&index)?;
        let writer: IndexWriter = index.writer_with_num_threads(1, WRITER_MEMORY_BUDGET).map_err(Error::storage)?;
        writer.set_merge_policy(Box::new(NoMergePolicy));
        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()
            .map_err(Error::storage)?;
        Ok(Self { index, writer, reader, id_field, text_field, dir })
    }

    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    /// Stage `text` under `chunk_id`. Callers remove a previous entry for the id first.
    pub fn add(&mut self, chunk_id: &str, text: &str) -> Result<()> {
        self.writer
            .add_document(doc!(self.id_field => chunk_id, self.text_field => text))
            .map_err(Error::storage)?;
        Ok(())
    }

    pub fn remove(&mut self, chunk_id: &str) {
        self.writer.delete_term(Term::from_field_text(self.id_field, chunk_id));
    }

    /// Persist staged changes and return a view that includes them.
    pub fn commit(&mut self) -> Result<LexicalView> {
        let opstamp = self.writer.commit().map_err(Error::storage)?;
        self.reader.reload().map_err(Error::storage)?;
        self.purge_deleted()?;
        let view = self.view()?;
        debug!("Lexical commit {} ({} entries)", opstamp, view.len());
        Ok(view)
    }

    /// Merge away committed segments that still hold deleted entries.
    fn purge_deleted(&mut self) -> Result<()> {
        let searcher = self.reader.searcher();
        let segments = searcher.segment_readers();
        let targets: Vec<SegmentId> = if segments.len() > MAX_SEGMENTS {
            segments.iter().map(|s| s.segment_id()).collect()
        } else {
            segments.iter().filter(|s| s.num_deleted_docs() > 0).map(|s| s.segment_id()).collect()
        };
        if targets.is_empty() {
            return Ok(());
        }
        drop(searcher);
        self.writer.merge(&targets).wait().map_err(Error::storage)?;
        self.reader.reload().map_err(Error::storage)?;
        debug!("Merged {} lexical segment(s)", targets.len());
        Ok(())
    }

    /// Drop staged changes since the last commit.
    pub fn rollback(&mut self) -> Result<()> {
        self.writer.rollback().map_err(Error::storage)?;
        Ok(())
    }

    /// View of the last commit.
    pub fn view(&self) -> Result<LexicalView> {
        let analyzer = self.index.tokenizer_for_field(self.text_field).map_err(Error::storage)?;
        Ok(LexicalView::new(self.reader.searcher(), self.id_field, self.text_field, analyzer))
    }
}
