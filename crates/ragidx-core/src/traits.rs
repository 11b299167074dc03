use std::path::Path;

use crate::error::Result;
use crate::loader::FileFilter;
use crate::types::FileEntry;

/// Converts text into fixed-length vectors.
///
/// Implementations fail with `Error::ProviderUnavailable` when the provider
/// cannot be reached and `Error::Provider` when it answers badly. The vector
/// dimension is whatever the provider returns; the vector store pins it on
/// first use.
pub trait Embedder: Send + Sync {
    /// Stable identifier for the provider/model (e.g. `ollama:nomic-embed-text`).
    fn id(&self) -> &str;
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Lists and reads source documents for an index.
pub trait DocumentLoader: Send + Sync {
    fn scan(&self, root: &Path, filter: &FileFilter) -> Result<Vec<FileEntry>>;
    /// Fails with `Error::Read` when the file is gone or unreadable.
    fn load(&self, path: &Path) -> Result<String>;
}
