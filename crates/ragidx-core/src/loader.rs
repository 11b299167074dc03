//! Filesystem document loader and the include/exclude filter shared with the watcher.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use globset::{Glob, GlobSet, GlobSetBuilder};
use tracing::{debug, warn};

use crate::config::IndexConfig;
use crate::error::{Error, Result};
use crate::traits::DocumentLoader;
use crate::types::FileEntry;

/// Decides which files under an index root belong to the index.
///
/// Exclusion patterns are globs matched against the `/`-separated path
/// relative to the root. A pattern ending in `/` names a directory: any path
/// with a matching directory component is excluded.
#[derive(Debug, Clone)]
pub struct FileFilter {
    extensions: HashSet<String>,
    paths: GlobSet,
    dirs: GlobSet,
}

impl FileFilter {
    pub fn new<S: AsRef<str>>(file_types: &[S], exclude_patterns: &[S]) -> Result<Self> {
        let extensions = file_types
            .iter()
            .map(|t| t.as_ref().trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|t| !t.is_empty())
            .collect();

        let mut paths = GlobSetBuilder::new();
        let mut dirs = GlobSetBuilder::new();
        for pattern in exclude_patterns {
            let pattern = pattern.as_ref();
            let glob = |p: &str| Glob::new(p).map_err(|e| Error::InvalidConfig(format!("bad exclude pattern '{p}': {e}")));
            if let Some(dir) = pattern.strip_suffix('/') {
                dirs.add(glob(dir)?);
            } else {
                paths.add(glob(pattern)?);
            }
        }
        let build = |b: GlobSetBuilder| b.build().map_err(|e| Error::InvalidConfig(e.to_string()));
        Ok(Self { extensions, paths: build(paths)?, dirs: build(dirs)? })
    }

    pub fn for_index(config: &IndexConfig) -> Result<Self> {
        Self::new(&config.file_types, &config.exclude_patterns)
    }

    /// Accept-all filter.
    pub fn any() -> Self {
        Self { extensions: HashSet::new(), paths: GlobSet::empty(), dirs: GlobSet::empty() }
    }

    pub fn accepts_extension(&self, path: &Path) -> bool {
        if self.extensions.is_empty() {
            return true;
        }
        path.extension()
            .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
            .is_some_and(|ext| self.extensions.contains(&ext))
    }

    /// `relative` is the `/`-separated path below the root.
    pub fn is_excluded(&self, relative: &str) -> bool {
        if self.paths.is_match(relative) {
            return true;
        }
        if self.dirs.is_empty() {
            return false;
        }
        // Every component but the last is a directory.
        let mut components: Vec<&str> = relative.split('/').collect();
        components.pop();
        components.iter().any(|c| self.dirs.is_match(c))
    }

    fn is_excluded_dir(&self, relative: &str) -> bool {
        self.paths.is_match(relative) || relative.split('/').any(|c| self.dirs.is_match(c))
    }

    /// Whether an absolute `path` under `root` would be indexed.
    pub fn matches(&self, root: &Path, path: &Path) -> bool {
        match path.strip_prefix(root) {
            Ok(rel) => {
                let rel = relative_string(rel);
                !rel.is_empty() && self.accepts_extension(path) && !self.is_excluded(&rel)
            }
            Err(_) => false,
        }
    }
}

pub fn relative_string(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Reads documents straight from disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsLoader;

impl FsLoader {
    pub fn new() -> Self {
        Self
    }
}

impl DocumentLoader for FsLoader {
    fn scan(&self, root: &Path, filter: &FileFilter) -> Result<Vec<FileEntry>> {
        if !root.is_dir() {
            return Err(Error::NotFound(format!("index root {}", root.display())));
        }
        let mut entries = Vec::new();
        let walker = walkdir::WalkDir::new(root).follow_links(false).into_iter().filter_entry(|e| {
            if e.depth() == 0 || !e.file_type().is_dir() {
                return true;
            }
            let rel = e.path().strip_prefix(root).map(relative_string).unwrap_or_default();
            !filter.is_excluded_dir(&rel)
        });
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    warn!("Skipping unreadable entry under {}: {}", root.display(), err);
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let relative = match path.strip_prefix(root) {
                Ok(rel) => relative_string(rel),
                Err(_) => continue,
            };
            if !filter.accepts_extension(path) || filter.is_excluded(&relative) {
                continue;
            }
            let metadata = match entry.metadata() {
                Ok(m) => m,
                Err(err) => {
                    // Vanished between listing and stat.
                    warn!("Skipping {}: {}", path.display(), err);
                    continue;
                }
            };
            let modified = metadata.modified().map(DateTime::<Utc>::from).unwrap_or_else(|_| Utc::now());
            entries.push(FileEntry { path: path.to_path_buf(), relative, modified, size: metadata.len() });
        }
        entries.sort_by(|a, b| a.relative.cmp(&b.relative));
        debug!("Scanned {} files under {}", entries.len(), root.display());
        Ok(entries)
    }

    fn load(&self, path: &Path) -> Result<String> {
        let bytes = fs::read(path).map_err(|source| Error::Read { path: path.to_path_buf(), source })?;
        match String::from_utf8(bytes) {
            Ok(text) => Ok(text),
            Err(err) => Ok(String::from_utf8_lossy(err.as_bytes()).into_owned()),
        }
    }
}
