#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use ragidx_core::config::RetryPolicy;
use ragidx_core::types::FileEntry;
use ragidx_core::{DocumentLoader, Embedder, Error, FileFilter, FsLoader, IndexConfig, Result};
use ragidx_embed::FakeEmbedder;
use ragidx_index::{IndexManager, ManagerSettings};

/// Fake provider with call counting and switchable failures.
pub struct TestEmbedder {
    small: FakeEmbedder,
    large: FakeEmbedder,
    pub calls: AtomicUsize,
    pub down: AtomicBool,
    pub use_large: AtomicBool,
    poison: Mutex<Option<String>>,
    delay: Mutex<Duration>,
}

impl TestEmbedder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            small: FakeEmbedder::new(32).expect("embedder"),
            large: FakeEmbedder::new(48).expect("embedder"),
            calls: AtomicUsize::new(0),
            down: AtomicBool::new(false),
            use_large: AtomicBool::new(false),
            poison: Mutex::new(None),
            delay: Mutex::new(Duration::ZERO),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    /// Fail every batch containing `marker`.
    pub fn poison(&self, marker: &str) {
        *self.poison.lock().expect("lock") = Some(marker.to_string());
    }

    pub fn clear_poison(&self) {
        *self.poison.lock().expect("lock") = None;
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().expect("lock") = delay;
    }
}

impl Embedder for TestEmbedder {
    fn id(&self) -> &str {
        self.small.id()
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().expect("lock");
        if !delay.is_zero() {
            thread::sleep(delay);
        }
        if self.down.load(Ordering::SeqCst) {
            return Err(Error::ProviderUnavailable("provider is down".into()));
        }
        if let Some(marker) = self.poison.lock().expect("lock").as_deref() {
            if texts.iter().any(|t| t.contains(marker)) {
                return Err(Error::Provider("provider rejected the batch".into()));
            }
        }
        if self.use_large.load(Ordering::SeqCst) {
            self.large.embed_batch(texts)
        } else {
            self.small.embed_batch(texts)
        }
    }
}

/// Filesystem loader that fails to read one relative path.
pub struct FlakyLoader {
    inner: FsLoader,
    pub unreadable: Mutex<Option<String>>,
}

impl FlakyLoader {
    pub fn new() -> Arc<Self> {
        Arc::new(Self { inner: FsLoader::new(), unreadable: Mutex::new(None) })
    }
}

impl DocumentLoader for FlakyLoader {
    fn scan(&self, root: &Path, filter: &FileFilter) -> Result<Vec<FileEntry>> {
        self.inner.scan(root, filter)
    }

    fn load(&self, path: &Path) -> Result<String> {
        if let Some(name) = self.unreadable.lock().expect("lock").as_deref() {
            if path.ends_with(name) {
                return Err(Error::Read {
                    path: path.to_path_buf(),
                    source: std::io::Error::new(std::io::ErrorKind::NotFound, "vanished"),
                });
            }
        }
        self.inner.load(path)
    }
}

pub struct Fixture {
    pub tmp: tempfile::TempDir,
    pub root: PathBuf,
    pub storage: PathBuf,
}

impl Fixture {
    pub fn new(files: &[(&str, &str)]) -> Self {
        let tmp = tempfile::tempdir().expect("tmp");
        let root = tmp.path().join("docs");
        let storage = tmp.path().join("storage");
        fs::create_dir_all(&root).expect("mkdir");
        let fixture = Self { tmp, root, storage };
        for (path, text) in files {
            fixture.write(path, text);
        }
        fixture
    }

    pub fn write(&self, relative: &str, text: &str) {
        let path = self.root.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("mkdir");
        }
        fs::write(path, text).expect("write");
    }

    pub fn delete(&self, relative: &str) {
        fs::remove_file(self.root.join(relative)).expect("delete");
    }

    pub fn config(&self, name: &str) -> IndexConfig {
        IndexConfig::new(name, &self.root).chunking(100, 0).file_types([".txt", ".md"])
    }

    pub fn settings(&self) -> ManagerSettings {
        ManagerSettings::new(&self.storage).retry(RetryPolicy::no_delay(2))
    }

    pub fn manager(&self, embedder: Arc<TestEmbedder>) -> IndexManager {
        IndexManager::new(self.settings(), Arc::new(FsLoader::new()), embedder)
    }
}
