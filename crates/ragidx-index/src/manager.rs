//! Registry of named indexes.
//!
//! Each index owns a current-snapshot pointer and a refresh gate. Queries
//! clone the pointer and never touch the gate; refreshes hold the gate for
//! their whole run, so refreshes of one index are serialized while different
//! indexes refresh in parallel.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use ragidx_core::chunker::hash_content;
use ragidx_core::config::{HybridWeights, IndexConfig, QuerySettings, RetryPolicy, Settings};
use ragidx_core::fsutil;
use ragidx_core::types::{Chunk, ChunkId, DocumentRecord, IndexInfo, QueryRequest, QueryResponse, QueryResult, RefreshReport};
use ragidx_core::{CancelFlag, Chunker, DocumentLoader, Embedder, Error, FileFilter, Result};
use ragidx_embed::embed_with_retry;
use ragidx_text::LexicalStore;
use ragidx_vector::VectorStore;

use crate::fusion;
use crate::manifest::{self, IndexPaths, Manifest};
use crate::snapshot::{InFlight, IndexSnapshot, SnapshotGuard};

/// Refresh attempts that embed outside the gate, counting the final one that does not.
const REFRESH_ATTEMPTS: usize = 3;

/// Knobs the manager needs from [`Settings`].
#[derive(Debug, Clone)]
pub struct ManagerSettings {
    pub storage_root: PathBuf,
    pub batch_size: usize,
    pub retry: RetryPolicy,
    pub query: QuerySettings,
}

impl ManagerSettings {
    pub fn new(storage_root: impl Into<PathBuf>) -> Self {
        Self {
            storage_root: storage_root.into(),
            batch_size: 32,
            retry: RetryPolicy::default(),
            query: QuerySettings::default(),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            storage_root: settings.storage_root(),
            batch_size: settings.embedding.batch_size.max(1),
            retry: settings.embedding.retry_policy(),
            query: settings.query,
        }
    }

    #[must_use]
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    #[must_use]
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn query(mut self, query: QuerySettings) -> Self {
        self.query = query;
        self
    }
}

/// A query result tagged with the index it came from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexedResult {
    pub index: String,
    pub result: QueryResult,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CombinedResponse {
    pub results: Vec<IndexedResult>,
    pub degraded: bool,
}

struct ManagedIndex {
    config: IndexConfig,
    filter: FileFilter,
    chunker: Chunker,
    paths: IndexPaths,
    current: RwLock<Arc<IndexSnapshot>>,
    /// Refresh gate. `None` once the index is removed.
    writer: Mutex<Option<LexicalStore>>,
    in_flight: Arc<InFlight>,
    last_refresh: RwLock<Option<DateTime<Utc>>>,
}

impl ManagedIndex {
    fn current(&self) -> Arc<IndexSnapshot> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn publish(&self, snapshot: Arc<IndexSnapshot>) {
        let previous = {
            let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *current, snapshot)
        };
        // The old snapshot may be freed here, outside the lock.
        drop(previous);
    }

    fn acquire(&self) -> Result<SnapshotGuard> {
        SnapshotGuard::acquire(self.current(), Arc::clone(&self.in_flight))
    }

    fn gate(&self) -> MutexGuard<'_, Option<LexicalStore>> {
        self.writer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn touch(&self) {
        *self.last_refresh.write().unwrap_or_else(PoisonError::into_inner) = Some(Utc::now());
    }
}

/// A changed or new file, chunked and waiting for vectors.
struct Pending {
    record: DocumentRecord,
    chunks: Vec<Chunk>,
    previous: bool,
}

#[derive(Default)]
struct Plan {
    pending: Vec<Pending>,
    removed: Vec<String>,
    /// Same content, new mtime or size.
    touched: Vec<DocumentRecord>,
    unchanged: usize,
}

/// Copy-on-write working state of a refresh.
struct Staged {
    documents: BTreeMap<String, DocumentRecord>,
    chunks: HashMap<ChunkId, Arc<Chunk>>,
    vectors: VectorStore,
}

impl Staged {
    fn from_snapshot(snapshot: &IndexSnapshot) -> Self {
        Self {
            documents: snapshot.documents().clone(),
            chunks: snapshot.chunks().clone(),
            vectors: snapshot.vectors().clone(),
        }
    }

    fn remove_document(&mut self, writer: &mut LexicalStore, path: &str) -> bool {
        let Some(record) = self.documents.remove(path) else {
            return false;
        };
        for id in &record.chunk_ids {
            self.chunks.remove(id);
            self.vectors.remove(id);
            writer.remove(id);
        }
        true
    }

    fn insert_document(
        &mut self,
        writer: &mut LexicalStore,
        pending: Pending,
        embedded: &mut HashMap<ChunkId, Vec<f32>>,
    ) -> Result<()> {
        for chunk in pending.chunks {
            let vector = embedded
                .remove(&chunk.id)
                .ok_or_else(|| Error::Inconsistent(format!("no vector for chunk {} of {}", chunk.id, chunk.path)))?;
            self.vectors.add(chunk.id.clone(), vector)?;
            writer.add(&chunk.id, &chunk.text)?;
            self.chunks.insert(chunk.id.clone(), Arc::new(chunk));
        }
        self.documents.insert(pending.record.path.clone(), pending.record);
        Ok(())
    }
}

/// Owns every named index for the lifetime of the process.
pub struct IndexManager {
    settings: ManagerSettings,
    loader: Arc<dyn DocumentLoader>,
    embedder: Arc<dyn Embedder>,
    indexes: RwLock<HashMap<String, Arc<ManagedIndex>>>,
    /// Serializes create, restore and remove.
    lifecycle: Mutex<()>,
}

impl IndexManager {
    pub fn new(settings: ManagerSettings, loader: Arc<dyn DocumentLoader>, embedder: Arc<dyn Embedder>) -> Self {
        Self { settings, loader, embedder, indexes: RwLock::new(HashMap::new()), lifecycle: Mutex::new(()) }
    }

    pub fn settings(&self) -> &ManagerSettings {
        &self.settings
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    fn get(&self, name: &str) -> Result<Arc<ManagedIndex>> {
        self.indexes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("index '{name}'")))
    }

    fn lifecycle(&self) -> MutexGuard<'_, ()> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.indexes.read().unwrap_or_else(PoisonError::into_inner).contains_key(name)
    }

    /// Registered index names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.indexes.read().unwrap_or_else(PoisonError::into_inner).keys().cloned().collect();
        names.sort();
        names
    }

    /// Register a new index.
    ///
    /// Persisted state built with the same config and provider is loaded as the
    /// baseline, so unchanged files are not re-embedded. Unreadable or
    /// inconsistent state is discarded and the index starts empty.
    pub fn create(&self, config: IndexConfig) -> Result<IndexInfo> {
        config.validate()?;
        let _lifecycle = self.lifecycle();
        if self.contains(&config.name) {
            return Err(Error::AlreadyExists(config.name));
        }
        let filter = FileFilter::for_index(&config)?;
        let chunker = Chunker::new(config.chunk_size, config.overlap)?;
        let paths = IndexPaths::new(&self.settings.storage_root, &config.name);

        let (store, snapshot) = match self.load_persisted(&paths, &config) {
            Ok(Some(state)) => {
                info!(
                    "Loaded index {} v{} ({} files, {} chunks)",
                    config.name,
                    state.1.version(),
                    state.1.file_count(),
                    state.1.chunk_count()
                );
                state
            }
            Ok(None) => self.init_storage(&paths, &config)?,
            Err(err) => {
                warn!("Discarding persisted state of index {}: {}; rebuilding from source", config.name, err);
                self.init_storage(&paths, &config)?
            }
        };

        let name = config.name.clone();
        let index = ManagedIndex {
            config,
            filter,
            chunker,
            paths,
            current: RwLock::new(Arc::new(snapshot)),
            writer: Mutex::new(Some(store)),
            in_flight: Arc::new(InFlight::default()),
            last_refresh: RwLock::new(None),
        };
        self.indexes.write().unwrap_or_else(PoisonError::into_inner).insert(name.clone(), Arc::new(index));
        self.info(&name)
    }

    fn load_persisted(&self, paths: &IndexPaths, config: &IndexConfig) -> Result<Option<(LexicalStore, IndexSnapshot)>> {
        if !paths.config().exists() {
            return Ok(None);
        }
        let stored = manifest::load_config(paths)?;
        if &stored != config {
            info!("Configuration of index {} changed; rebuilding", config.name);
            return Ok(None);
        }
        let manifest = Manifest::load(paths)?;
        if manifest.embedder != self.embedder.id() {
            info!(
                "Index {} was embedded with {}, now using {}; rebuilding",
                config.name,
                manifest.embedder,
                self.embedder.id()
            );
            return Ok(None);
        }
        let vectors = VectorStore::load(&paths.vectors())?;
        let store = LexicalStore::open(&paths.lexical())?;
        let documents = manifest.documents.into_iter().map(|d| (d.path.clone(), d)).collect();
        let chunks = manifest.chunks.into_iter().map(|c| (c.id.clone(), Arc::new(c))).collect();
        let snapshot = IndexSnapshot::build(&config.name, manifest.version, documents, chunks, vectors, store.view()?)?;
        Ok(Some((store, snapshot)))
    }

    fn init_storage(&self, paths: &IndexPaths, config: &IndexConfig) -> Result<(LexicalStore, IndexSnapshot)> {
        if paths.dir().exists() {
            fs::remove_dir_all(paths.dir())?;
        }
        fs::create_dir_all(paths.dir())?;
        manifest::save_config(paths, config)?;
        let store = LexicalStore::create(&paths.lexical())?;
        let snapshot =
            IndexSnapshot::build(&config.name, 0, BTreeMap::new(), HashMap::new(), VectorStore::new(), store.view()?)?;
        self.persist(paths, &snapshot)?;
        Ok((store, snapshot))
    }

    fn persist(&self, paths: &IndexPaths, snapshot: &IndexSnapshot) -> Result<()> {
        snapshot.vectors().persist(&paths.vectors())?;
        let mut chunks: Vec<Chunk> = snapshot.chunks().values().map(|c| Chunk::clone(c)).collect();
        chunks.sort_by(|a, b| a.path.cmp(&b.path).then(a.start.cmp(&b.start)));
        let manifest = Manifest {
            version: snapshot.version(),
            embedder: self.embedder.id().to_string(),
            updated: Utc::now(),
            documents: snapshot.documents().values().cloned().collect(),
            chunks,
        };
        manifest.save(paths)
    }

    /// Re-register every index persisted under the storage root.
    pub fn restore(&self) -> Result<Vec<String>> {
        let root = &self.settings.storage_root;
        if !root.is_dir() {
            return Ok(Vec::new());
        }
        let mut names: Vec<String> = fs::read_dir(root)?
            .filter_map(std::result::Result::ok)
            .filter(|e| e.path().join("config.json").is_file())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();

        let mut restored = Vec::new();
        for name in names {
            if self.contains(&name) {
                continue;
            }
            let config = match manifest::load_config(&IndexPaths::new(root, &name)) {
                Ok(config) if config.name == name => config,
                Ok(config) => {
                    warn!("Skipping {}: config names index {}", name, config.name);
                    continue;
                }
                Err(err) => {
                    warn!("Skipping {}: {}", name, err);
                    continue;
                }
            };
            match self.create(config) {
                Ok(info) => restored.push(info.name),
                Err(err) => warn!("Could not restore index {}: {}", name, err),
            }
        }
        Ok(restored)
    }

    pub fn refresh(&self, name: &str) -> Result<RefreshReport> {
        self.refresh_with_cancel(name, &CancelFlag::new())
    }

    /// Reconcile the index with its root directory and publish a new snapshot.
    ///
    /// Embedding runs outside the refresh gate, so removal and other
    /// refreshes are not held up by a slow provider. If another refresh
    /// publishes meanwhile the work is planned again against the newer
    /// snapshot; the final attempt keeps the gate throughout.
    ///
    /// `cancel` is checked between embedding batches; a cancelled refresh
    /// leaves the current snapshot untouched.
    pub fn refresh_with_cancel(&self, name: &str, cancel: &CancelFlag) -> Result<RefreshReport> {
        let index = self.get(name)?;
        let started = Instant::now();
        let removed = || Error::NotFound(format!("index '{name}'"));
        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut gate = index.gate();
            if gate.is_none() {
                return Err(removed());
            }
            let base = index.current();
            let plan = self.plan(&index, &base)?;

            let embedding = if attempt >= REFRESH_ATTEMPTS || plan.pending.is_empty() {
                self.embed_pending(&plan.pending, cancel)?
            } else {
                drop(gate);
                let embedding = self.embed_pending(&plan.pending, cancel)?;
                gate = index.gate();
                if gate.is_none() {
                    return Err(removed());
                }
                if index.current().version() != base.version() {
                    debug!("Index {} moved past v{} while embedding, planning again", name, base.version());
                    continue;
                }
                embedding
            };
            let Some(writer) = gate.as_mut() else {
                return Err(removed());
            };
            return self.finish_refresh(&index, writer, base, plan, embedding, started);
        }
    }

    /// Apply a planned refresh under the gate, then publish and persist it.
    fn finish_refresh(
        &self,
        index: &ManagedIndex,
        writer: &mut LexicalStore,
        base: Arc<IndexSnapshot>,
        plan: Plan,
        (embedded, failed): (HashMap<ChunkId, Vec<f32>>, HashSet<usize>),
        started: Instant,
    ) -> Result<RefreshReport> {
        let name = index.config.name.as_str();
        let mut report = RefreshReport { unchanged: plan.unchanged, ..RefreshReport::default() };
        let mut staged = Staged::from_snapshot(&base);
        let changed = match Self::apply(writer, &mut staged, plan, embedded, &failed, &mut report) {
            Ok(changed) => changed,
            Err(err) => {
                if let Err(rollback) = writer.rollback() {
                    warn!("Lexical rollback for index {} failed: {}", name, rollback);
                }
                return Err(err);
            }
        };

        if !changed {
            report.total = base.file_count();
            report.chunks = base.chunk_count();
            report.version = base.version();
            index.touch();
            info!(
                "Index {} unchanged ({} files, {} failed) in {:?}",
                name,
                report.total,
                report.failed,
                started.elapsed()
            );
            return Ok(report);
        }

        let lexical = match writer.commit() {
            Ok(view) => view,
            Err(err) => {
                if let Err(rollback) = writer.rollback() {
                    warn!("Lexical rollback for index {} failed: {}", name, rollback);
                }
                return Err(err);
            }
        };
        let Staged { documents, chunks, vectors } = staged;
        let snapshot = Arc::new(IndexSnapshot::build(name, base.version() + 1, documents, chunks, vectors, lexical)?);
        drop(base);
        index.publish(Arc::clone(&snapshot));
        index.touch();

        report.total = snapshot.file_count();
        report.chunks = snapshot.chunk_count();
        report.version = snapshot.version();
        report.swapped = true;
        info!(
            "Refreshed index {} to v{}: {} added, {} updated, {} removed, {} unchanged, {} failed in {:?}",
            name,
            report.version,
            report.added,
            report.updated,
            report.removed,
            report.unchanged,
            report.failed,
            started.elapsed()
        );

        self.persist(&index.paths, &snapshot)?;
        Ok(report)
    }

    /// Scan the root and diff it against `base` by content hash.
    ///
    /// Every file is read: mtime and size alone miss same-size edits that
    /// keep their timestamp.
    fn plan(&self, index: &ManagedIndex, base: &IndexSnapshot) -> Result<Plan> {
        let entries = self.loader.scan(&index.config.root, &index.filter)?;
        let mut plan = Plan::default();
        let mut present: HashSet<String> = HashSet::with_capacity(entries.len());

        for entry in entries {
            let previous = base.document(&entry.relative);
            let text = match self.loader.load(&entry.path) {
                Ok(text) => text,
                Err(err) => {
                    warn!("Treating {} as removed for this refresh: {}", entry.relative, err);
                    continue;
                }
            };
            let content_hash = hash_content(&text);
            present.insert(entry.relative.clone());

            if let Some(prev) = previous.filter(|prev| prev.content_hash == content_hash) {
                if prev.modified != entry.modified || prev.size != entry.size {
                    plan.touched.push(DocumentRecord { modified: entry.modified, size: entry.size, ..prev.clone() });
                }
                plan.unchanged += 1;
                continue;
            }
            let chunks = index.chunker.chunks(&entry.relative, &text);
            debug!("{} {} ({} chunks)", if previous.is_some() { "Updating" } else { "Adding" }, entry.relative, chunks.len());
            let record = DocumentRecord {
                path: entry.relative,
                content_hash,
                modified: entry.modified,
                size: entry.size,
                chunk_ids: chunks.iter().map(|c| c.id.clone()).collect(),
            };
            plan.pending.push(Pending { record, chunks, previous: previous.is_some() });
        }

        plan.removed = base.documents().keys().filter(|path| !present.contains(*path)).cloned().collect();
        Ok(plan)
    }

    /// Embed the chunks of every pending file in fixed-size batches.
    ///
    /// Returns the vectors by chunk id and the indices of pending files that
    /// had a batch exhaust its retries.
    fn embed_pending(
        &self,
        pending: &[Pending],
        cancel: &CancelFlag,
    ) -> Result<(HashMap<ChunkId, Vec<f32>>, HashSet<usize>)> {
        let work: Vec<(usize, &Chunk)> =
            pending.iter().enumerate().flat_map(|(i, p)| p.chunks.iter().map(move |c| (i, c))).collect();
        let mut vectors = HashMap::with_capacity(work.len());
        let mut failed = HashSet::new();

        for batch in work.chunks(self.settings.batch_size.max(1)) {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let texts: Vec<String> = batch.iter().map(|(_, c)| c.text.clone()).collect();
            match embed_with_retry(self.embedder.as_ref(), &texts, &self.settings.retry, Some(cancel)) {
                Ok(out) => {
                    for ((_, chunk), vector) in batch.iter().zip(out) {
                        vectors.insert(chunk.id.clone(), vector);
                    }
                }
                Err(err) if err.is_retryable() => {
                    let files: HashSet<usize> = batch.iter().map(|(i, _)| *i).collect();
                    warn!("Embedding batch failed for {} file(s) after retries: {}", files.len(), err);
                    failed.extend(files);
                }
                Err(err) => return Err(err),
            }
        }
        Ok((vectors, failed))
    }

    fn apply(
        writer: &mut LexicalStore,
        staged: &mut Staged,
        plan: Plan,
        mut embedded: HashMap<ChunkId, Vec<f32>>,
        failed: &HashSet<usize>,
        report: &mut RefreshReport,
    ) -> Result<bool> {
        let mut changed = !plan.touched.is_empty();
        for path in &plan.removed {
            if staged.remove_document(writer, path) {
                report.removed += 1;
                changed = true;
            }
        }
        for record in plan.touched {
            staged.documents.insert(record.path.clone(), record);
        }
        for (i, pending) in plan.pending.into_iter().enumerate() {
            if failed.contains(&i) {
                // Keeps whatever state the file had before.
                report.failed += 1;
                report.failed_files.push(pending.record.path);
                continue;
            }
            if pending.previous {
                staged.remove_document(writer, &pending.record.path);
                report.updated += 1;
            } else {
                report.added += 1;
            }
            staged.insert_document(writer, pending, &mut embedded)?;
            changed = true;
        }
        Ok(changed)
    }

    /// Hybrid query against the current snapshot of `name`.
    pub fn query(&self, name: &str, request: &QueryRequest) -> Result<QueryResponse> {
        if request.top_k == 0 {
            return Err(Error::InvalidConfig("top_k must be at least 1".into()));
        }
        let index = self.get(name)?;
        let weights = request.weights.unwrap_or(index.config.weights);
        weights.validate()?;
        let snapshot = index.acquire()?;
        self.query_snapshot(&snapshot, request, weights)
    }

    fn query_snapshot(&self, snapshot: &IndexSnapshot, request: &QueryRequest, weights: HybridWeights) -> Result<QueryResponse> {
        let version = snapshot.version();
        if request.text.trim().is_empty() {
            return Ok(QueryResponse { results: Vec::new(), degraded: false, snapshot_version: version });
        }
        let candidates = self.settings.query.candidates(request.top_k);
        let mut weights = weights;
        let mut degraded = false;

        let mut keyword = if weights.keyword > 0.0 {
            Some(snapshot.lexical().search(&request.text, candidates)?)
        } else {
            None
        };
        let semantic = if weights.semantic <= 0.0 {
            None
        } else if snapshot.vectors().is_empty() {
            Some(Vec::new())
        } else {
            match self.embed_query(&request.text) {
                Ok(vector) => Some(snapshot.vectors().search(&vector, candidates)?),
                Err(err) if err.is_retryable() => {
                    warn!("Query on {} falls back to keyword scores: {}", snapshot.index(), err);
                    degraded = true;
                    weights = HybridWeights::keyword_only();
                    if keyword.is_none() {
                        keyword = Some(snapshot.lexical().search(&request.text, candidates)?);
                    }
                    None
                }
                Err(err) => return Err(err),
            }
        };

        let fused = fusion::fuse(semantic.as_deref(), keyword.as_deref(), weights);
        let results = fusion::rank(fused, |id| snapshot.chunk(id), request.min_score, request.top_k);
        Ok(QueryResponse { results, degraded, snapshot_version: version })
    }

    fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embedder
            .embed_batch(&[text.to_string()])?
            .into_iter()
            .next()
            .ok_or_else(|| Error::Provider("no embedding returned for query".into()))
    }

    /// Query every index and merge the results with the same ordering.
    pub fn query_all(&self, request: &QueryRequest) -> Result<CombinedResponse> {
        if request.top_k == 0 {
            return Err(Error::InvalidConfig("top_k must be at least 1".into()));
        }
        let mut results = Vec::new();
        let mut degraded = false;
        for name in self.names() {
            let response = match self.query(&name, request) {
                Ok(response) => response,
                // Removed while we were iterating.
                Err(Error::NotFound(_)) => continue,
                Err(err) => return Err(err),
            };
            degraded |= response.degraded;
            results.extend(response.results.into_iter().map(|result| IndexedResult { index: name.clone(), result }));
        }
        results.sort_by(|a, b| a.result.rank_cmp(&b.result).then_with(|| a.index.cmp(&b.index)));
        results.truncate(request.top_k);
        Ok(CombinedResponse { results, degraded })
    }

    /// Unregister `name`, wait for in-flight queries and for a refresh that
    /// is applying changes, then delete its persisted state. A refresh still
    /// embedding fails with `NotFound` instead of publishing.
    ///
    /// Blocks while the calling thread itself holds a guard on the index.
    pub fn remove(&self, name: &str) -> Result<()> {
        let _lifecycle = self.lifecycle();
        let index = self
            .indexes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
            .ok_or_else(|| Error::NotFound(format!("index '{name}'")))?;
        let store = index.gate().take();
        drop(store);
        index.in_flight.close_and_wait_idle();
        if index.paths.dir().exists() {
            fs::remove_dir_all(index.paths.dir())?;
        }
        info!("Removed index {}", name);
        Ok(())
    }

    pub fn info(&self, name: &str) -> Result<IndexInfo> {
        let index = self.get(name)?;
        let snapshot = index.current();
        let last_refresh = *index.last_refresh.read().unwrap_or_else(PoisonError::into_inner);
        Ok(IndexInfo {
            name: name.to_string(),
            root: index.config.root.clone(),
            version: snapshot.version(),
            file_count: snapshot.file_count(),
            chunk_count: snapshot.chunk_count(),
            vector_count: snapshot.vectors().len(),
            lexical_count: snapshot.lexical().len(),
            dimension: snapshot.vectors().dimension(),
            disk_size_bytes: fsutil::disk_usage(index.paths.dir()),
            last_refresh,
        })
    }

    /// Info for every index, sorted by name.
    pub fn list(&self) -> Vec<IndexInfo> {
        self.names().iter().filter_map(|name| self.info(name).ok()).collect()
    }

    /// Indexed file paths of `name`, sorted.
    pub fn list_files(&self, name: &str) -> Result<Vec<String>> {
        Ok(self.get(name)?.current().documents().keys().cloned().collect())
    }

    /// Indexed files whose path contains `pattern` (case-insensitive), as
    /// `(index, path)` pairs. Searches every index when `index` is `None`.
    pub fn search_files(&self, pattern: &str, index: Option<&str>) -> Result<Vec<(String, String)>> {
        let names = match index {
            Some(name) => {
                self.get(name)?;
                vec![name.to_string()]
            }
            None => self.names(),
        };
        let needle = pattern.to_lowercase();
        let mut matches = Vec::new();
        for name in names {
            let Ok(managed) = self.get(&name) else { continue };
            let snapshot = managed.current();
            matches.extend(
                snapshot
                    .documents()
                    .keys()
                    .filter(|path| path.to_lowercase().contains(&needle))
                    .map(|path| (name.clone(), path.clone())),
            );
        }
        Ok(matches)
    }

    pub fn config(&self, name: &str) -> Result<IndexConfig> {
        Ok(self.get(name)?.config.clone())
    }

    /// The filter deciding which paths under the root belong to `name`.
    pub fn filter(&self, name: &str) -> Result<FileFilter> {
        Ok(self.get(name)?.filter.clone())
    }

    /// Hold the current snapshot of `name` until the guard is dropped.
    pub fn acquire(&self, name: &str) -> Result<SnapshotGuard> {
        self.get(name)?.acquire()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragidx_core::FsLoader;
    use ragidx_embed::FakeEmbedder;

    fn manager(storage: &std::path::Path) -> IndexManager {
        let embedder = FakeEmbedder::new(32).expect("embedder");
        IndexManager::new(ManagerSettings::new(storage), Arc::new(FsLoader::new()), Arc::new(embedder))
    }

    #[test]
    fn create_rejects_duplicates_and_bad_configs() {
        let tmp = tempfile::tempdir().expect("tmp");
        let manager = manager(&tmp.path().join("store"));
        manager.create(IndexConfig::new("docs", tmp.path())).expect("create");
        assert!(matches!(manager.create(IndexConfig::new("docs", tmp.path())), Err(Error::AlreadyExists(_))));
        let bad = IndexConfig::new("other", tmp.path()).chunking(10, 10);
        assert!(matches!(manager.create(bad), Err(Error::InvalidConfig(_))));
        assert!(matches!(manager.create(IndexConfig::new("../escape", tmp.path())), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn unknown_index_is_not_found() {
        let tmp = tempfile::tempdir().expect("tmp");
        let manager = manager(tmp.path());
        assert!(matches!(manager.refresh("nope"), Err(Error::NotFound(_))));
        assert!(matches!(manager.query("nope", &QueryRequest::new("x")), Err(Error::NotFound(_))));
        assert!(matches!(manager.info("nope"), Err(Error::NotFound(_))));
        assert!(matches!(manager.remove("nope"), Err(Error::NotFound(_))));
    }

    #[test]
    fn zero_top_k_is_rejected() {
        let tmp = tempfile::tempdir().expect("tmp");
        let manager = manager(&tmp.path().join("store"));
        manager.create(IndexConfig::new("docs", tmp.path())).expect("create");
        let err = manager.query("docs", &QueryRequest::new("x").top_k(0)).expect_err("top_k");
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn missing_root_fails_refresh_without_dropping_state() {
        let tmp = tempfile::tempdir().expect("tmp");
        let root = tmp.path().join("docs");
        fs::create_dir_all(&root).expect("mkdir");
        fs::write(root.join("a.txt"), "alpha").expect("write");
        let manager = manager(&tmp.path().join("store"));
        manager.create(IndexConfig::new("docs", &root)).expect("create");
        manager.refresh("docs").expect("refresh");

        fs::remove_dir_all(&root).expect("rm");
        assert!(matches!(manager.refresh("docs"), Err(Error::NotFound(_))));
        assert_eq!(manager.info("docs").expect("info").file_count, 1);
    }
}
