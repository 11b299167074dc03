use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file("config.toml"));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("RAGIDX_").split("__"));

        Ok(Self { figment })
    }

    /// Defaults, then one explicit TOML file, then `RAGIDX_*` env vars.
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::NotFound(format!("config file {}", path.display())));
        }
        let figment = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("RAGIDX_").split("__"));
        Ok(Self { figment })
    }

    pub fn get<T>(&self, key: &str) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        Ok(self.figment.extract_inner(key)?)
    }

    pub fn settings(&self) -> Result<Settings> {
        let settings: Settings = self.figment.extract()?;
        settings.validate()?;
        Ok(settings)
    }
}

/// Relative weight of the semantic and keyword legs; normalized at fusion time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HybridWeights {
    pub semantic: f32,
    pub keyword: f32,
}

impl Default for HybridWeights {
    fn default() -> Self {
        Self { semantic: 0.7, keyword: 0.3 }
    }
}

impl HybridWeights {
    pub fn keyword_only() -> Self {
        Self { semantic: 0.0, keyword: 1.0 }
    }

    pub fn semantic_only() -> Self {
        Self { semantic: 1.0, keyword: 0.0 }
    }

    pub fn validate(&self) -> Result<()> {
        let valid = |w: f32| w.is_finite() && w >= 0.0;
        if !valid(self.semantic) || !valid(self.keyword) {
            return Err(Error::InvalidConfig(format!(
                "hybrid weights must be finite and non-negative (semantic={}, keyword={})",
                self.semantic, self.keyword
            )));
        }
        if self.semantic + self.keyword <= 0.0 {
            return Err(Error::InvalidConfig("hybrid weights must not both be zero".into()));
        }
        Ok(())
    }
}

/// Per-index configuration. Immutable once the index exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexConfig {
    pub name: String,
    pub root: PathBuf,
    pub chunk_size: usize,
    pub overlap: usize,
    /// Extensions including the dot (`.md`). Empty accepts every file.
    pub file_types: Vec<String>,
    pub exclude_patterns: Vec<String>,
    pub watch: bool,
    pub weights: HybridWeights,
}

impl IndexConfig {
    pub fn new(name: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        let chunking = ChunkingSettings::default();
        Self {
            name: name.into(),
            root: root.into(),
            chunk_size: chunking.chunk_size,
            overlap: chunking.overlap,
            file_types: Vec::new(),
            exclude_patterns: Vec::new(),
            watch: false,
            weights: HybridWeights::default(),
        }
    }

    #[must_use]
    pub fn chunking(mut self, chunk_size: usize, overlap: usize) -> Self {
        self.chunk_size = chunk_size;
        self.overlap = overlap;
        self
    }

    #[must_use]
    pub fn file_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.file_types = types.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn exclude<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude_patterns = patterns.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn watch(mut self, watch: bool) -> Self {
        self.watch = watch;
        self
    }

    #[must_use]
    pub fn weights(mut self, weights: HybridWeights) -> Self {
        self.weights = weights;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty()
            || !self.name.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
            || self.name.starts_with('.')
        {
            return Err(Error::InvalidConfig(format!("invalid index name '{}'", self.name)));
        }
        if self.chunk_size == 0 {
            return Err(Error::InvalidConfig("chunk size must be positive".into()));
        }
        if self.overlap >= self.chunk_size {
            return Err(Error::InvalidConfig(format!(
                "overlap ({}) must be smaller than chunk size ({})",
                self.overlap, self.chunk_size
            )));
        }
        self.weights.validate()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    /// `ollama` or `fake`.
    pub provider: String,
    pub endpoint: String,
    pub model: String,
    pub batch_size: usize,
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub timeout_secs: u64,
    /// Only used by the `fake` provider.
    pub dimension: usize,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            endpoint: "http://localhost:11434".to_string(),
            model: "nomic-embed-text".to_string(),
            batch_size: 32,
            max_attempts: 3,
            initial_backoff_ms: 200,
            max_backoff_ms: 5_000,
            timeout_secs: 60,
            dimension: 384,
        }
    }
}

impl EmbeddingSettings {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
        }
    }
}

/// Bounded exponential backoff for provider calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        EmbeddingSettings::default().retry_policy()
    }
}

impl RetryPolicy {
    pub fn no_delay(max_attempts: u32) -> Self {
        Self { max_attempts: max_attempts.max(1), initial_backoff: Duration::ZERO, max_backoff: Duration::ZERO }
    }

    /// Delay before retry number `attempt` (1-based), doubling and capped.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.initial_backoff.saturating_mul(factor).min(self.max_backoff)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingSettings {
    pub chunk_size: usize,
    pub overlap: usize,
}

impl Default for ChunkingSettings {
    fn default() -> Self {
        Self { chunk_size: 512, overlap: 50 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuerySettings {
    pub oversample_factor: usize,
    pub min_candidates: usize,
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self { oversample_factor: 4, min_candidates: 20 }
    }
}

impl QuerySettings {
    pub fn candidates(&self, top_k: usize) -> usize {
        top_k.saturating_mul(self.oversample_factor.max(1)).max(self.min_candidates).max(1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchSettings {
    pub debounce_ms: u64,
    /// Longest a steady stream of events may postpone a refresh.
    pub max_delay_ms: u64,
    pub channel_capacity: usize,
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self { debounce_ms: 2_000, max_delay_ms: 30_000, channel_capacity: 256 }
    }
}

impl WatchSettings {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Never shorter than the debounce window.
    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms.max(self.debounce_ms))
    }
}

/// An index declared in the config file and created at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub name: String,
    pub path: String,
    #[serde(default)]
    pub watch: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub storage_path: String,
    pub embedding: EmbeddingSettings,
    pub chunking: ChunkingSettings,
    pub file_types: Vec<String>,
    pub exclude_patterns: Vec<String>,
    pub hybrid: HybridWeights,
    pub query: QuerySettings,
    pub watch: WatchSettings,
    pub indexes: Vec<IndexEntry>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            storage_path: "~/.ragidx".to_string(),
            embedding: EmbeddingSettings::default(),
            chunking: ChunkingSettings::default(),
            file_types: [".txt", ".md", ".py", ".js", ".ts", ".rs"].iter().map(ToString::to_string).collect(),
            exclude_patterns: vec!["node_modules/".to_string(), ".git/".to_string(), "target/".to_string()],
            hybrid: HybridWeights::default(),
            query: QuerySettings::default(),
            watch: WatchSettings::default(),
            indexes: Vec::new(),
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        if self.embedding.batch_size == 0 {
            return Err(Error::InvalidConfig("embedding.batch_size must be positive".into()));
        }
        if self.chunking.overlap >= self.chunking.chunk_size {
            return Err(Error::InvalidConfig("chunking.overlap must be smaller than chunking.chunk_size".into()));
        }
        self.hybrid.validate()
    }

    pub fn storage_root(&self) -> PathBuf {
        expand_path(&self.storage_path)
    }

    /// Build an index config for `name` rooted at `root` from the global defaults.
    pub fn index_config(&self, name: &str, root: &str) -> IndexConfig {
        IndexConfig {
            name: name.to_string(),
            root: expand_path(root),
            chunk_size: self.chunking.chunk_size,
            overlap: self.chunking.overlap,
            file_types: self.file_types.clone(),
            exclude_patterns: self.exclude_patterns.clone(),
            watch: false,
            weights: self.hybrid,
        }
    }

    pub fn declared_indexes(&self) -> Vec<IndexConfig> {
        self.indexes
            .iter()
            .map(|entry| self.index_config(&entry.name, &entry.path).watch(entry.watch))
            .collect()
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}
