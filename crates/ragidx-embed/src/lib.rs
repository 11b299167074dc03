//! ragidx-embed
//!
//! Embedding providers behind `ragidx_core::Embedder` plus batch retry.
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use ragidx_core::config::EmbeddingSettings;
use ragidx_core::{Embedder, Error, Result};

pub mod fake;
pub mod ollama;
pub mod retry;

pub use fake::FakeEmbedder;
pub use ollama::OllamaEmbedder;
pub use retry::embed_with_retry;

/// Build the provider named by `settings.provider`.
pub fn from_settings(settings: &EmbeddingSettings) -> Result<Arc<dyn Embedder>> {
    let embedder: Arc<dyn Embedder> = match settings.provider.to_ascii_lowercase().as_str() {
        "ollama" => Arc::new(OllamaEmbedder::new(
            &settings.endpoint,
            &settings.model,
            Duration::from_secs(settings.timeout_secs.max(1)),
        )?),
        "fake" => Arc::new(FakeEmbedder::new(settings.dimension)?),
        other => return Err(Error::InvalidConfig(format!("unknown embedding provider '{other}'"))),
    };
    info!("Using embedding provider {}", embedder.id());
    Ok(embedder)
}
