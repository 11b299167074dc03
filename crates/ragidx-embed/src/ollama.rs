use std::time::Duration;

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use ragidx_core::{Embedder, Error, Result};

/// Embeddings from a local Ollama server (`POST {endpoint}/api/embed`).
///
/// Connection failures and timeouts map to `ProviderUnavailable`; error
/// statuses and malformed bodies map to `Provider`.
pub struct OllamaEmbedder {
    endpoint: String,
    model: String,
    id: String,
    client: Client,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
    truncate: bool,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

impl OllamaEmbedder {
    pub fn new(endpoint: &str, model: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::InvalidConfig(format!("HTTP client: {e}")))?;
        Ok(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model: model.to_string(),
            id: format!("ollama:{model}"),
            client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn request_error(&self, err: &reqwest::Error) -> Error {
        if err.is_connect() || err.is_timeout() {
            Error::ProviderUnavailable(format!("cannot reach Ollama at {}: {err}", self.endpoint))
        } else {
            Error::Provider(format!("Ollama request failed: {err}"))
        }
    }
}

impl Embedder for OllamaEmbedder {
    fn id(&self) -> &str {
        &self.id
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let request = EmbedRequest { model: &self.model, input: texts, truncate: true };
        let response = self
            .client
            .post(format!("{}/api/embed", self.endpoint))
            .json(&request)
            .send()
            .map_err(|e| self.request_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            if status.as_u16() == 404 || body.contains("not found") {
                return Err(Error::Provider(format!(
                    "model '{}' not found; pull it with `ollama pull {}`",
                    self.model, self.model
                )));
            }
            return Err(Error::Provider(format!("Ollama error ({status}): {body}")));
        }

        let parsed: EmbedResponse = response.json().map_err(|e| {
            if e.is_timeout() {
                self.request_error(&e)
            } else {
                Error::Provider(format!("malformed Ollama response: {e}"))
            }
        })?;
        if parsed.embeddings.len() != texts.len() {
            return Err(Error::Provider(format!(
                "Ollama returned {} embeddings for {} inputs",
                parsed.embeddings.len(),
                texts.len()
            )));
        }
        debug!("Embedded {} texts with {}", texts.len(), self.id);
        Ok(parsed.embeddings)
    }
}
