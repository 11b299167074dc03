use std::thread;

use tracing::warn;

use ragidx_core::config::RetryPolicy;
use ragidx_core::{CancelFlag, Embedder, Error, Result};

/// Embed one batch, retrying provider failures with bounded exponential backoff.
///
/// Non-provider errors are returned at once. A response with the wrong number
/// of vectors counts as a provider failure. A set `cancel` flag stops further
/// attempts with `Cancelled`.
pub fn embed_with_retry(
    embedder: &dyn Embedder,
    texts: &[String],
    policy: &RetryPolicy,
    cancel: Option<&CancelFlag>,
) -> Result<Vec<Vec<f32>>> {
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        let outcome = embedder.embed_batch(texts).and_then(|vectors| {
            if vectors.len() == texts.len() {
                Ok(vectors)
            } else {
                Err(Error::Provider(format!("{} vectors for {} texts", vectors.len(), texts.len())))
            }
        });
        match outcome {
            Ok(vectors) => return Ok(vectors),
            Err(err) if err.is_retryable() && attempt < max_attempts => {
                let delay = policy.backoff(attempt);
                warn!(
                    "Embedding attempt {}/{} with {} failed: {}; retrying in {:?}",
                    attempt,
                    max_attempts,
                    embedder.id(),
                    err,
                    delay
                );
                if cancel.is_some_and(CancelFlag::is_cancelled) {
                    return Err(Error::Cancelled);
                }
                thread::sleep(delay);
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
