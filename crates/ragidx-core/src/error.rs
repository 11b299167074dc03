use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Index already exists: {0}")]
    AlreadyExists(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Embedding provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Embedding provider error: {0}")]
    Provider(String),

    #[error("Vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Corrupt store: {0}")]
    Corrupt(String),

    #[error("Inconsistent snapshot: {0}")]
    Inconsistent(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Storage failure: {0}")]
    Storage(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] figment::Error),
}

impl Error {
    /// Provider failures are the only errors worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::ProviderUnavailable(_) | Error::Provider(_))
    }

    pub fn storage(err: impl std::fmt::Display) -> Self {
        Error::Storage(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_provider_errors_retry() {
        assert!(Error::ProviderUnavailable("down".into()).is_retryable());
        assert!(Error::Provider("500".into()).is_retryable());
        assert!(!Error::DimensionMismatch { expected: 3, actual: 4 }.is_retryable());
        assert!(!Error::InvalidConfig("overlap".into()).is_retryable());
    }

    #[test]
    fn read_error_names_the_path() {
        let err = Error::Read {
            path: PathBuf::from("/tmp/gone.txt"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        };
        assert!(err.to_string().contains("/tmp/gone.txt"));
    }
}
