use std::path::{Path, PathBuf};

use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid transport configuration: {0}")]
    InvalidConfig(String),
    #[error("{context}: {source}")]
    Request {
        context: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("server responded with HTTP {status}")]
    Status { status: StatusCode },
    #[error("failed to serialize request body: {0}")]
    Serialize(#[source] serde_json::Error),
    #[error("failed to parse response body: {0}")]
    Deserialize(#[source] serde_json::Error),
    #[error("failed to read response body: {0}")]
    Body(#[source] std::io::Error),
    #[error("{context} {}: {source}", path.display())]
    Io {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("no response received")]
    NoResponse,
    #[error("operation cancelled")]
    Cancelled,
    #[error("file download failed, {received} bytes read but {expected} bytes were expected")]
    IncompleteTransfer { expected: u64, received: u64 },
}

impl TransportError {
    pub(crate) fn request(context: &'static str, source: reqwest::Error) -> Self {
        Self::Request { context, source }
    }

    pub(crate) fn io(context: &'static str, path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            context,
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn invalid_config(details: impl Into<String>) -> Self {
        Self::InvalidConfig(details.into())
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
