use std::path::{Path, PathBuf};

use swapkit_ledger::InvalidAction;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("action file {} does not exist", .0.display())]
    MissingActionFile(PathBuf),
    #[error("failed to read action file {}: {source}", path.display())]
    ReadActionFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to remove action file {}: {source}", path.display())]
    RemoveActionFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("action on line {line} failed ({action}): {source}")]
    ReplayFailed {
        line: usize,
        action: String,
        #[source]
        source: ReplayError,
    },
}

/// Failure of a single action line.
#[derive(Debug, Error)]
pub enum ReplayError {
    #[error(transparent)]
    Parse(#[from] InvalidAction),
    #[error("cannot split start arguments: {0}")]
    Arguments(String),
    #[error("{context} {}: {source}", path.display())]
    Io {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ReplayError {
    pub(crate) fn io(context: &'static str, path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            context,
            path: path.to_path_buf(),
            source,
        }
    }
}
