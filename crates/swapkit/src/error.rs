use std::path::PathBuf;

use swapkit_core::http::TransportError;
use swapkit_core::{GitHubError, GitLabError};
use swapkit_ledger::LaunchError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Invalid application version {version}: {reason}")]
    CurrentVersion { version: String, reason: String },
    #[error("Provider is not configured: {0}")]
    NotConfigured(&'static str),
    #[error("Invalid provider configuration: {0}")]
    Transport(#[from] TransportError),
    #[error(transparent)]
    GitHub(#[from] GitHubError),
    #[error(transparent)]
    GitLab(#[from] GitLabError),
    #[error("Release {tag} has no downloadable asset")]
    NoAsset { tag: String },
    #[error("GitLab tag {tag} only provides a source archive, install it manually")]
    SourceArchiveOnly { tag: String },
    #[error("Update helper not found at {}", .0.display())]
    HelperMissing(PathBuf),
    #[error("Could not locate the running executable: {0}")]
    CurrentExe(#[source] std::io::Error),
    #[error("Could not schedule {action}")]
    Schedule { action: &'static str },
    #[error(transparent)]
    Launch(#[from] LaunchError),
}

impl AppError {
    pub fn current_version(version: &str, reason: impl ToString) -> Self {
        Self::CurrentVersion {
            version: version.to_string(),
            reason: reason.to_string(),
        }
    }
}
