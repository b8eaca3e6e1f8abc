//! Release discovery and transfer for self-updating applications.
//!
//! This crate provides the network half of an update:
//! - Tag-derived version parsing and ordering.
//! - A configurable HTTP transport returning uniform result objects.
//! - GitHub- and GitLab-shaped release clients behind one provider trait.

pub mod github;
pub mod gitlab;
pub mod http;
mod progress;
mod provider;
mod version;

/// Byte counters reported while streaming a download.
pub use progress::{DownloadProgress, ProgressCallback};
/// Shared release-client capability and tag access.
pub use provider::{ReleaseProvider, Tagged, select_new_releases};
/// Four-component version model parsed from tag names.
pub use version::{Version, VersionError};
pub use github::{GitHubAsset, GitHubError, GitHubRelease, GitHubReleaseClient};
pub use gitlab::{GitLabError, GitLabReleaseClient, GitLabTag, GitLabTagRelease};
