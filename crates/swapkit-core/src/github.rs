use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info, warn};
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderValue};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::http::{
    AuthorizationScheme, HttpResponse, HttpTransport, ProxySettings, TransportError,
};
use crate::progress::ProgressCallback;
use crate::provider::{ReleaseProvider, Tagged, download_to_temp, null_as_default};
use crate::version::VersionError;

pub const DEFAULT_API_URL: &str = "https://api.github.com";
const GITHUB_ACCEPT: &str = "application/vnd.github.v3+json";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GitHubAsset {
    #[serde(deserialize_with = "null_as_default")]
    pub browser_download_url: String,
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    pub label: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub state: String,
    #[serde(deserialize_with = "null_as_default")]
    pub content_type: String,
    #[serde(deserialize_with = "null_as_default")]
    pub size: u64,
    #[serde(deserialize_with = "null_as_default")]
    pub download_count: u64,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GitHubRelease {
    #[serde(deserialize_with = "null_as_default")]
    pub html_url: String,
    pub zipball_url: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub tag_name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub target_commitish: String,
    pub name: Option<String>,
    pub body: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub draft: bool,
    #[serde(deserialize_with = "null_as_default")]
    pub prerelease: bool,
    pub created_at: Option<String>,
    pub published_at: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub assets: Vec<GitHubAsset>,
}

impl GitHubRelease {
    /// First asset whose name matches exactly, ignoring ASCII case.
    #[must_use]
    pub fn find_asset(&self, name: &str) -> Option<&GitHubAsset> {
        self.assets
            .iter()
            .find(|asset| asset.name.eq_ignore_ascii_case(name))
    }
}

impl Tagged for GitHubRelease {
    fn tag_name(&self) -> &str {
        &self.tag_name
    }
}

#[derive(Debug, Error)]
pub enum GitHubError {
    #[error(transparent)]
    InvalidVersion(#[from] VersionError),
    #[error("{message}: {source}")]
    RequestFailed {
        message: String,
        status: Option<StatusCode>,
        status_text: String,
        #[source]
        source: TransportError,
    },
}

impl GitHubError {
    fn request_failed<T>(message: impl Into<String>, mut response: HttpResponse<T>) -> Self {
        let source = response.take_failure();
        Self::RequestFailed {
            message: message.into(),
            status: response.status,
            status_text: response.status_text,
            source,
        }
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::RequestFailed { source, .. } if source.is_cancelled())
    }

    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::RequestFailed { status, .. } => *status,
            Self::InvalidVersion(_) => None,
        }
    }
}

/// Release client for the GitHub REST API.
#[derive(Debug, Clone)]
pub struct GitHubReleaseClient {
    transport: HttpTransport,
    owner: String,
    repo: String,
    max_releases: Option<u32>,
}

impl Default for GitHubReleaseClient {
    fn default() -> Self {
        Self::new()
    }
}

impl GitHubReleaseClient {
    #[must_use]
    pub fn new() -> Self {
        let mut transport = HttpTransport::new(DEFAULT_API_URL);
        transport.insert_header(ACCEPT, HeaderValue::from_static(GITHUB_ACCEPT));
        Self {
            transport,
            owner: String::new(),
            repo: String::new(),
            max_releases: None,
        }
    }

    pub fn set_repo(&mut self, owner: &str, repo: &str) -> &mut Self {
        self.owner = owner.trim().to_string();
        self.repo = repo.trim().to_string();
        self
    }

    /// Cap the listing to the first page of `max` entries; `None` lets the
    /// server pick its default page size.
    pub fn set_max_releases(&mut self, max: Option<u32>) -> &mut Self {
        self.max_releases = max.filter(|max| *max > 0);
        self
    }

    /// Send `Authorization: Token {token}`. An empty token clears it.
    ///
    /// # Errors
    /// Returns [`TransportError::InvalidConfig`] when the token cannot be sent
    /// as a header value.
    pub fn set_authorization_token(&mut self, token: &str) -> Result<&mut Self, TransportError> {
        self.transport
            .set_authorization_scheme(AuthorizationScheme::Token, token.trim())?;
        Ok(self)
    }

    pub fn set_base_url(&mut self, base_url: &str) -> &mut Self {
        self.transport.set_base_url(base_url);
        self
    }

    /// # Errors
    /// Returns [`TransportError::InvalidConfig`] for an invalid proxy address.
    pub fn set_proxy(&mut self, proxy: Option<ProxySettings>) -> Result<&mut Self, TransportError> {
        self.transport.set_proxy(proxy)?;
        Ok(self)
    }

    pub fn set_timeouts(
        &mut self,
        timeout: Option<Duration>,
        read_timeout: Option<Duration>,
    ) -> &mut Self {
        self.transport.set_timeouts(timeout, read_timeout);
        self
    }

    pub fn set_buffer_size(&mut self, buffer_size: usize) -> &mut Self {
        self.transport.set_buffer_size(buffer_size);
        self
    }

    pub fn set_cancellation_token(&mut self, token: Option<CancellationToken>) -> &mut Self {
        self.transport.set_cancellation_token(token);
        self
    }

    #[must_use]
    pub fn transport(&self) -> &HttpTransport {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut HttpTransport {
        &mut self.transport
    }

    fn releases_path(&self) -> String {
        let mut path = format!("repos/{}/{}/releases", self.owner, self.repo);
        if let Some(max) = self.max_releases {
            path.push_str(&format!("?page=1&per_page={max}"));
        }
        path
    }
}

#[async_trait]
impl ReleaseProvider for GitHubReleaseClient {
    type Release = GitHubRelease;
    type Error = GitHubError;

    async fn list_releases(&mut self) -> Result<Vec<GitHubRelease>, GitHubError> {
        let path = self.releases_path();
        let mut response = self.transport.get_json::<Vec<GitHubRelease>>(&path).await;

        let rejected = matches!(
            response.status,
            Some(StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN)
        );
        if rejected && self.transport.config().headers().contains_key(AUTHORIZATION) {
            warn!(
                "GitHub rejected the configured token ({}), retrying anonymously",
                response.describe()
            );
            self.transport.clear_authorization();
            response = self.transport.get_json(&path).await;
        }

        if !response.is_success() || response.status != Some(StatusCode::OK) {
            return Err(GitHubError::request_failed(
                format!("failed to list releases of {}/{}", self.owner, self.repo),
                response,
            ));
        }

        let releases = response.body.unwrap_or_default();
        debug!(
            "GitHub returned {} release(s) for {}/{}",
            releases.len(),
            self.owner,
            self.repo
        );
        Ok(releases)
    }

    async fn download_to_temp_file(
        &self,
        url: &str,
        on_progress: Option<ProgressCallback<'_>>,
    ) -> Result<PathBuf, GitHubError> {
        info!("Downloading {url}");
        download_to_temp(&self.transport, url, on_progress)
            .await
            .map_err(|response| {
                GitHubError::request_failed(format!("failed to download {url}"), response)
            })
    }
}
