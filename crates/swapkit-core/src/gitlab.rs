use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info};
use reqwest::StatusCode;
use reqwest::header::{HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::http::{HttpResponse, HttpTransport, ProxySettings, TransportError};
use crate::progress::ProgressCallback;
use crate::provider::{ReleaseProvider, Tagged, download_to_temp, null_as_default};
use crate::version::VersionError;

const PRIVATE_TOKEN: &str = "private-token";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GitLabTagRelease {
    #[serde(deserialize_with = "null_as_default")]
    pub tag_name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GitLabTag {
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    pub message: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub target: String,
    pub release: Option<GitLabTagRelease>,
}

impl Tagged for GitLabTag {
    fn tag_name(&self) -> &str {
        &self.name
    }
}

#[derive(Debug, Error)]
pub enum GitLabError {
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

impl GitLabError {
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
}

/// Release client for the GitLab tags API (`/api/v4` style base URLs).
#[derive(Debug, Clone)]
pub struct GitLabReleaseClient {
    transport: HttpTransport,
    project_id: String,
    max_tags: Option<u32>,
}

impl GitLabReleaseClient {
    #[must_use]
    pub fn new(base_url: &str) -> Self {
        Self {
            transport: HttpTransport::new(base_url),
            project_id: String::new(),
            max_tags: None,
        }
    }

    /// Numeric id or `namespace/project` path; the value is URL-encoded.
    pub fn set_project_id(&mut self, project_id: &str) -> &mut Self {
        self.project_id = urlencoding::encode(project_id.trim()).into_owned();
        self
    }

    pub fn set_max_tags(&mut self, max: Option<u32>) -> &mut Self {
        self.max_tags = max.filter(|max| *max > 0);
        self
    }

    /// Send `PRIVATE-TOKEN: {token}`. An empty token removes the header.
    ///
    /// # Errors
    /// Returns [`TransportError::InvalidConfig`] when the token cannot be sent
    /// as a header value.
    pub fn set_private_token(&mut self, token: &str) -> Result<&mut Self, TransportError> {
        let token = token.trim();
        if token.is_empty() {
            self.transport.remove_header(PRIVATE_TOKEN);
            return Ok(self);
        }

        let mut value = HeaderValue::from_str(token).map_err(|error| {
            TransportError::invalid_config(format!("invalid private token: {error}"))
        })?;
        value.set_sensitive(true);
        self.transport
            .insert_header(HeaderName::from_static(PRIVATE_TOKEN), value);
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

    /// Download the zip archive of the repository at `reference` (tag, branch
    /// or commit sha) into a temporary file.
    ///
    /// # Errors
    /// Returns [`GitLabError::RequestFailed`] when the download does not
    /// complete.
    pub async fn download_repository_archive(
        &self,
        reference: &str,
        on_progress: Option<ProgressCallback<'_>>,
    ) -> Result<PathBuf, GitLabError> {
        let path = self.archive_path(reference);
        info!("Downloading repository archive for {reference}");
        download_to_temp(&self.transport, &path, on_progress)
            .await
            .map_err(|response| {
                GitLabError::request_failed(
                    format!("failed to download repository archive for {reference}"),
                    response,
                )
            })
    }

    fn tags_path(&self) -> String {
        let mut path = format!(
            "projects/{}/repository/tags?order_by=updated&sort=desc",
            self.project_id
        );
        if let Some(max) = self.max_tags {
            path.push_str(&format!("&page=1&per_page={max}"));
        }
        path
    }

    fn archive_path(&self, reference: &str) -> String {
        format!(
            "projects/{}/repository/archive.zip?sha={}",
            self.project_id,
            urlencoding::encode(reference)
        )
    }
}

#[async_trait]
impl ReleaseProvider for GitLabReleaseClient {
    type Release = GitLabTag;
    type Error = GitLabError;

    async fn list_releases(&mut self) -> Result<Vec<GitLabTag>, GitLabError> {
        let path = self.tags_path();
        let response = self.transport.get_json::<Vec<GitLabTag>>(&path).await;

        if !response.is_success() || response.status != Some(StatusCode::OK) {
            return Err(GitLabError::request_failed(
                format!("failed to list tags of project {}", self.project_id),
                response,
            ));
        }

        let tags = response.body.unwrap_or_default();
        debug!(
            "GitLab returned {} tag(s) for project {}",
            tags.len(),
            self.project_id
        );
        Ok(tags)
    }

    async fn download_to_temp_file(
        &self,
        url: &str,
        on_progress: Option<ProgressCallback<'_>>,
    ) -> Result<PathBuf, GitLabError> {
        info!("Downloading {url}");
        download_to_temp(&self.transport, url, on_progress)
            .await
            .map_err(|response| {
                GitLabError::request_failed(format!("failed to download {url}"), response)
            })
    }
}
