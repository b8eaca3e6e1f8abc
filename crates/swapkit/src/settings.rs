use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use swapkit_core::http::{DEFAULT_BUFFER_SIZE, ProxySettings};
use swapkit_platform::AppPaths;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Could not read settings file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid settings file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    GitHub,
    GitLab,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxySetting {
    pub address: String,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    #[serde(default)]
    pub bypass_on_local: bool,
}

impl ProxySetting {
    #[must_use]
    pub fn to_proxy_settings(&self) -> ProxySettings {
        let proxy = ProxySettings::new(self.address.trim()).with_bypass_on_local(self.bypass_on_local);
        match &self.username {
            Some(username) if !username.is_empty() => {
                proxy.with_credentials(username, self.password.clone().unwrap_or_default())
            }
            _ => proxy,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSettings {
    #[serde(default)]
    pub provider: ProviderKind,

    #[serde(default = "default_github_api_url")]
    pub github_api_url: String,

    #[serde(default)]
    pub github_owner: String,

    #[serde(default)]
    pub github_repo: String,

    #[serde(default = "default_gitlab_base_url")]
    pub gitlab_base_url: String,

    #[serde(default)]
    pub gitlab_project_id: String,

    #[serde(default)]
    pub token: Option<String>,

    #[serde(default)]
    pub proxy: Option<ProxySetting>,

    #[serde(default)]
    pub max_releases: Option<u32>,

    /// Caps the whole exchange, body streaming included.
    #[serde(default)]
    pub http_timeout_secs: u64,

    #[serde(default = "default_read_timeout")]
    pub read_timeout_secs: u64,

    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,

    #[serde(default)]
    pub asset_name: Option<String>,

    #[serde(default)]
    pub helper_sub_directory: Option<String>,

    #[serde(default)]
    pub debug_logging: bool,

    #[serde(default = "default_max_log_size_bytes")]
    pub max_log_size_bytes: u64,
}

fn default_github_api_url() -> String {
    swapkit_core::github::DEFAULT_API_URL.to_string()
}

fn default_gitlab_base_url() -> String {
    "https://gitlab.com/api/v4".to_string()
}

fn default_read_timeout() -> u64 {
    30
}

fn default_buffer_size() -> usize {
    DEFAULT_BUFFER_SIZE
}

fn default_max_log_size_bytes() -> u64 {
    5 * 1024 * 1024
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            provider: ProviderKind::GitHub,
            github_api_url: default_github_api_url(),
            github_owner: String::new(),
            github_repo: String::new(),
            gitlab_base_url: default_gitlab_base_url(),
            gitlab_project_id: String::new(),
            token: None,
            proxy: None,
            max_releases: None,
            http_timeout_secs: 0,
            read_timeout_secs: default_read_timeout(),
            buffer_size: default_buffer_size(),
            asset_name: None,
            helper_sub_directory: None,
            debug_logging: false,
            max_log_size_bytes: default_max_log_size_bytes(),
        }
    }
}

impl AppSettings {
    /// Load settings from `path`, or from the platform settings file.
    /// Anything unreadable falls back to defaults; the error is returned
    /// alongside so the caller can log it once logging is up.
    pub fn load(path: Option<&Path>) -> (Self, Option<SettingsError>) {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match AppPaths::new() {
                Ok(paths) => paths.settings_file(),
                Err(_) => return (Self::default(), None),
            },
        };

        if !path.exists() {
            return (Self::default(), None);
        }
        match Self::load_from(&path) {
            Ok(settings) => (settings, None),
            Err(error) => (Self::default(), Some(error)),
        }
    }

    /// # Errors
    /// Returns [`SettingsError`] when the file cannot be read or parsed.
    pub fn load_from(path: &Path) -> Result<Self, SettingsError> {
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Overall request timeout; `0` disables it.
    #[must_use]
    pub fn http_timeout(&self) -> Option<Duration> {
        (self.http_timeout_secs > 0).then(|| Duration::from_secs(self.http_timeout_secs))
    }

    #[must_use]
    pub fn read_timeout(&self) -> Option<Duration> {
        (self.read_timeout_secs > 0).then(|| Duration::from_secs(self.read_timeout_secs))
    }

    #[must_use]
    pub fn token(&self) -> Option<&str> {
        self.token
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty())
    }
}
