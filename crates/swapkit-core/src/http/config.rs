use std::fmt;
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::header::{HeaderMap, HeaderValue};
use tokio_util::sync::CancellationToken;

pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

/// Scheme written in front of the credentials of an `Authorization` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizationScheme {
    Basic,
    Bearer,
    /// GitHub personal access tokens.
    Token,
}

impl AuthorizationScheme {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Basic => "Basic",
            Self::Bearer => "Bearer",
            Self::Token => "Token",
        }
    }

    /// Full header value for `credentials`.
    #[must_use]
    pub fn header_value(self, credentials: &str) -> String {
        format!("{} {credentials}", self.as_str())
    }
}

impl fmt::Display for AuthorizationScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `Basic base64(user:pass)`.
#[must_use]
pub fn basic_authorization(username: &str, password: &str) -> String {
    AuthorizationScheme::Basic.header_value(&BASE64.encode(format!("{username}:{password}")))
}

/// Hosts that skip the proxy when [`ProxySettings::bypass_on_local`] is set.
pub(crate) const LOCAL_HOSTS: &str = "localhost,127.0.0.1,::1";

#[derive(Clone, PartialEq, Eq)]
pub struct ProxyCredentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for ProxyCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxySettings {
    pub address: String,
    pub credentials: Option<ProxyCredentials>,
    pub bypass_on_local: bool,
    /// Attach `Proxy-Authorization` to every request instead of waiting for a
    /// `407` challenge.
    pub send_credentials_before_challenge: bool,
}

impl ProxySettings {
    #[must_use]
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            credentials: None,
            bypass_on_local: false,
            send_credentials_before_challenge: true,
        }
    }

    #[must_use]
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.credentials = Some(ProxyCredentials {
            username: username.into(),
            password: password.into(),
        });
        self
    }

    #[must_use]
    pub fn with_bypass_on_local(mut self, bypass: bool) -> Self {
        self.bypass_on_local = bypass;
        self
    }

    #[must_use]
    pub fn with_send_credentials_before_challenge(mut self, send: bool) -> Self {
        self.send_credentials_before_challenge = send;
        self
    }

    /// `Basic base64(user:pass)` for the configured credentials.
    #[must_use]
    pub fn basic_authorization(&self) -> Option<String> {
        self.credentials
            .as_ref()
            .map(|credentials| basic_authorization(&credentials.username, &credentials.password))
    }
}

/// Snapshot of everything a request needs. Each request clones the current
/// configuration, so later changes never reach in-flight calls.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub(crate) base_url: String,
    pub(crate) proxy: Option<ProxySettings>,
    pub(crate) headers: HeaderMap,
    /// `Authorization` value held back until the server answers `401`.
    pub(crate) challenge_authorization: Option<HeaderValue>,
    pub(crate) user_agent: HeaderValue,
    pub(crate) timeout: Option<Duration>,
    pub(crate) read_timeout: Option<Duration>,
    pub(crate) buffer_size: usize,
    pub(crate) cancellation: Option<CancellationToken>,
    pub(crate) remove_partial_downloads: bool,
}

impl TransportConfig {
    pub(crate) fn new(base_url: &str) -> Self {
        Self {
            base_url: normalize_base_url(base_url),
            proxy: None,
            headers: HeaderMap::new(),
            challenge_authorization: None,
            user_agent: HeaderValue::from_static(concat!("swapkit/", env!("CARGO_PKG_VERSION"))),
            timeout: None,
            read_timeout: None,
            buffer_size: DEFAULT_BUFFER_SIZE,
            cancellation: None,
            remove_partial_downloads: false,
        }
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[must_use]
    pub fn proxy(&self) -> Option<&ProxySettings> {
        self.proxy.as_ref()
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    #[must_use]
    pub fn sends_authorization_on_challenge(&self) -> bool {
        self.challenge_authorization.is_some()
    }

    #[must_use]
    pub fn timeouts(&self) -> (Option<Duration>, Option<Duration>) {
        (self.timeout, self.read_timeout)
    }

    #[must_use]
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    #[must_use]
    pub fn remove_partial_downloads(&self) -> bool {
        self.remove_partial_downloads
    }
}

pub(crate) fn normalize_base_url(base_url: &str) -> String {
    let trimmed = base_url.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{trimmed}/")
    }
}
