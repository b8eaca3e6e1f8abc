use std::future::Future;
use std::path::Path;
use std::time::Duration;

use futures_util::TryStreamExt;
use log::{debug, info, warn};
use reqwest::header::{
    ACCEPT, AUTHORIZATION, CONNECTION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue,
    USER_AGENT,
};
use reqwest::{Method, StatusCode, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;

use super::config::{
    AuthorizationScheme, LOCAL_HOSTS, ProxySettings, TransportConfig, basic_authorization,
    normalize_base_url,
};
use super::{HttpResponse, TransportError};
use crate::progress::{DownloadProgress, ProgressCallback};

const KEEP_ALIVE: &str = "keep-alive";
const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// HTTP request executor with a fluent, mutable configuration.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    config: TransportConfig,
}

impl HttpTransport {
    #[must_use]
    pub fn new(base_url: &str) -> Self {
        Self {
            config: TransportConfig::new(base_url),
        }
    }

    #[must_use]
    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    pub fn set_base_url(&mut self, base_url: &str) -> &mut Self {
        self.config.base_url = normalize_base_url(base_url);
        self
    }

    /// Route requests through a proxy; `None` goes direct.
    ///
    /// # Errors
    /// Returns [`TransportError::InvalidConfig`] when the proxy address is not
    /// a valid URL.
    pub fn set_proxy(&mut self, proxy: Option<ProxySettings>) -> Result<&mut Self, TransportError> {
        if let Some(settings) = &proxy {
            reqwest::Proxy::all(&settings.address).map_err(|error| {
                TransportError::invalid_config(format!(
                    "invalid proxy address '{}': {error}",
                    settings.address
                ))
            })?;
        }
        self.config.proxy = proxy;
        Ok(self)
    }

    /// Set the `Authorization` header value, e.g. `Token abc`.
    ///
    /// # Errors
    /// Returns [`TransportError::InvalidConfig`] when the value is not a valid
    /// header value.
    pub fn set_authorization(&mut self, value: &str) -> Result<&mut Self, TransportError> {
        if value.is_empty() {
            return Ok(self.clear_authorization());
        }
        let value = sensitive_header_value(value)?;
        self.config.challenge_authorization = None;
        self.config.headers.insert(AUTHORIZATION, value);
        Ok(self)
    }

    /// Send `Authorization: <scheme> <credentials>`. Empty credentials clear
    /// the header.
    ///
    /// # Errors
    /// Returns [`TransportError::InvalidConfig`] when the credentials are not
    /// a valid header value.
    pub fn set_authorization_scheme(
        &mut self,
        scheme: AuthorizationScheme,
        credentials: &str,
    ) -> Result<&mut Self, TransportError> {
        if credentials.is_empty() {
            return Ok(self.clear_authorization());
        }
        self.set_authorization(&scheme.header_value(credentials))
    }

    /// Authenticate with HTTP Basic credentials. When
    /// `send_before_challenge` is false the header is only sent on a single
    /// retry after the server answers `401`.
    ///
    /// # Errors
    /// Returns [`TransportError::InvalidConfig`] when the encoded value is not
    /// a valid header value.
    pub fn set_basic_authorization(
        &mut self,
        username: &str,
        password: &str,
        send_before_challenge: bool,
    ) -> Result<&mut Self, TransportError> {
        let value = basic_authorization(username, password);
        if send_before_challenge {
            return self.set_authorization(&value);
        }
        let value = sensitive_header_value(&value)?;
        self.config.headers.remove(AUTHORIZATION);
        self.config.challenge_authorization = Some(value);
        Ok(self)
    }

    pub fn clear_authorization(&mut self) -> &mut Self {
        self.config.headers.remove(AUTHORIZATION);
        self.config.challenge_authorization = None;
        self
    }

    /// Set a custom header. Names are case-insensitive and the last value set
    /// for a name wins. `content-type`, `accept`, `user-agent` and
    /// `keep-alive` override the built-in values.
    ///
    /// # Errors
    /// Returns [`TransportError::InvalidConfig`] for an invalid name or value.
    pub fn set_header(&mut self, name: &str, value: &str) -> Result<&mut Self, TransportError> {
        let name = HeaderName::from_bytes(name.trim().as_bytes()).map_err(|error| {
            TransportError::invalid_config(format!("invalid header name '{name}': {error}"))
        })?;
        let value = header_value(value)?;
        self.config.headers.insert(name, value);
        Ok(self)
    }

    /// Set several headers at once, in iteration order.
    ///
    /// # Errors
    /// Stops at and returns the first invalid header.
    pub fn set_headers<'a, I>(&mut self, headers: I) -> Result<&mut Self, TransportError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        for (name, value) in headers {
            self.set_header(name, value)?;
        }
        Ok(self)
    }

    pub fn remove_header(&mut self, name: &str) -> &mut Self {
        if let Ok(name) = HeaderName::from_bytes(name.trim().as_bytes()) {
            self.config.headers.remove(name);
        }
        self
    }

    pub(crate) fn insert_header(&mut self, name: HeaderName, value: HeaderValue) -> &mut Self {
        self.config.headers.insert(name, value);
        self
    }

    pub fn clear_headers(&mut self) -> &mut Self {
        self.config.headers.clear();
        self
    }

    /// # Errors
    /// Returns [`TransportError::InvalidConfig`] when the value is not a valid
    /// header value.
    pub fn set_user_agent(&mut self, user_agent: &str) -> Result<&mut Self, TransportError> {
        self.config.user_agent = header_value(user_agent)?;
        Ok(self)
    }

    /// Overall request timeout and per-read timeout; `None` means unbounded.
    pub fn set_timeouts(
        &mut self,
        timeout: Option<Duration>,
        read_timeout: Option<Duration>,
    ) -> &mut Self {
        self.config.timeout = timeout;
        self.config.read_timeout = read_timeout;
        self
    }

    pub fn set_buffer_size(&mut self, buffer_size: usize) -> &mut Self {
        self.config.buffer_size = buffer_size.max(1);
        self
    }

    pub fn set_cancellation_token(&mut self, token: Option<CancellationToken>) -> &mut Self {
        self.config.cancellation = token;
        self
    }

    /// Delete the destination of a failed or cancelled download instead of
    /// leaving the partial file behind.
    pub fn set_remove_partial_downloads(&mut self, remove: bool) -> &mut Self {
        self.config.remove_partial_downloads = remove;
        self
    }

    /// Resolve `path_or_url` against the base URL. Absolute `http(s)` URLs are
    /// used verbatim.
    ///
    /// # Errors
    /// Returns [`TransportError::InvalidConfig`] when no usable URL results.
    pub fn resolve_url(&self, path_or_url: &str) -> Result<Url, TransportError> {
        resolve_url(&self.config, path_or_url)
    }

    pub async fn get_json<O>(&self, path_or_url: &str) -> HttpResponse<O>
    where
        O: DeserializeOwned,
    {
        self.request_json::<(), O>(Method::GET, path_or_url, None)
            .await
    }

    /// Send a request with an optional JSON body and deserialize a JSON
    /// answer. The body is decoded with the charset the server declared,
    /// falling back to UTF-8.
    pub async fn request_json<I, O>(
        &self,
        method: Method,
        path_or_url: &str,
        input: Option<&I>,
    ) -> HttpResponse<O>
    where
        I: Serialize + ?Sized,
        O: DeserializeOwned,
    {
        let config = self.config.clone();
        let mut status = None;
        let result = exchange_json(&config, method, path_or_url, input, &mut status).await;
        HttpResponse::finish(status, result, config.cancellation.as_ref())
    }

    /// Stream `path_or_url` into `destination`, creating parent directories.
    ///
    /// `on_progress` runs after every chunk. The cancellation token is checked
    /// after every chunk as well.
    pub async fn download_to_file(
        &self,
        path_or_url: &str,
        destination: &Path,
        on_progress: Option<ProgressCallback<'_>>,
    ) -> HttpResponse {
        let config = self.config.clone();
        let mut status = None;
        let result =
            exchange_download(&config, path_or_url, destination, on_progress, &mut status).await;

        if result.is_err() && config.remove_partial_downloads && destination.is_file() {
            match tokio::fs::remove_file(destination).await {
                Ok(()) => debug!("Removed partial download {}", destination.display()),
                Err(error) => warn!(
                    "Failed to remove partial download {}: {error}",
                    destination.display()
                ),
            }
        }

        HttpResponse::finish(status, result, config.cancellation.as_ref())
    }
}

async fn exchange_json<I, O>(
    config: &TransportConfig,
    method: Method,
    path_or_url: &str,
    input: Option<&I>,
    status: &mut Option<StatusCode>,
) -> Result<O, TransportError>
where
    I: Serialize + ?Sized,
    O: DeserializeOwned,
{
    let body = input
        .map(serde_json::to_vec)
        .transpose()
        .map_err(TransportError::Serialize)?;

    let response = send(config, method, path_or_url, body).await?;
    *status = Some(response.status());
    ensure_success(response.status())?;

    let text = cancellable(config.cancellation.as_ref(), response.text())
        .await?
        .map_err(|error| TransportError::request("failed to read response body", error))?;
    serde_json::from_str(&text).map_err(TransportError::Deserialize)
}

async fn exchange_download(
    config: &TransportConfig,
    path_or_url: &str,
    destination: &Path,
    mut on_progress: Option<ProgressCallback<'_>>,
    status: &mut Option<StatusCode>,
) -> Result<(), TransportError> {
    if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(|error| {
            TransportError::io("failed to create download directory", parent, error)
        })?;
    }

    let response = send(config, Method::GET, path_or_url, None).await?;
    *status = Some(response.status());
    ensure_success(response.status())?;

    let total = response.content_length().unwrap_or(0);
    let mut file = tokio::fs::File::create(destination).await.map_err(|error| {
        TransportError::io("failed to create download file", destination, error)
    })?;

    let reader = StreamReader::new(response.bytes_stream().map_err(std::io::Error::other));
    tokio::pin!(reader);
    let mut buffer = vec![0_u8; config.buffer_size.max(1)];
    let mut done: u64 = 0;
    let token = config.cancellation.as_ref();

    loop {
        let read = match cancellable(token, reader.read(&mut buffer)).await? {
            Ok(read) => read,
            Err(error) if total > 0 && done < total => {
                warn!("Download of {path_or_url} ended after {done} of {total} bytes: {error}");
                return Err(TransportError::IncompleteTransfer {
                    expected: total,
                    received: done,
                });
            }
            Err(error) => return Err(TransportError::Body(error)),
        };
        if read == 0 {
            break;
        }

        file.write_all(&buffer[..read]).await.map_err(|error| {
            TransportError::io("failed to write download data", destination, error)
        })?;
        done += read as u64;

        if let Some(callback) = on_progress.as_deref_mut() {
            callback(DownloadProgress::new(total, done));
        }
        if token.is_some_and(CancellationToken::is_cancelled) {
            file.flush().await.ok();
            info!("Download of {path_or_url} cancelled after {done} bytes");
            return Err(TransportError::Cancelled);
        }
    }

    file.flush().await.map_err(|error| {
        TransportError::io("failed to flush download file", destination, error)
    })?;

    if total > 0 && done != total {
        return Err(TransportError::IncompleteTransfer {
            expected: total,
            received: done,
        });
    }

    debug!("Downloaded {done} bytes to {}", destination.display());
    Ok(())
}

async fn send(
    config: &TransportConfig,
    method: Method,
    path_or_url: &str,
    body: Option<Vec<u8>>,
) -> Result<reqwest::Response, TransportError> {
    let url = resolve_url(config, path_or_url)?;
    let mut challenge = Challenge::default();
    let mut response = send_once(config, &method, &url, body.clone(), challenge).await?;

    let proxy_challenge_pending = config.proxy.as_ref().is_some_and(|proxy| {
        proxy.credentials.is_some() && !proxy.send_credentials_before_challenge
    });
    if response.status() == StatusCode::PROXY_AUTHENTICATION_REQUIRED && proxy_challenge_pending {
        debug!("Proxy requested authentication for {url}, retrying with credentials");
        challenge.proxy = true;
        response = send_once(config, &method, &url, body.clone(), challenge).await?;
    }

    if response.status() == StatusCode::UNAUTHORIZED && config.challenge_authorization.is_some() {
        debug!("Server requested authentication for {url}, retrying with credentials");
        challenge.server = true;
        response = send_once(config, &method, &url, body, challenge).await?;
    }

    Ok(response)
}

/// Authentication challenges already received for the current request.
#[derive(Debug, Clone, Copy, Default)]
struct Challenge {
    proxy: bool,
    server: bool,
}

async fn send_once(
    config: &TransportConfig,
    method: &Method,
    url: &Url,
    body: Option<Vec<u8>>,
    challenge: Challenge,
) -> Result<reqwest::Response, TransportError> {
    let client = build_client(config, challenge.proxy)?;
    debug!("{method} {url}");

    let mut headers = request_headers(config, body.is_some());
    if challenge.server
        && let Some(value) = &config.challenge_authorization
    {
        headers.insert(AUTHORIZATION, value.clone());
    }

    let mut request = client.request(method.clone(), url.clone()).headers(headers);
    if let Some(body) = body {
        request = request.body(body);
    }

    cancellable(config.cancellation.as_ref(), request.send())
        .await?
        .map_err(|error| TransportError::request("request failed", error))
}

fn build_client(
    config: &TransportConfig,
    answer_proxy_challenge: bool,
) -> Result<reqwest::Client, TransportError> {
    let mut builder = reqwest::Client::builder();
    if let Some(timeout) = config.timeout {
        builder = builder.timeout(timeout);
    }
    if let Some(read_timeout) = config.read_timeout {
        builder = builder.read_timeout(read_timeout);
    }

    if let Some(settings) = &config.proxy {
        let mut proxy = reqwest::Proxy::all(&settings.address).map_err(|error| {
            TransportError::invalid_config(format!(
                "invalid proxy address '{}': {error}",
                settings.address
            ))
        })?;
        if settings.bypass_on_local {
            proxy = proxy.no_proxy(reqwest::NoProxy::from_string(LOCAL_HOSTS));
        }
        if (settings.send_credentials_before_challenge || answer_proxy_challenge)
            && let Some(credentials) = settings.basic_authorization()
        {
            proxy = proxy.custom_http_auth(sensitive_header_value(&credentials)?);
        }
        builder = builder.proxy(proxy);
    }

    builder
        .build()
        .map_err(|error| TransportError::request("failed to build HTTP client", error))
}

fn request_headers(config: &TransportConfig, has_json_body: bool) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, config.user_agent.clone());
    headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
    if has_json_body {
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE));
    }

    for (name, value) in &config.headers {
        if name.as_str() == KEEP_ALIVE {
            let keep_alive = value
                .to_str()
                .ok()
                .and_then(|v| v.trim().to_ascii_lowercase().parse::<bool>().ok())
                .unwrap_or(false);
            if !keep_alive {
                headers.insert(CONNECTION, HeaderValue::from_static("close"));
            }
            continue;
        }
        headers.insert(name.clone(), value.clone());
    }

    headers
}

fn resolve_url(config: &TransportConfig, path_or_url: &str) -> Result<Url, TransportError> {
    let path_or_url = path_or_url.trim();
    let lowered = path_or_url.to_ascii_lowercase();
    let raw = if lowered.starts_with("http://") || lowered.starts_with("https://") {
        path_or_url.to_string()
    } else {
        format!("{}{}", config.base_url, path_or_url.trim_start_matches('/'))
    };

    if raw.is_empty() {
        return Err(TransportError::invalid_config("url can't be empty"));
    }
    Url::parse(&raw)
        .map_err(|error| TransportError::invalid_config(format!("invalid url '{raw}': {error}")))
}

fn ensure_success(status: StatusCode) -> Result<(), TransportError> {
    if status.is_success() {
        Ok(())
    } else {
        Err(TransportError::Status { status })
    }
}

fn header_value(value: &str) -> Result<HeaderValue, TransportError> {
    HeaderValue::from_str(value)
        .map_err(|error| TransportError::invalid_config(format!("invalid header value: {error}")))
}

fn sensitive_header_value(value: &str) -> Result<HeaderValue, TransportError> {
    let mut value = header_value(value)?;
    value.set_sensitive(true);
    Ok(value)
}

async fn cancellable<F>(
    token: Option<&CancellationToken>,
    future: F,
) -> Result<F::Output, TransportError>
where
    F: Future,
{
    match token {
        Some(token) => tokio::select! {
            biased;
            () = token.cancelled() => Err(TransportError::Cancelled),
            output = future => Ok(output),
        },
        None => Ok(future.await),
    }
}
