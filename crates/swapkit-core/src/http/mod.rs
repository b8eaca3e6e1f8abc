//! Generic HTTP transport used by the release clients.
//!
//! Requests never fail with an `Err` for network or remote problems; they
//! return an [`HttpResponse`] that carries the status and failure detail.

mod config;
mod error;
mod response;
mod transport;

pub use config::{
    AuthorizationScheme, DEFAULT_BUFFER_SIZE, ProxyCredentials, ProxySettings, TransportConfig,
    basic_authorization,
};
pub use error::TransportError;
pub use reqwest::{Method, StatusCode};
pub use response::HttpResponse;
pub use transport::HttpTransport;
