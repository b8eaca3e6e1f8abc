use reqwest::StatusCode;
use tokio_util::sync::CancellationToken;

use super::TransportError;

/// Uniform outcome of one HTTP exchange.
///
/// `status` is filled whenever the server answered, including on failures
/// that happened after the response arrived (bad JSON, short body, ...).
#[derive(Debug)]
pub struct HttpResponse<T = ()> {
    pub status: Option<StatusCode>,
    pub status_text: String,
    pub body: Option<T>,
    pub error: Option<TransportError>,
}

impl<T> HttpResponse<T> {
    pub(crate) fn finish(
        status: Option<StatusCode>,
        result: Result<T, TransportError>,
        cancellation: Option<&CancellationToken>,
    ) -> Self {
        let (mut body, mut error) = match result {
            Ok(body) => (Some(body), None),
            Err(error) => (None, Some(error)),
        };

        let cancelled = cancellation.is_some_and(CancellationToken::is_cancelled);
        if cancelled && !error.as_ref().is_some_and(TransportError::is_cancelled) {
            body = None;
            error = Some(TransportError::Cancelled);
        }

        Self {
            status,
            status_text: status
                .and_then(|s| s.canonical_reason())
                .unwrap_or_default()
                .to_string(),
            body,
            error,
        }
    }

    /// True when no error was recorded and the server answered with 2xx.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.status.is_some_and(|status| status.is_success())
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.error.as_ref().is_some_and(TransportError::is_cancelled)
    }

    /// Take the failure detail out of an unsuccessful response. A 2xx answer
    /// that a caller still rejects is reported as a status failure.
    pub(crate) fn take_failure(&mut self) -> TransportError {
        self.error.take().unwrap_or_else(|| match self.status {
            Some(status) => TransportError::Status { status },
            None => TransportError::NoResponse,
        })
    }

    /// Short human readable summary, e.g. `404 Not Found` or the failure
    /// detail when no response arrived.
    #[must_use]
    pub fn describe(&self) -> String {
        match (self.status, &self.error) {
            (Some(status), _) if !self.status_text.is_empty() => {
                format!("{} {}", status.as_u16(), self.status_text)
            }
            (Some(status), _) => status.as_u16().to_string(),
            (None, Some(error)) => error.to_string(),
            (None, None) => "no response".to_string(),
        }
    }
}
