//! Sending of marshalled batches to an ingest endpoint.
//!
//! [`BatchTransport`] compresses a JSON document, attaches the ingest
//! headers and hands the request to an [`HttpPoster`]. It makes exactly one
//! post per call and never retries; the outcome is classified by
//! [`ResponseClassifier`].

use crate::batch::Batch;
use crate::response::{Response, ResponseClassifier, ResponseError};
use crate::telemetry::Telemetry;
use flate2::Compression;
use flate2::write::GzEncoder;
use std::future::Future;
use std::io::Write;

/// Default base `User-Agent` sent with every request.
pub const DEFAULT_USER_AGENT: &str =
    concat!("NewRelic-Rust-TelemetrySDK/", env!("CARGO_PKG_VERSION"));

/// Media type of every request body before compression.
pub const JSON_MEDIA_TYPE: &str = "application/json; charset=utf-8";

/// Builds the full `User-Agent`: the base agent, then a space and the
/// secondary agent when one is given.
pub fn build_user_agent(base: &str, secondary: Option<&str>) -> String {
    match secondary.map(str::trim).filter(|s| !s.is_empty()) {
        Some(secondary) => format!("{base} {secondary}"),
        None => base.to_string(),
    }
}

/// An outgoing POST.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    /// Target URL.
    pub url: String,
    /// Request headers, in the order they should be sent.
    pub headers: Vec<(String, String)>,
    /// Request body.
    pub body: Vec<u8>,
    /// Content type of the body.
    pub media_type: String,
}

impl HttpRequest {
    /// Returns the first header named `name`, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

/// A response received from the collector.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Status reason phrase.
    pub message: String,
    /// Response body.
    pub body: String,
    /// Response headers.
    pub headers: Vec<(String, String)>,
}

impl HttpResponse {
    /// Creates a response with no headers.
    pub fn new(status: u16, message: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            body: body.into(),
            headers: Vec::new(),
        }
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Returns the first header named `name`, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

/// Failure to obtain any response from the collector.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    /// The request timed out.
    #[error("request timed out")]
    Timeout(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The connection could not be established.
    #[error("failed to connect")]
    Connect(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// An I/O error occurred while sending or receiving.
    #[error("I/O error")]
    Io(#[from] std::io::Error),

    /// Any other transport failure.
    #[error("HTTP transport failed")]
    Other(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl HttpError {
    /// Wraps a timeout.
    pub fn timeout<E: std::error::Error + Send + Sync + 'static>(error: E) -> Self {
        Self::Timeout(Box::new(error))
    }

    /// Wraps a connection failure.
    pub fn connect<E: std::error::Error + Send + Sync + 'static>(error: E) -> Self {
        Self::Connect(Box::new(error))
    }

    /// Wraps any other transport failure.
    pub fn other<E: std::error::Error + Send + Sync + 'static>(error: E) -> Self {
        Self::Other(Box::new(error))
    }
}

/// Performs HTTP POST requests.
///
/// Implementations own timeouts, TLS and connection pooling. See
/// [`ReqwestPoster`](crate::http::ReqwestPoster) for the bundled adapter.
pub trait HttpPoster: Send + Sync {
    /// Sends `request` and returns the response, whatever its status code.
    fn post(
        &self,
        request: HttpRequest,
    ) -> impl Future<Output = Result<HttpResponse, HttpError>> + Send;
}

/// Posts marshalled batches to one ingest endpoint.
#[derive(Debug, Clone)]
pub struct BatchTransport<P> {
    poster: P,
    url: String,
    api_key: String,
    user_agent: String,
    audit_logging: bool,
}

impl<P: HttpPoster> BatchTransport<P> {
    /// Creates a transport posting to `url` with the default user agent.
    pub fn new(poster: P, url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            poster,
            url: url.into(),
            api_key: api_key.into(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            audit_logging: false,
        }
    }

    /// Replaces the `User-Agent` header value.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Logs every uncompressed payload at debug level when enabled.
    #[must_use]
    pub fn with_audit_logging(mut self, enabled: bool) -> Self {
        self.audit_logging = enabled;
        self
    }

    /// The endpoint URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// The `User-Agent` header value.
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// Sends `json`, the marshalled form of `batch`, and classifies the
    /// outcome.
    ///
    /// An empty batch is answered locally with
    /// [`Response::ignored_empty_batch`] and nothing is posted.
    ///
    /// # Errors
    ///
    /// Returns the [`ResponseError`] telling the caller how to react.
    pub async fn send<T: Telemetry>(
        &self,
        json: &str,
        batch: &Batch<T>,
    ) -> Result<Response, ResponseError> {
        if batch.is_empty() {
            tracing::debug!(kind = %T::KIND, "Skipping empty batch");
            return Ok(Response::ignored_empty_batch());
        }

        if self.audit_logging {
            tracing::debug!(
                kind = %T::KIND,
                request_id = %batch.request_id(),
                payload = json,
                "Sending batch"
            );
        }

        let body = match compress(json.as_bytes()) {
            Ok(body) => body,
            Err(error) => {
                tracing::error!(
                    error = %error,
                    request_id = %batch.request_id(),
                    "Failed to gzip batch payload, discarding"
                );
                return Err(ResponseError::DiscardBatch { status: None });
            }
        };

        let request = HttpRequest {
            url: self.url.clone(),
            headers: self.headers(batch),
            body,
            media_type: JSON_MEDIA_TYPE.to_string(),
        };

        tracing::debug!(
            kind = %T::KIND,
            count = batch.len(),
            request_id = %batch.request_id(),
            url = %self.url,
            "Posting batch"
        );

        ResponseClassifier::classify(self.poster.post(request).await)
    }

    fn headers<T: Telemetry>(&self, batch: &Batch<T>) -> Vec<(String, String)> {
        vec![
            ("Api-Key".to_string(), self.api_key.clone()),
            ("User-Agent".to_string(), self.user_agent.clone()),
            ("X-Request-Id".to_string(), batch.request_id().to_string()),
            ("Content-Encoding".to_string(), "gzip".to_string()),
        ]
    }
}

fn compress(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}
