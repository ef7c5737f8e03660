//! [`HttpPoster`] over `reqwest`.

use crate::transport::{HttpError, HttpPoster, HttpRequest, HttpResponse};
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use std::time::Duration;

/// Posts requests with a pooled `reqwest` client.
#[derive(Debug, Clone)]
pub struct ReqwestPoster {
    client: Client,
}

impl ReqwestPoster {
    /// Creates a poster whose requests time out after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    /// Wraps an existing client.
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

impl HttpPoster for ReqwestPoster {
    async fn post(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        let mut builder = self
            .client
            .post(request.url.as_str())
            .header(CONTENT_TYPE, request.media_type.as_str())
            .body(request.body);

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.send().await.map_err(map_error)?;

        let status = response.status();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_string(), value.to_string()))
            })
            .collect();
        let body = match response.text().await {
            Ok(body) => body,
            Err(error) => {
                tracing::debug!(
                    status = status.as_u16(),
                    error = %error,
                    "Failed to read response body"
                );
                String::new()
            }
        };

        Ok(HttpResponse {
            status: status.as_u16(),
            message: status.canonical_reason().unwrap_or_default().to_string(),
            body,
            headers,
        })
    }
}

fn map_error(error: reqwest::Error) -> HttpError {
    if error.is_timeout() {
        HttpError::timeout(error)
    } else if error.is_connect() {
        HttpError::connect(error)
    } else {
        HttpError::other(error)
    }
}
