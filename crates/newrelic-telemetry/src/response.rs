//! Classification of collector responses.
//!
//! Every send ends in exactly one outcome: a successful [`Response`] or a
//! [`ResponseError`] naming the reaction the caller should take.

use crate::transport::{HttpError, HttpResponse};
use std::time::Duration;

/// Status codes that mean the batch will never be accepted as sent.
const DISCARD_STATUSES: [u16; 6] = [400, 401, 403, 404, 405, 411];

const PAYLOAD_TOO_LARGE: u16 = 413;
const TOO_MANY_REQUESTS: u16 = 429;

/// A successful ingest response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// HTTP status code.
    pub status_code: u16,
    /// Status reason phrase.
    pub status_message: String,
    /// Response body.
    pub body: String,
}

impl Response {
    /// Creates a response.
    pub fn new(
        status_code: u16,
        status_message: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            status_code,
            status_message: status_message.into(),
            body: body.into(),
        }
    }

    /// The synthetic response returned for empty batches, which are never
    /// posted.
    pub fn ignored_empty_batch() -> Self {
        Self::new(202, "Ignored", "Empty batch")
    }
}

/// The reaction a caller must take after a failed send.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum ResponseError {
    /// The payload was too large. Split the batch and send each half.
    #[error("payload too large, split the batch and retry")]
    RetryWithSplit,

    /// The collector asked for the batch to be resent after `wait`.
    #[error("collector requested a retry after {wait:?}")]
    RetryWithRequestedWait {
        /// How long to wait before resending.
        wait: Duration,
    },

    /// Resend later using the caller's backoff policy.
    #[error("send failed, retry with backoff (status {status:?})")]
    RetryWithBackoff {
        /// Status code, absent when no response was received.
        status: Option<u16>,
        /// Transport failure, when one caused this outcome.
        #[source]
        source: Option<HttpError>,
    },

    /// The batch can never be accepted and should be dropped.
    #[error("batch rejected, discard it (status {status:?})")]
    DiscardBatch {
        /// Status code, absent when the batch failed before sending.
        status: Option<u16>,
    },
}

impl ResponseError {
    /// Returns true for outcomes that warrant resending the batch.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::DiscardBatch { .. })
    }
}

/// Maps the result of one HTTP exchange to its outcome.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseClassifier;

impl ResponseClassifier {
    /// Classifies a post result.
    ///
    /// | Condition | Outcome |
    /// |-----------|---------|
    /// | 2xx | `Ok` |
    /// | 400, 401, 403, 404, 405, 411 | [`ResponseError::DiscardBatch`] |
    /// | 413 | [`ResponseError::RetryWithSplit`] |
    /// | 429 or 5xx with integer `Retry-After` | [`ResponseError::RetryWithRequestedWait`] |
    /// | anything else, including transport errors | [`ResponseError::RetryWithBackoff`] |
    ///
    /// # Errors
    ///
    /// Returns the reaction for every non-2xx status and transport failure.
    pub fn classify(result: Result<HttpResponse, HttpError>) -> Result<Response, ResponseError> {
        let response = match result {
            Ok(response) => response,
            Err(error) => {
                tracing::warn!(error = %error, "IO error sending batch, retry with backoff");
                return Err(ResponseError::RetryWithBackoff {
                    status: None,
                    source: Some(error),
                });
            }
        };

        let status = response.status;
        match status {
            200..=299 => Ok(Response::new(status, response.message, response.body)),
            _ if DISCARD_STATUSES.contains(&status) => {
                tracing::warn!(status, body = %response.body, "Batch rejected, discarding");
                Err(ResponseError::DiscardBatch {
                    status: Some(status),
                })
            }
            PAYLOAD_TOO_LARGE => {
                tracing::warn!(status, "Payload too large, batch should be split");
                Err(ResponseError::RetryWithSplit)
            }
            TOO_MANY_REQUESTS | 500..=599 => match retry_after(&response) {
                Some(wait) => {
                    tracing::warn!(
                        status,
                        wait_secs = wait.as_secs(),
                        "Collector requested retry after wait"
                    );
                    Err(ResponseError::RetryWithRequestedWait { wait })
                }
                None => {
                    tracing::error!(
                        status,
                        body = %response.body,
                        "Server error, retry with backoff"
                    );
                    Err(ResponseError::RetryWithBackoff {
                        status: Some(status),
                        source: None,
                    })
                }
            },
            _ => {
                tracing::error!(
                    status,
                    body = %response.body,
                    "Unexpected status, retry with backoff"
                );
                Err(ResponseError::RetryWithBackoff {
                    status: Some(status),
                    source: None,
                })
            }
        }
    }
}

fn retry_after(response: &HttpResponse) -> Option<Duration> {
    let value = response.header("Retry-After")?;
    match value.trim().parse::<u64>() {
        Ok(secs) => Some(Duration::from_secs(secs)),
        Err(_) => {
            tracing::debug!(value, "Ignoring unparseable Retry-After header");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    fn status(code: u16) -> Result<HttpResponse, HttpError> {
        Ok(HttpResponse::new(code, "Status", "body"))
    }

    fn with_retry_after(code: u16, value: &str) -> Result<HttpResponse, HttpError> {
        Ok(HttpResponse::new(code, "Status", "").with_header("retry-after", value))
    }

    #[test]
    fn test_success_statuses() {
        let response =
            ResponseClassifier::classify(Ok(HttpResponse::new(202, "Accepted", "{}"))).unwrap();
        assert_eq!(response, Response::new(202, "Accepted", "{}"));
        assert!(ResponseClassifier::classify(status(200)).is_ok());
        assert!(ResponseClassifier::classify(status(299)).is_ok());
    }

    #[test]
    fn test_discard_statuses() {
        for code in [400, 401, 403, 404, 405, 411] {
            let error = ResponseClassifier::classify(status(code)).unwrap_err();
            assert!(
                matches!(error, ResponseError::DiscardBatch { status: Some(c) } if c == code),
                "status {code}"
            );
            assert!(!error.is_retryable());
        }
    }

    #[test]
    fn test_payload_too_large_splits() {
        assert!(matches!(
            ResponseClassifier::classify(status(413)),
            Err(ResponseError::RetryWithSplit)
        ));
    }

    #[test]
    fn test_retry_after_is_honoured() {
        let error = ResponseClassifier::classify(with_retry_after(429, "7")).unwrap_err();
        assert!(matches!(
            error,
            ResponseError::RetryWithRequestedWait { wait } if wait == Duration::from_secs(7)
        ));

        let error = ResponseClassifier::classify(with_retry_after(503, " 2 ")).unwrap_err();
        assert!(matches!(
            error,
            ResponseError::RetryWithRequestedWait { wait } if wait == Duration::from_secs(2)
        ));
    }

    #[test]
    fn test_missing_or_invalid_retry_after_backs_off() {
        for result in [
            status(429),
            status(500),
            with_retry_after(429, "soon"),
            with_retry_after(503, "Wed, 21 Oct 2015 07:28:00 GMT"),
        ] {
            let error = ResponseClassifier::classify(result).unwrap_err();
            assert!(matches!(
                error,
                ResponseError::RetryWithBackoff { status: Some(_), source: None }
            ));
        }
    }

    #[test]
    fn test_unexpected_statuses_back_off() {
        for code in [100, 302, 408, 418, 600] {
            let error = ResponseClassifier::classify(status(code)).unwrap_err();
            assert!(
                matches!(
                    error,
                    ResponseError::RetryWithBackoff { status: Some(c), .. } if c == code
                ),
                "status {code}"
            );
            assert!(error.is_retryable());
        }
    }

    #[test]
    fn test_transport_error_carries_cause() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        let error = ResponseClassifier::classify(Err(HttpError::Io(io))).unwrap_err();

        assert!(matches!(
            error,
            ResponseError::RetryWithBackoff { status: None, source: Some(HttpError::Io(_)) }
        ));
        assert!(error.source().is_some());
    }

    #[test]
    fn test_ignored_empty_batch() {
        let response = Response::ignored_empty_batch();
        assert_eq!(response.status_code, 202);
        assert_eq!(response.status_message, "Ignored");
        assert_eq!(response.body, "Empty batch");
    }
}
