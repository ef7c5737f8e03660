//! Error types for setting up telemetry senders.
//!
//! Send outcomes are reported separately as
//! [`ResponseError`](crate::response::ResponseError).

use crate::telemetry::BuildError;
use thiserror::Error;

/// A specialised Result type for crate operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while configuring the crate or building records.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error.
    #[error("configuration error")]
    Config(#[source] Box<figment::Error>),

    /// The HTTP client could not be created.
    #[error("failed to create HTTP client")]
    HttpClient(#[from] reqwest::Error),

    /// A record could not be built.
    #[error(transparent)]
    Build(#[from] BuildError),

    /// No API key is configured.
    #[error("no API key configured")]
    MissingApiKey,
}

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Error::Config(Box::new(err))
    }
}
