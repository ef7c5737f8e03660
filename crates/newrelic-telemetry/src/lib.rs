//! Client core for the New Relic ingest APIs.
//!
//! Telemetry records (metrics, spans, events and logs) are collected into a
//! [`Buffer`], drained into immutable [`Batch`]es, rendered to the ingest
//! JSON format by [`BatchMarshaller`] and posted gzip-compressed by a
//! [`BatchTransport`]. Every send returns either a [`Response`] or a
//! [`ResponseError`] telling the caller how to react: split and resend,
//! wait and resend, back off and resend, or give up.
//!
//! The core never retries. [`TelemetryClient`] is an optional driver that
//! reacts to each outcome on background tokio tasks.
//!
//! ```no_run
//! use newrelic_telemetry::{
//!     Attributes, BatchSender, Buffer, Config, Gauge, Metric, MetricBatchSender, Result, now_ms,
//! };
//!
//! # async fn run() -> Result<()> {
//! let config = Config::load()?;
//! let sender: MetricBatchSender = BatchSender::from_config(&config)?;
//!
//! let buffer: Buffer<Metric> = Buffer::new(Attributes::new().put("host", "web-1"));
//! let gauge = Gauge::new("cpu.load", 0.42, now_ms(), Attributes::new())?;
//! buffer.add(gauge.into());
//!
//! match sender.send_batch(&buffer.create_batch()).await {
//!     Ok(response) => println!("accepted: {}", response.status_code),
//!     Err(reaction) => println!("not accepted: {reaction}"),
//! }
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod attributes;
pub mod backoff;
pub mod batch;
pub mod buffer;
pub mod client;
pub mod config;
pub mod encoder;
pub mod error;
pub mod http;
pub mod ingest;
pub mod marshaller;
pub mod response;
pub mod sender;
pub mod telemetry;
pub mod transport;

pub use attributes::{
    AttributeError, AttributeValue, Attributes, AttributesEncoder, CommonAttributesBuilder,
    INSTRUMENTATION_PROVIDER, SERVICE_NAME, merge,
};
pub use backoff::Backoff;
pub use batch::Batch;
pub use buffer::{Buffer, DEFAULT_MAX_UNCOMPRESSED_BATCH_BYTES};
pub use client::TelemetryClient;
pub use config::{
    BackoffConfig, Config, ConfigBuilder, DEFAULT_MAX_PENDING_RECORDS, EndpointsConfig,
};
pub use error::{Error, Result};
pub use http::ReqwestPoster;
pub use ingest::IngestWarnings;
pub use marshaller::{BatchMarshaller, Marshalled};
pub use response::{Response, ResponseClassifier, ResponseError};
pub use sender::{
    BatchSender, EventBatchSender, LogBatchSender, MetricBatchSender, SpanBatchSender,
};
pub use telemetry::{
    BuildError, Count, Event, Gauge, Log, LogBuilder, Metric, Span, SpanBuilder, Summary,
    Telemetry, TelemetryKind, now_ms,
};
pub use transport::{
    BatchTransport, DEFAULT_USER_AGENT, HttpError, HttpPoster, HttpRequest, HttpResponse,
    build_user_agent,
};
