//! Per-kind batch senders.

use crate::batch::Batch;
use crate::config::Config;
use crate::error::Result;
use crate::http::ReqwestPoster;
use crate::marshaller::BatchMarshaller;
use crate::response::{Response, ResponseError};
use crate::telemetry::{Event, Log, Metric, Span, Telemetry};
use crate::transport::{BatchTransport, HttpPoster};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};

/// Sends batches of metrics.
pub type MetricBatchSender<P = ReqwestPoster> = BatchSender<Metric, P>;
/// Sends batches of spans.
pub type SpanBatchSender<P = ReqwestPoster> = BatchSender<Span, P>;
/// Sends batches of events.
pub type EventBatchSender<P = ReqwestPoster> = BatchSender<Event, P>;
/// Sends batches of logs.
pub type LogBatchSender<P = ReqwestPoster> = BatchSender<Log, P>;

/// Marshals and sends batches of one telemetry kind.
///
/// Each call to [`send_batch`](Self::send_batch) makes at most one request
/// and reports its outcome unchanged. Retrying is the caller's job, see
/// [`TelemetryClient`](crate::client::TelemetryClient).
#[derive(Debug)]
pub struct BatchSender<T, P> {
    transport: BatchTransport<P>,
    dropped: AtomicU64,
    _kind: PhantomData<fn() -> T>,
}

impl<T: Telemetry> BatchSender<T, ReqwestPoster> {
    /// Creates a sender posting with `reqwest` to the endpoint configured
    /// for this telemetry kind.
    ///
    /// # Errors
    ///
    /// Returns an error if no API key is configured or the HTTP client
    /// cannot be created.
    pub fn from_config(config: &Config) -> Result<Self> {
        let poster = ReqwestPoster::new(config.timeout)?;
        Self::with_poster(poster, config)
    }
}

impl<T: Telemetry, P: HttpPoster> BatchSender<T, P> {
    /// Creates a sender over an existing transport.
    pub fn new(transport: BatchTransport<P>) -> Self {
        Self {
            transport,
            dropped: AtomicU64::new(0),
            _kind: PhantomData,
        }
    }

    /// Creates a sender posting through `poster` with settings from
    /// `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if no API key is configured.
    pub fn with_poster(poster: P, config: &Config) -> Result<Self> {
        let api_key = config.require_api_key()?;
        let url = config.endpoints.for_kind(T::KIND);

        tracing::debug!(kind = %T::KIND, url, "Creating batch sender");

        let transport = BatchTransport::new(poster, url, api_key)
            .with_user_agent(config.full_user_agent())
            .with_audit_logging(config.audit_logging);
        Ok(Self::new(transport))
    }

    /// Marshals and sends `batch`.
    ///
    /// An empty batch is never marshalled or posted and yields
    /// [`Response::ignored_empty_batch`].
    ///
    /// # Errors
    ///
    /// Returns the [`ResponseError`] telling the caller how to react.
    pub async fn send_batch(
        &self,
        batch: &Batch<T>,
    ) -> std::result::Result<Response, ResponseError> {
        if batch.is_empty() {
            tracing::debug!(kind = %T::KIND, "Tried to send an empty batch");
            return Ok(Response::ignored_empty_batch());
        }

        tracing::debug!(kind = %T::KIND, count = batch.len(), "Sending batch");

        let rendered = BatchMarshaller::render(batch);
        if rendered.dropped > 0 {
            self.dropped.fetch_add(rendered.dropped as u64, Ordering::Relaxed);
        }

        self.transport.send(&rendered.json, batch).await
    }

    /// Total records excluded from payloads because they could not be
    /// encoded.
    pub fn dropped_records(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// The underlying transport.
    pub fn transport(&self) -> &BatchTransport<P> {
        &self.transport
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::Attributes;
    use crate::config::DEFAULT_LOGS_ENDPOINT;
    use crate::error::Error;
    use crate::telemetry::Gauge;
    use crate::transport::{DEFAULT_USER_AGENT, HttpError, HttpRequest, HttpResponse};
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct CapturingPoster {
        requests: Arc<Mutex<Vec<HttpRequest>>>,
    }

    impl HttpPoster for CapturingPoster {
        async fn post(
            &self,
            request: HttpRequest,
        ) -> std::result::Result<HttpResponse, HttpError> {
            self.requests.lock().push(request);
            Ok(HttpResponse::new(202, "Accepted", "{}"))
        }
    }

    fn config() -> Config {
        Config::builder()
            .api_key("secret")
            .metrics_endpoint("http://collector/metric/v1")
            .secondary_user_agent("tests/1")
            .build()
    }

    #[test]
    fn test_with_poster_requires_api_key() {
        let result = MetricBatchSender::<CapturingPoster>::with_poster(
            CapturingPoster::default(),
            &Config::default(),
        );
        assert!(matches!(result, Err(Error::MissingApiKey)));
    }

    #[test]
    fn test_with_poster_selects_endpoint_per_kind() {
        let metrics =
            MetricBatchSender::<CapturingPoster>::with_poster(CapturingPoster::default(), &config())
                .unwrap();
        let logs =
            LogBatchSender::<CapturingPoster>::with_poster(CapturingPoster::default(), &config())
                .unwrap();

        assert_eq!(metrics.transport().url(), "http://collector/metric/v1");
        assert_eq!(logs.transport().url(), DEFAULT_LOGS_ENDPOINT);
        assert_eq!(
            metrics.transport().user_agent(),
            format!("{DEFAULT_USER_AGENT} tests/1")
        );
    }

    #[tokio::test]
    async fn test_empty_batch_short_circuits() {
        let poster = CapturingPoster::default();
        let sender: LogBatchSender<_> =
            BatchSender::with_poster(poster.clone(), &config()).unwrap();
        let batch: Batch<Log> = Batch::new(Vec::new(), Attributes::new());

        let response = sender.send_batch(&batch).await.unwrap();

        assert_eq!(response, Response::ignored_empty_batch());
        assert!(poster.requests.lock().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_metrics_are_counted() {
        let poster = CapturingPoster::default();
        let sender: MetricBatchSender<_> =
            BatchSender::with_poster(poster.clone(), &config()).unwrap();
        let batch = Batch::new(
            vec![
                Gauge::new("ok", 1.0, 1, Attributes::new()).unwrap().into(),
                Gauge::new("bad", f64::NAN, 1, Attributes::new()).unwrap().into(),
            ],
            Attributes::new(),
        );

        sender.send_batch(&batch).await.unwrap();
        sender.send_batch(&batch).await.unwrap();

        assert_eq!(sender.dropped_records(), 2);
        assert_eq!(poster.requests.lock().len(), 2);
    }
}
