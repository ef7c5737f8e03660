//! Telemetry record types.
//!
//! Records are immutable once built. Constructors and builders validate their
//! required fields up front; a record that fails validation is a programming
//! error on the caller's side and is reported as [`BuildError`], never as a
//! transport outcome.

use crate::attributes::Attributes;
use serde_json::Value;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// The kind of telemetry carried by a batch.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TelemetryKind {
    /// Dimensional metrics (count, gauge, summary).
    Metric,
    /// Distributed tracing spans.
    Span,
    /// Custom events.
    Event,
    /// Log records.
    Log,
}

impl TelemetryKind {
    /// Returns a lowercase name for logging.
    pub fn as_str(&self) -> &'static str {
        match self {
            TelemetryKind::Metric => "metric",
            TelemetryKind::Span => "span",
            TelemetryKind::Event => "event",
            TelemetryKind::Log => "log",
        }
    }
}

impl fmt::Display for TelemetryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A record that can be buffered, batched and encoded.
pub trait Telemetry: Clone + fmt::Debug + Send + Sync + 'static {
    /// The kind of every record of this type.
    const KIND: TelemetryKind;

    /// The record's own attributes.
    fn attributes(&self) -> &Attributes;

    /// Encodes this record as its wire JSON object.
    ///
    /// `overlay`, when given, is merged over the record's attributes with
    /// overlay values winning. Returns `None` when the record must be
    /// excluded from the payload.
    fn encode(&self, overlay: Option<&Attributes>) -> Option<Value>;
}

/// Error raised when a record is built with invalid arguments.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    /// A required field was never set.
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// A required text field was empty.
    #[error("field must not be blank: {0}")]
    Blank(&'static str),

    /// The end of an interval preceded its start.
    #[error("interval end {end_ms} precedes start {start_ms}")]
    InvalidInterval {
        /// Interval start in epoch milliseconds.
        start_ms: u64,
        /// Interval end in epoch milliseconds.
        end_ms: u64,
    },
}

/// Returns the current wall-clock time in epoch milliseconds.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

fn non_blank(value: impl Into<String>, field: &'static str) -> Result<String, BuildError> {
    let value = value.into();
    if value.trim().is_empty() {
        return Err(BuildError::Blank(field));
    }
    Ok(value)
}

fn interval(start_ms: u64, end_ms: u64) -> Result<(), BuildError> {
    if end_ms < start_ms {
        return Err(BuildError::InvalidInterval { start_ms, end_ms });
    }
    Ok(())
}

/// A cumulative count over an interval.
#[derive(Debug, Clone, PartialEq)]
pub struct Count {
    pub(crate) name: String,
    pub(crate) value: f64,
    pub(crate) start_time_ms: u64,
    pub(crate) end_time_ms: u64,
    pub(crate) attributes: Attributes,
}

impl Count {
    /// Creates a count over `[start_time_ms, end_time_ms]`.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is blank or the interval is inverted.
    pub fn new(
        name: impl Into<String>,
        value: f64,
        start_time_ms: u64,
        end_time_ms: u64,
        attributes: Attributes,
    ) -> Result<Self, BuildError> {
        interval(start_time_ms, end_time_ms)?;
        Ok(Self {
            name: non_blank(name, "name")?,
            value,
            start_time_ms,
            end_time_ms,
            attributes,
        })
    }

    /// The metric name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The counted value.
    pub fn value(&self) -> f64 {
        self.value
    }
}

/// A point-in-time measurement.
#[derive(Debug, Clone, PartialEq)]
pub struct Gauge {
    pub(crate) name: String,
    pub(crate) value: f64,
    pub(crate) timestamp_ms: u64,
    pub(crate) attributes: Attributes,
}

impl Gauge {
    /// Creates a gauge sampled at `timestamp_ms`.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is blank.
    pub fn new(
        name: impl Into<String>,
        value: f64,
        timestamp_ms: u64,
        attributes: Attributes,
    ) -> Result<Self, BuildError> {
        Ok(Self {
            name: non_blank(name, "name")?,
            value,
            timestamp_ms,
            attributes,
        })
    }

    /// The metric name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The sampled value.
    pub fn value(&self) -> f64 {
        self.value
    }
}

/// Pre-aggregated distribution statistics over an interval.
#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub(crate) name: String,
    pub(crate) count: u64,
    pub(crate) sum: f64,
    pub(crate) min: f64,
    pub(crate) max: f64,
    pub(crate) start_time_ms: u64,
    pub(crate) end_time_ms: u64,
    pub(crate) attributes: Attributes,
}

impl Summary {
    /// Creates a summary over `[start_time_ms, end_time_ms]`.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is blank or the interval is inverted.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: impl Into<String>,
        count: u64,
        sum: f64,
        min: f64,
        max: f64,
        start_time_ms: u64,
        end_time_ms: u64,
        attributes: Attributes,
    ) -> Result<Self, BuildError> {
        interval(start_time_ms, end_time_ms)?;
        Ok(Self {
            name: non_blank(name, "name")?,
            count,
            sum,
            min,
            max,
            start_time_ms,
            end_time_ms,
            attributes,
        })
    }

    /// The metric name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The sum of all observations.
    pub fn sum(&self) -> f64 {
        self.sum
    }
}

/// Any of the supported metric types.
#[derive(Debug, Clone, PartialEq)]
pub enum Metric {
    /// A count metric.
    Count(Count),
    /// A gauge metric.
    Gauge(Gauge),
    /// A summary metric.
    Summary(Summary),
}

impl Metric {
    /// The metric name.
    pub fn name(&self) -> &str {
        match self {
            Metric::Count(c) => c.name(),
            Metric::Gauge(g) => g.name(),
            Metric::Summary(s) => s.name(),
        }
    }

    /// The value that decides whether the metric can be sent at all: `value`
    /// for counts and gauges, `sum` for summaries.
    pub fn primary_value(&self) -> f64 {
        match self {
            Metric::Count(c) => c.value,
            Metric::Gauge(g) => g.value,
            Metric::Summary(s) => s.sum,
        }
    }

    /// Returns whether the metric carries a finite primary value.
    pub fn is_valid(&self) -> bool {
        self.primary_value().is_finite()
    }
}

impl From<Count> for Metric {
    fn from(value: Count) -> Self {
        Metric::Count(value)
    }
}

impl From<Gauge> for Metric {
    fn from(value: Gauge) -> Self {
        Metric::Gauge(value)
    }
}

impl From<Summary> for Metric {
    fn from(value: Summary) -> Self {
        Metric::Summary(value)
    }
}

/// A single unit of work within a distributed trace.
#[derive(Debug, Clone, PartialEq)]
pub struct Span {
    pub(crate) id: String,
    pub(crate) trace_id: Option<String>,
    pub(crate) parent_id: Option<String>,
    pub(crate) timestamp_ms: u64,
    pub(crate) duration_ms: f64,
    pub(crate) name: Option<String>,
    pub(crate) service_name: Option<String>,
    pub(crate) error: bool,
    pub(crate) attributes: Attributes,
}

impl Span {
    /// Starts building a span with the given span id.
    pub fn builder(id: impl Into<String>) -> SpanBuilder {
        SpanBuilder {
            id: id.into(),
            ..SpanBuilder::default()
        }
    }

    /// The span id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The trace this span belongs to, if set.
    pub fn trace_id(&self) -> Option<&str> {
        self.trace_id.as_deref()
    }

    /// Whether the span was flagged as an error.
    pub fn is_error(&self) -> bool {
        self.error
    }
}

/// Builder for [`Span`].
#[derive(Debug, Default)]
#[must_use = "builders do nothing unless .build() is called"]
pub struct SpanBuilder {
    id: String,
    trace_id: Option<String>,
    parent_id: Option<String>,
    timestamp_ms: Option<u64>,
    duration_ms: f64,
    name: Option<String>,
    service_name: Option<String>,
    error: bool,
    attributes: Attributes,
}

impl SpanBuilder {
    /// Sets the trace id.
    pub fn trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }

    /// Sets the parent span id.
    pub fn parent_id(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    /// Sets the start timestamp in epoch milliseconds.
    pub fn timestamp(mut self, timestamp_ms: u64) -> Self {
        self.timestamp_ms = Some(timestamp_ms);
        self
    }

    /// Sets the start timestamp to the current time.
    pub fn timestamp_now(self) -> Self {
        self.timestamp(now_ms())
    }

    /// Sets the duration in milliseconds.
    pub fn duration_ms(mut self, duration_ms: f64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    /// Sets the span name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the service name.
    pub fn service_name(mut self, service_name: impl Into<String>) -> Self {
        self.service_name = Some(service_name.into());
        self
    }

    /// Flags the span as an error.
    pub fn error(mut self, error: bool) -> Self {
        self.error = error;
        self
    }

    /// Sets the span's own attributes.
    pub fn attributes(mut self, attributes: Attributes) -> Self {
        self.attributes = attributes;
        self
    }

    /// Builds the span.
    ///
    /// # Errors
    ///
    /// Returns an error if the id is blank or no timestamp was set.
    pub fn build(self) -> Result<Span, BuildError> {
        Ok(Span {
            id: non_blank(self.id, "id")?,
            timestamp_ms: self
                .timestamp_ms
                .ok_or(BuildError::MissingField("timestamp"))?,
            trace_id: self.trace_id,
            parent_id: self.parent_id,
            duration_ms: self.duration_ms,
            name: self.name,
            service_name: self.service_name,
            error: self.error,
            attributes: self.attributes,
        })
    }
}

/// A log record.
#[derive(Debug, Clone, PartialEq)]
pub struct Log {
    pub(crate) timestamp_ms: u64,
    pub(crate) message: Option<String>,
    pub(crate) service_name: Option<String>,
    pub(crate) level: Option<String>,
    pub(crate) log_type: Option<String>,
    pub(crate) error: Option<LogError>,
    pub(crate) attributes: Attributes,
}

/// An error captured on a log record, sent as `error.*` attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LogError {
    pub(crate) message: String,
    pub(crate) class: String,
    pub(crate) stack: String,
}

impl LogError {
    fn capture<E: std::error::Error + ?Sized>(error: &E) -> Self {
        let mut stack = error.to_string();
        let mut source = error.source();
        while let Some(cause) = source {
            stack.push_str("\ncaused by: ");
            stack.push_str(&cause.to_string());
            source = cause.source();
        }
        Self {
            message: error.to_string(),
            class: std::any::type_name::<E>().to_string(),
            stack,
        }
    }
}

impl Log {
    /// Starts building a log record.
    pub fn builder() -> LogBuilder {
        LogBuilder::default()
    }

    /// The log message, if any.
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// The log level, if any.
    pub fn level(&self) -> Option<&str> {
        self.level.as_deref()
    }
}

/// Builder for [`Log`].
#[derive(Debug, Default)]
#[must_use = "builders do nothing unless .build() is called"]
pub struct LogBuilder {
    timestamp_ms: Option<u64>,
    message: Option<String>,
    service_name: Option<String>,
    level: Option<String>,
    log_type: Option<String>,
    error: Option<LogError>,
    attributes: Attributes,
}

impl LogBuilder {
    /// Sets the timestamp in epoch milliseconds.
    pub fn timestamp(mut self, timestamp_ms: u64) -> Self {
        self.timestamp_ms = Some(timestamp_ms);
        self
    }

    /// Sets the timestamp to the current time.
    pub fn timestamp_now(self) -> Self {
        self.timestamp(now_ms())
    }

    /// Sets the message.
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Sets the service name.
    pub fn service_name(mut self, service_name: impl Into<String>) -> Self {
        self.service_name = Some(service_name.into());
        self
    }

    /// Sets the level, e.g. `INFO`.
    pub fn level(mut self, level: impl Into<String>) -> Self {
        self.level = Some(level.into());
        self
    }

    /// Sets the log type used for parsing rules on the backend.
    pub fn log_type(mut self, log_type: impl Into<String>) -> Self {
        self.log_type = Some(log_type.into());
        self
    }

    /// Attaches an error, reported with its message, type name and chain
    /// of sources.
    pub fn error<E: std::error::Error + ?Sized>(mut self, error: &E) -> Self {
        self.error = Some(LogError::capture(error));
        self
    }

    /// Sets the record's own attributes.
    pub fn attributes(mut self, attributes: Attributes) -> Self {
        self.attributes = attributes;
        self
    }

    /// Builds the log record.
    ///
    /// # Errors
    ///
    /// Returns an error if no timestamp was set.
    pub fn build(self) -> Result<Log, BuildError> {
        Ok(Log {
            timestamp_ms: self
                .timestamp_ms
                .ok_or(BuildError::MissingField("timestamp"))?,
            message: self.message,
            service_name: self.service_name,
            level: self.level,
            log_type: self.log_type,
            error: self.error,
            attributes: self.attributes,
        })
    }
}

/// A custom event.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub(crate) event_type: String,
    pub(crate) timestamp_ms: u64,
    pub(crate) attributes: Attributes,
}

impl Event {
    /// Creates an event of `event_type` at `timestamp_ms`.
    ///
    /// # Errors
    ///
    /// Returns an error if the event type is blank.
    pub fn new(
        event_type: impl Into<String>,
        timestamp_ms: u64,
        attributes: Attributes,
    ) -> Result<Self, BuildError> {
        Ok(Self {
            event_type: non_blank(event_type, "eventType")?,
            timestamp_ms,
            attributes,
        })
    }

    /// The event type.
    pub fn event_type(&self) -> &str {
        &self.event_type
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_rejects_blank_name() {
        let err = Count::new("  ", 1.0, 0, 1, Attributes::new()).unwrap_err();
        assert_eq!(err, BuildError::Blank("name"));
    }

    #[test]
    fn test_count_rejects_inverted_interval() {
        let err = Count::new("c", 1.0, 10, 5, Attributes::new()).unwrap_err();
        assert!(matches!(
            err,
            BuildError::InvalidInterval {
                start_ms: 10,
                end_ms: 5
            }
        ));
    }

    #[test]
    fn test_span_requires_timestamp() {
        let err = Span::builder("abc").name("op").build().unwrap_err();
        assert_eq!(err, BuildError::MissingField("timestamp"));
        assert_eq!(format!("{err}"), "missing required field: timestamp");
    }

    #[test]
    fn test_span_requires_id() {
        let err = Span::builder("").timestamp(1).build().unwrap_err();
        assert_eq!(err, BuildError::Blank("id"));
    }

    #[test]
    fn test_span_error_defaults_to_false() {
        let span = Span::builder("abc").timestamp(1).build().unwrap();
        assert!(!span.is_error());
        assert!(span.trace_id().is_none());
    }

    #[test]
    fn test_log_requires_timestamp() {
        let err = Log::builder().message("hi").build().unwrap_err();
        assert_eq!(err, BuildError::MissingField("timestamp"));
    }

    #[test]
    fn test_event_rejects_blank_type() {
        assert!(Event::new("", 1, Attributes::new()).is_err());
    }

    #[test]
    fn test_metric_validity_uses_primary_value() {
        let gauge = Metric::from(Gauge::new("g", f64::NAN, 1, Attributes::new()).unwrap());
        assert!(!gauge.is_valid());

        let summary = Metric::from(
            Summary::new("s", 3, 6.0, f64::NAN, f64::INFINITY, 0, 10, Attributes::new()).unwrap(),
        );
        assert!(summary.is_valid());
    }

    #[test]
    fn test_now_ms_is_recent() {
        assert!(now_ms() > 1_600_000_000_000);
    }
}
