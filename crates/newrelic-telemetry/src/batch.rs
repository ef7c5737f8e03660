//! Immutable batches of telemetry.

use crate::attributes::Attributes;
use crate::telemetry::Telemetry;
use uuid::Uuid;

/// An immutable snapshot of records sent as one request.
///
/// The request id is generated once per batch and sent as `X-Request-Id`, so
/// every retry of the same batch can be deduplicated by the backend. Only
/// [`Batch::split`] produces new ids.
#[derive(Debug, Clone)]
pub struct Batch<T> {
    records: Vec<T>,
    common_attributes: Attributes,
    trace_id: Option<String>,
    request_id: Uuid,
}

impl<T: Telemetry> Batch<T> {
    /// Creates a batch over `records` sharing `common_attributes`.
    pub fn new(records: Vec<T>, common_attributes: Attributes) -> Self {
        Self {
            records,
            common_attributes,
            trace_id: None,
            request_id: Uuid::new_v4(),
        }
    }

    /// Sets the trace id written into the common block of span payloads.
    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }

    /// The records, in buffer order.
    pub fn records(&self) -> &[T] {
        &self.records
    }

    /// Attributes shared by every record in the batch.
    pub fn common_attributes(&self) -> &Attributes {
        &self.common_attributes
    }

    /// Returns whether any common attributes were supplied.
    pub fn has_common_attributes(&self) -> bool {
        !self.common_attributes.is_empty()
    }

    /// The batch-wide trace id, if any.
    pub fn trace_id(&self) -> Option<&str> {
        self.trace_id.as_deref()
    }

    /// The id sent as `X-Request-Id`.
    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if the batch holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Splits the batch in two halves for resending after a 413.
    ///
    /// The first half holds `len / 2` records and the second the rest. Both
    /// inherit the common attributes and trace id and get fresh request ids.
    /// An empty batch yields no sub-batches; a single-record batch yields
    /// one sub-batch holding that record.
    pub fn split(&self) -> Vec<Batch<T>> {
        if self.records.is_empty() {
            return Vec::new();
        }

        let half = self.records.len() / 2;
        let (front, back) = self.records.split_at(half);

        [front, back]
            .into_iter()
            .filter(|part| !part.is_empty())
            .map(|part| self.sub_batch(part.to_vec()))
            .collect()
    }

    pub(crate) fn sub_batch(&self, records: Vec<T>) -> Batch<T> {
        Batch {
            records,
            common_attributes: self.common_attributes.clone(),
            trace_id: self.trace_id.clone(),
            request_id: Uuid::new_v4(),
        }
    }
}
