//! Concurrent accumulation of records between batch submissions.

use crate::attributes::Attributes;
use crate::batch::Batch;
use crate::ingest::IngestWarnings;
use crate::marshaller::BatchMarshaller;
use crate::telemetry::{Telemetry, TelemetryKind};
use parking_lot::Mutex;

/// Default upper bound on the uncompressed JSON size of one batch built by
/// [`Buffer::create_batches`].
pub const DEFAULT_MAX_UNCOMPRESSED_BATCH_BYTES: usize = 180_000_000;

/// Accumulates records of one kind, sharing a fixed set of common attributes.
///
/// Appends may race with [`Buffer::create_batch`]: each record ends up in
/// exactly one batch, either the one being drained or the next.
#[derive(Debug)]
pub struct Buffer<T> {
    records: Mutex<Vec<T>>,
    common_attributes: Attributes,
    trace_id: Option<String>,
}

impl<T: Telemetry> Buffer<T> {
    /// Creates an empty buffer.
    pub fn new(common_attributes: Attributes) -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            common_attributes,
            trace_id: None,
        }
    }

    /// Sets the trace id stamped on every span batch drained from this buffer.
    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }

    /// Appends a record.
    pub fn add(&self, record: T) {
        IngestWarnings::check(T::KIND, record.attributes());
        self.records.lock().push(record);
    }

    /// Number of records currently buffered.
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Returns true if nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// Attributes applied to every batch drained from this buffer.
    pub fn common_attributes(&self) -> &Attributes {
        &self.common_attributes
    }

    /// Drains every buffered record into a new batch.
    pub fn create_batch(&self) -> Batch<T> {
        let records = self.drain();
        tracing::debug!(kind = %T::KIND, count = records.len(), "Created batch");
        self.batch(records)
    }

    /// Drains every buffered record into batches whose uncompressed JSON
    /// stays within `max_uncompressed_bytes`.
    ///
    /// Always returns at least one (possibly empty) batch. A single record
    /// larger than the limit still gets a batch of its own.
    pub fn create_batches(&self, max_uncompressed_bytes: usize) -> Vec<Batch<T>> {
        let records = self.drain();
        // Events carry the common attributes in every record instead of once.
        let overlay = (T::KIND == TelemetryKind::Event).then_some(&self.common_attributes);
        let framing_bytes = BatchMarshaller::to_json(&self.batch(Vec::new())).len();

        let mut batches = Vec::new();
        let mut current = Vec::new();
        let mut current_bytes = framing_bytes;

        for record in records {
            // One extra byte for the separating comma.
            let record_bytes = record
                .encode(overlay)
                .map(|json| json.to_string().len() + 1)
                .unwrap_or_default();

            if !current.is_empty() && current_bytes + record_bytes > max_uncompressed_bytes {
                batches.push(self.batch(std::mem::take(&mut current)));
                current_bytes = framing_bytes;
            }

            current_bytes += record_bytes;
            current.push(record);
        }
        batches.push(self.batch(current));

        tracing::debug!(kind = %T::KIND, batches = batches.len(), "Created size-bounded batches");
        batches
    }

    fn drain(&self) -> Vec<T> {
        std::mem::take(&mut *self.records.lock())
    }

    fn batch(&self, records: Vec<T>) -> Batch<T> {
        let batch = Batch::new(records, self.common_attributes.clone());
        match &self.trace_id {
            Some(trace_id) => batch.with_trace_id(trace_id.clone()),
            None => batch,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::{Count, Event, Metric};

    fn count(i: u64) -> Metric {
        Count::new("c", i as f64, i, i + 1, Attributes::new())
            .unwrap()
            .into()
    }

    #[test]
    fn test_create_batch_drains_buffer() {
        let buffer = Buffer::new(Attributes::new().put("host", "h1"));
        buffer.add(count(1));
        buffer.add(count(2));
        assert_eq!(buffer.len(), 2);

        let batch = buffer.create_batch();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.common_attributes().get("host"), Some(&"h1".into()));
        assert!(buffer.is_empty());

        let next = buffer.create_batch();
        assert!(next.is_empty());
        assert_ne!(next.request_id(), batch.request_id());
    }

    #[test]
    fn test_create_batch_preserves_order() {
        let buffer = Buffer::new(Attributes::new());
        for i in 0..10 {
            buffer.add(count(i));
        }

        let batch = buffer.create_batch();
        let values: Vec<f64> = batch.records().iter().map(Metric::primary_value).collect();
        assert_eq!(values, (0..10).map(|i| i as f64).collect::<Vec<_>>());
    }

    #[test]
    fn test_trace_id_is_stamped_on_batches() {
        let buffer: Buffer<crate::telemetry::Span> =
            Buffer::new(Attributes::new()).with_trace_id("trace-9");
        assert_eq!(buffer.create_batch().trace_id(), Some("trace-9"));
    }

    #[test]
    fn test_create_batches_respects_size_limit() {
        let buffer = Buffer::new(Attributes::new());
        for i in 0..10 {
            buffer.add(count(i));
        }
        let one_record = count(0).encode(None).unwrap().to_string().len();

        let limit = one_record * 3 + 40;
        let batches = buffer.create_batches(limit);

        assert!(batches.len() > 1);
        assert_eq!(batches.iter().map(Batch::len).sum::<usize>(), 10);
        assert!(batches.iter().all(|b| BatchMarshaller::to_json(b).len() <= limit));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_event_batches_count_merged_common_attributes() {
        let buffer = Buffer::new(Attributes::new().put("blob", "x".repeat(1000)));
        for i in 0..10 {
            buffer.add(Event::new("Deploy", i, Attributes::new().put("n", i as i64)).unwrap());
        }

        let batches = buffer.create_batches(3000);

        assert!(batches.len() >= 4);
        assert_eq!(batches.iter().map(Batch::len).sum::<usize>(), 10);
        for batch in &batches {
            assert!(BatchMarshaller::to_json(batch).len() <= 3000);
        }
    }

    #[test]
    fn test_create_batches_on_empty_buffer_returns_one_empty_batch() {
        let buffer: Buffer<Metric> = Buffer::new(Attributes::new());
        let batches = buffer.create_batches(DEFAULT_MAX_UNCOMPRESSED_BATCH_BYTES);
        assert_eq!(batches.len(), 1);
        assert!(batches[0].is_empty());
    }

    #[test]
    fn test_oversized_record_gets_its_own_batch() {
        let buffer = Buffer::new(Attributes::new());
        buffer.add(count(1));
        buffer.add(count(2));

        let batches = buffer.create_batches(1);
        assert_eq!(batches.len(), 2);
        assert!(batches.iter().all(|b| b.len() == 1));
    }
}
