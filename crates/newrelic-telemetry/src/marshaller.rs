//! Rendering of whole batches into ingest API JSON documents.
//!
//! Metrics, spans and logs share one layout: a single-element array holding
//! an optional `common` block and the kind's record list. Events have no
//! common block on the wire; common attributes are merged into each event
//! instead.

use crate::attributes::AttributesEncoder;
use crate::batch::Batch;
use crate::telemetry::{Telemetry, TelemetryKind};
use serde_json::{Map, Value};

/// A rendered batch document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Marshalled {
    /// The JSON document.
    pub json: String,
    /// Records excluded from the document because they could not be encoded.
    pub dropped: usize,
}

/// Renders batches as JSON documents.
#[derive(Debug, Clone, Copy, Default)]
pub struct BatchMarshaller;

impl BatchMarshaller {
    /// Renders `batch` as a JSON document.
    pub fn to_json<T: Telemetry>(batch: &Batch<T>) -> String {
        Self::render(batch).json
    }

    /// Renders `batch`, also reporting how many records were dropped.
    pub fn render<T: Telemetry>(batch: &Batch<T>) -> Marshalled {
        tracing::debug!(kind = %T::KIND, count = batch.len(), "Generating json for batch");

        let (document, dropped) = match T::KIND {
            TelemetryKind::Event => Self::event_document(batch),
            TelemetryKind::Metric => Self::common_document(batch, "metrics"),
            TelemetryKind::Span => Self::common_document(batch, "spans"),
            TelemetryKind::Log => Self::common_document(batch, "logs"),
        };

        if dropped > 0 {
            tracing::info!(
                kind = %T::KIND,
                dropped,
                "Dropped records from batch due to invalid contents (you should fix this)"
            );
            for record in batch.records().iter().filter(|r| r.encode(None).is_none()) {
                tracing::debug!(?record, "Dropped record");
            }
        }

        Marshalled {
            json: document.to_string(),
            dropped,
        }
    }

    fn common_document<T: Telemetry>(batch: &Batch<T>, list_member: &str) -> (Value, usize) {
        let (items, dropped) = Self::encode_records(batch, false);

        let mut body = Map::new();
        if let Some(common) = Self::common_block(batch) {
            body.insert("common".into(), common);
        }
        body.insert(list_member.into(), Value::Array(items));

        (Value::Array(vec![Value::Object(body)]), dropped)
    }

    fn event_document<T: Telemetry>(batch: &Batch<T>) -> (Value, usize) {
        let (items, dropped) = Self::encode_records(batch, true);
        (Value::Array(items), dropped)
    }

    fn encode_records<T: Telemetry>(batch: &Batch<T>, merge_common: bool) -> (Vec<Value>, usize) {
        let overlay = merge_common.then(|| batch.common_attributes());
        let items: Vec<Value> = batch
            .records()
            .iter()
            .filter_map(|record| record.encode(overlay))
            .collect();
        let dropped = batch.len() - items.len();
        (items, dropped)
    }

    fn common_block<T: Telemetry>(batch: &Batch<T>) -> Option<Value> {
        let trace_id = match T::KIND {
            TelemetryKind::Span => batch.trace_id(),
            _ => None,
        };
        if !batch.has_common_attributes() && trace_id.is_none() {
            return None;
        }

        let mut common = Map::new();
        if let Some(trace_id) = trace_id {
            common.insert("trace.id".into(), Value::String(trace_id.to_string()));
        }
        if batch.has_common_attributes() {
            common.insert(
                "attributes".into(),
                Value::Object(AttributesEncoder::to_map(batch.common_attributes())),
            );
        }
        Some(Value::Object(common))
    }
}
