//! Per-kind wire encoders.
//!
//! Each telemetry type renders itself as one JSON object of the payload. The
//! object layouts follow the New Relic ingest APIs:
//!
//! | Kind    | Members |
//! |---------|---------|
//! | count   | `name`, `type`, `value`, `timestamp`, `interval.ms`, `attributes` |
//! | gauge   | `name`, `type`, `value`, `timestamp`, `attributes` |
//! | summary | `name`, `type`, `value{count,sum,min,max}`, `timestamp`, `interval.ms`, `attributes` |
//! | span    | `id`, `trace.id`?, `timestamp`, `attributes` (carrying name, parent, duration, service) |
//! | log     | `timestamp`, `message`?, `attributes` (carrying service, level, logtype, error) |
//! | event   | `eventType`, `timestamp`, `attributes`? |

use crate::attributes::{Attributes, AttributesEncoder, SERVICE_NAME, merge};
use crate::telemetry::{Count, Event, Gauge, Log, Metric, Span, Summary, Telemetry, TelemetryKind};
use serde_json::{Map, Number, Value, json};

fn overlaid<'a>(
    attributes: &'a Attributes,
    overlay: Option<&Attributes>,
) -> std::borrow::Cow<'a, Attributes> {
    match overlay {
        Some(common) if !common.is_empty() => std::borrow::Cow::Owned(merge(attributes, common)),
        _ => std::borrow::Cow::Borrowed(attributes),
    }
}

fn attributes_value(attributes: &Attributes) -> Value {
    Value::Object(AttributesEncoder::to_map(attributes))
}

/// Finite floats as numbers, everything else as `null`.
fn finite_or_null(value: f64) -> Value {
    Number::from_f64(value).map_or(Value::Null, Value::Number)
}

fn encode_count(count: &Count, attributes: &Attributes) -> Option<Value> {
    let value = Number::from_f64(count.value)?;
    Some(json!({
        "name": count.name,
        "type": "count",
        "value": value,
        "timestamp": count.start_time_ms,
        "interval.ms": count.end_time_ms - count.start_time_ms,
        "attributes": attributes_value(attributes),
    }))
}

fn encode_gauge(gauge: &Gauge, attributes: &Attributes) -> Option<Value> {
    let value = Number::from_f64(gauge.value)?;
    Some(json!({
        "name": gauge.name,
        "type": "gauge",
        "value": value,
        "timestamp": gauge.timestamp_ms,
        "attributes": attributes_value(attributes),
    }))
}

fn encode_summary(summary: &Summary, attributes: &Attributes) -> Option<Value> {
    let sum = Number::from_f64(summary.sum)?;
    Some(json!({
        "name": summary.name,
        "type": "summary",
        "value": {
            "count": summary.count,
            "sum": sum,
            "min": finite_or_null(summary.min),
            "max": finite_or_null(summary.max),
        },
        "timestamp": summary.start_time_ms,
        "interval.ms": summary.end_time_ms - summary.start_time_ms,
        "attributes": attributes_value(attributes),
    }))
}

impl Telemetry for Metric {
    const KIND: TelemetryKind = TelemetryKind::Metric;

    fn attributes(&self) -> &Attributes {
        match self {
            Metric::Count(c) => &c.attributes,
            Metric::Gauge(g) => &g.attributes,
            Metric::Summary(s) => &s.attributes,
        }
    }

    fn encode(&self, overlay: Option<&Attributes>) -> Option<Value> {
        let attributes = overlaid(self.attributes(), overlay);
        match self {
            Metric::Count(c) => encode_count(c, &attributes),
            Metric::Gauge(g) => encode_gauge(g, &attributes),
            Metric::Summary(s) => encode_summary(s, &attributes),
        }
    }
}

impl Telemetry for Span {
    const KIND: TelemetryKind = TelemetryKind::Span;

    fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    fn encode(&self, overlay: Option<&Attributes>) -> Option<Value> {
        let mut attributes = overlaid(&self.attributes, overlay).into_owned();
        if let Some(name) = &self.name {
            attributes.insert("name", name.as_str());
        }
        if let Some(parent_id) = &self.parent_id {
            attributes.insert("parent.id", parent_id.as_str());
        }
        attributes.insert("duration.ms", self.duration_ms);
        if let Some(service_name) = &self.service_name {
            attributes.insert(SERVICE_NAME, service_name.as_str());
        }
        if self.error {
            attributes.insert("error", true);
        }

        let mut object = Map::new();
        object.insert("id".into(), Value::String(self.id.clone()));
        if let Some(trace_id) = &self.trace_id {
            object.insert("trace.id".into(), Value::String(trace_id.clone()));
        }
        object.insert("timestamp".into(), self.timestamp_ms.into());
        object.insert("attributes".into(), attributes_value(&attributes));
        Some(Value::Object(object))
    }
}

impl Telemetry for Log {
    const KIND: TelemetryKind = TelemetryKind::Log;

    fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    fn encode(&self, overlay: Option<&Attributes>) -> Option<Value> {
        let mut attributes = overlaid(&self.attributes, overlay).into_owned();
        if let Some(service_name) = &self.service_name
            && !attributes.contains_key(SERVICE_NAME)
        {
            attributes.insert(SERVICE_NAME, service_name.as_str());
        }
        if let Some(level) = &self.level {
            attributes.insert("level", level.as_str());
        }
        if let Some(log_type) = &self.log_type {
            attributes.insert("logtype", log_type.as_str());
        }
        if let Some(error) = &self.error {
            attributes.insert("error.message", error.message.as_str());
            attributes.insert("error.class", error.class.as_str());
            attributes.insert("error.stack", error.stack.as_str());
        }

        let mut object = Map::new();
        object.insert("timestamp".into(), self.timestamp_ms.into());
        if let Some(message) = &self.message {
            object.insert("message".into(), Value::String(message.clone()));
        }
        object.insert("attributes".into(), attributes_value(&attributes));
        Some(Value::Object(object))
    }
}

impl Telemetry for Event {
    const KIND: TelemetryKind = TelemetryKind::Event;

    fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    fn encode(&self, overlay: Option<&Attributes>) -> Option<Value> {
        let attributes = AttributesEncoder::to_map(&overlaid(&self.attributes, overlay));

        let mut object = Map::new();
        object.insert("eventType".into(), Value::String(self.event_type.clone()));
        object.insert("timestamp".into(), self.timestamp_ms.into());
        if !attributes.is_empty() {
            object.insert("attributes".into(), Value::Object(attributes));
        }
        Some(Value::Object(object))
    }
}
