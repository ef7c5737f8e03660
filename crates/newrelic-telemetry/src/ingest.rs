//! Warnings for records that exceed documented ingest limits.
//!
//! The backend truncates or rejects oversized attribute sets. These checks
//! only warn; records are never dropped or altered here.

use crate::attributes::{AttributeValue, Attributes};
use crate::telemetry::TelemetryKind;

/// Largest attribute count accepted on an event or log. The public
/// documentation says 255 but the enforced limit is 254.
const MAX_EVENT_ATTRIBUTES: usize = 254;
const MAX_LOG_ATTRIBUTES: usize = 254;
const MAX_METRIC_ATTRIBUTES: usize = 100;

const MAX_ATTRIBUTE_NAME_LENGTH: usize = 255;
const MAX_ATTRIBUTE_VALUE_LENGTH: usize = 4096;

/// Checks attribute sets against the ingest limits for a telemetry kind.
#[derive(Debug, Clone, Copy, Default)]
pub struct IngestWarnings;

impl IngestWarnings {
    /// Logs a warning for every limit `attributes` exceeds and returns the
    /// number of warnings raised.
    pub fn check(kind: TelemetryKind, attributes: &Attributes) -> usize {
        let mut warnings = 0;

        if let Some(limit) = Self::max_attributes(kind)
            && attributes.len() > limit
        {
            tracing::warn!(
                kind = %kind,
                count = attributes.len(),
                limit,
                "Attribute count exceeds the maximum allowed per record"
            );
            warnings += 1;
        }

        for (name, value) in attributes.iter() {
            if name.chars().count() > MAX_ATTRIBUTE_NAME_LENGTH {
                tracing::warn!(
                    attribute = name,
                    limit = MAX_ATTRIBUTE_NAME_LENGTH,
                    "Attribute name exceeds the maximum length"
                );
                warnings += 1;
            }
            if let AttributeValue::String(s) = value
                && s.chars().count() > MAX_ATTRIBUTE_VALUE_LENGTH
            {
                tracing::warn!(
                    attribute = name,
                    length = s.chars().count(),
                    limit = MAX_ATTRIBUTE_VALUE_LENGTH,
                    "Attribute value exceeds the maximum length"
                );
                warnings += 1;
            }
        }

        warnings
    }

    fn max_attributes(kind: TelemetryKind) -> Option<usize> {
        match kind {
            TelemetryKind::Event => Some(MAX_EVENT_ATTRIBUTES),
            TelemetryKind::Log => Some(MAX_LOG_ATTRIBUTES),
            TelemetryKind::Metric => Some(MAX_METRIC_ATTRIBUTES),
            TelemetryKind::Span => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn many(n: usize) -> Attributes {
        (0..n).map(|i| (format!("k{i}"), i as i64)).collect()
    }

    #[test]
    fn test_within_limits() {
        assert_eq!(IngestWarnings::check(TelemetryKind::Metric, &many(100)), 0);
        assert_eq!(IngestWarnings::check(TelemetryKind::Event, &many(254)), 0);
    }

    #[test]
    fn test_attribute_count_limits_per_kind() {
        assert_eq!(IngestWarnings::check(TelemetryKind::Metric, &many(101)), 1);
        assert_eq!(IngestWarnings::check(TelemetryKind::Log, &many(255)), 1);
        assert_eq!(IngestWarnings::check(TelemetryKind::Span, &many(500)), 0);
    }

    #[test]
    fn test_long_names_and_values() {
        let attributes = Attributes::new()
            .put("n".repeat(256), "ok")
            .put("value", "v".repeat(4097));

        assert_eq!(IngestWarnings::check(TelemetryKind::Event, &attributes), 2);
    }
}
