//! Typed attribute values and their JSON encoding.
//!
//! Attributes are the dimensional key/value pairs attached to every record and
//! to every batch (as "common" attributes). Only strings, booleans and numbers
//! are legal values. Non-finite floats can be stored but never reach the wire:
//! [`AttributesEncoder`] filters them out silently.

use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Attribute key under which the service name is recorded.
pub const SERVICE_NAME: &str = "service.name";
/// Attribute key under which the instrumentation provider is recorded.
pub const INSTRUMENTATION_PROVIDER: &str = "instrumentation.provider";

/// A single attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    /// A string value.
    String(String),
    /// A boolean value.
    Bool(bool),
    /// An integral number.
    Int(i64),
    /// A floating point number. Non-finite values are dropped at encode time.
    Float(f64),
}

impl AttributeValue {
    /// Creates a numeric value, rejecting NaN and infinities.
    pub fn number(value: f64) -> Option<Self> {
        value.is_finite().then_some(Self::Float(value))
    }

    /// Returns whether this value may be written to the wire.
    pub fn is_encodable(&self) -> bool {
        match self {
            Self::Float(f) => f.is_finite(),
            _ => true,
        }
    }

    /// Returns the string payload, if this is a string value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    fn to_json(&self) -> Option<Value> {
        match self {
            Self::String(s) => Some(Value::String(s.clone())),
            Self::Bool(b) => Some(Value::Bool(*b)),
            Self::Int(i) => Some(Value::Number(Number::from(*i))),
            Self::Float(f) => Number::from_f64(*f).map(Value::Number),
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => f.write_str(s),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(v) => write!(f, "{v}"),
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i32> for AttributeValue {
    fn from(value: i32) -> Self {
        Self::Int(value.into())
    }
}

impl From<u32> for AttributeValue {
    fn from(value: u32) -> Self {
        Self::Int(value.into())
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

/// Error converting an arbitrary JSON value into an [`AttributeValue`].
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AttributeError {
    /// Null is not a legal attribute value.
    #[error("attribute value cannot be null")]
    Null,

    /// The number cannot be represented as a finite value.
    #[error("attribute value must be a finite number")]
    NonFinite,

    /// Arrays and objects are not legal attribute values.
    #[error("unsupported attribute value type: {0}")]
    Unsupported(&'static str),
}

impl TryFrom<Value> for AttributeValue {
    type Error = AttributeError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Null => Err(AttributeError::Null),
            Value::Bool(b) => Ok(Self::Bool(b)),
            Value::String(s) => Ok(Self::String(s)),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(Self::Int(i))
                } else {
                    n.as_f64()
                        .and_then(Self::number)
                        .ok_or(AttributeError::NonFinite)
                }
            }
            Value::Array(_) => Err(AttributeError::Unsupported("array")),
            Value::Object(_) => Err(AttributeError::Unsupported("object")),
        }
    }
}

/// A set of attributes keyed by name.
///
/// Keys are unique; the last write wins. Iteration is in key order so that
/// encoded output is deterministic.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Attributes {
    entries: BTreeMap<String, AttributeValue>,
}

impl Attributes {
    /// Creates an empty attribute set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds an attribute set from a JSON object, silently dropping nulls
    /// and values that are not legal attributes.
    pub fn from_json_map(map: Map<String, Value>) -> Self {
        let mut attributes = Self::new();
        for (key, value) in map {
            match AttributeValue::try_from(value) {
                Ok(value) => {
                    attributes.entries.insert(key, value);
                }
                Err(e) => tracing::trace!(key, error = %e, "Skipping illegal attribute value"),
            }
        }
        attributes
    }

    /// Inserts an attribute, replacing any previous value under `key`.
    pub fn put(mut self, key: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.insert(key, value);
        self
    }

    /// Inserts an attribute in place.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<AttributeValue>) {
        self.entries.insert(key.into(), value.into());
    }

    /// Copies every entry of `incoming` into this set; incoming values win.
    pub fn put_all(mut self, incoming: &Attributes) -> Self {
        for (key, value) in &incoming.entries {
            self.entries.insert(key.clone(), value.clone());
        }
        self
    }

    /// Returns the value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&AttributeValue> {
        self.entries.get(key)
    }

    /// Returns whether `key` is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Number of stored entries, including ones that will be filtered on encode.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no attributes are stored.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttributeValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl<K, V> FromIterator<(K, V)> for Attributes
where
    K: Into<String>,
    V: Into<AttributeValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut attributes = Self::new();
        for (key, value) in iter {
            attributes.insert(key, value);
        }
        attributes
    }
}

/// Merges a record's attributes with a batch's common attributes.
///
/// Common attributes take precedence on key collision. Neither input is
/// modified.
pub fn merge(record: &Attributes, common: &Attributes) -> Attributes {
    record.clone().put_all(common)
}

/// Serialises [`Attributes`] into compact JSON objects.
#[derive(Debug, Clone, Copy, Default)]
pub struct AttributesEncoder;

impl AttributesEncoder {
    /// Encodes the attributes as a JSON object string.
    ///
    /// Non-finite numbers are dropped. An empty (or fully filtered) set
    /// encodes as `{}`.
    pub fn encode(attributes: &Attributes) -> String {
        Value::Object(Self::to_map(attributes)).to_string()
    }

    /// Encodes the attributes as a JSON object map.
    pub fn to_map(attributes: &Attributes) -> Map<String, Value> {
        attributes
            .iter()
            .filter_map(|(key, value)| value.to_json().map(|json| (key.to_string(), json)))
            .collect()
    }
}

/// Builds common attributes carrying the well-known service fields.
#[derive(Debug, Default)]
#[must_use = "builders do nothing unless .build() is called"]
pub struct CommonAttributesBuilder {
    attributes: Attributes,
    service_name: Option<String>,
    instrumentation_provider: Option<String>,
}

impl CommonAttributesBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the base attribute set.
    pub fn attributes(mut self, attributes: Attributes) -> Self {
        self.attributes = attributes;
        self
    }

    /// Sets `service.name`.
    pub fn service_name(mut self, service_name: impl Into<String>) -> Self {
        self.service_name = Some(service_name.into());
        self
    }

    /// Sets `instrumentation.provider`. Intended for instrumentation
    /// frameworks rather than manual instrumentation.
    pub fn instrumentation_provider(mut self, provider: impl Into<String>) -> Self {
        self.instrumentation_provider = Some(provider.into());
        self
    }

    /// Builds the attribute set.
    pub fn build(self) -> Attributes {
        let mut attributes = self.attributes;
        if let Some(service_name) = self.service_name {
            attributes.insert(SERVICE_NAME, service_name);
        }
        if let Some(provider) = self.instrumentation_provider {
            attributes.insert(INSTRUMENTATION_PROVIDER, provider);
        }
        attributes
    }
}
