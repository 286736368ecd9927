//! Typed attribute values shared by resources, spans, metrics and log records

use std::fmt;
use std::hash::{Hash, Hasher};

/// A closed set of attribute value types.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    StringArray(Vec<String>),
}

impl AttributeValue {
    /// Empty strings and empty arrays carry no information and are treated as absent.
    pub fn is_empty(&self) -> bool {
        match self {
            AttributeValue::String(s) => s.is_empty(),
            AttributeValue::StringArray(items) => items.iter().all(|s| s.is_empty()),
            _ => false,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::String(s) => f.write_str(s),
            AttributeValue::Int(v) => write!(f, "{v}"),
            AttributeValue::Float(v) => write!(f, "{v}"),
            AttributeValue::Bool(v) => write!(f, "{v}"),
            AttributeValue::StringArray(items) => write!(f, "[{}]", items.join(",")),
        }
    }
}

impl Eq for AttributeValue {}

impl Hash for AttributeValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            AttributeValue::String(s) => s.hash(state),
            AttributeValue::Int(v) => v.hash(state),
            AttributeValue::Float(v) => v.to_bits().hash(state),
            AttributeValue::Bool(v) => v.hash(state),
            AttributeValue::StringArray(items) => items.hash(state),
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::String(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::String(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        AttributeValue::Int(value)
    }
}

impl From<u32> for AttributeValue {
    fn from(value: u32) -> Self {
        AttributeValue::Int(i64::from(value))
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        AttributeValue::Float(value)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        AttributeValue::Bool(value)
    }
}

impl From<Vec<String>> for AttributeValue {
    fn from(value: Vec<String>) -> Self {
        AttributeValue::StringArray(value)
    }
}

impl From<AttributeValue> for opentelemetry::Value {
    fn from(value: AttributeValue) -> Self {
        match value {
            AttributeValue::String(s) => opentelemetry::Value::from(s),
            AttributeValue::Int(v) => opentelemetry::Value::I64(v),
            AttributeValue::Float(v) => opentelemetry::Value::F64(v),
            AttributeValue::Bool(v) => opentelemetry::Value::Bool(v),
            AttributeValue::StringArray(items) => opentelemetry::Value::Array(
                opentelemetry::Array::String(items.into_iter().map(Into::into).collect()),
            ),
        }
    }
}

impl From<AttributeValue> for opentelemetry::logs::AnyValue {
    fn from(value: AttributeValue) -> Self {
        use opentelemetry::logs::AnyValue;
        match value {
            AttributeValue::String(s) => AnyValue::from(s),
            AttributeValue::Int(v) => AnyValue::Int(v),
            AttributeValue::Float(v) => AnyValue::Double(v),
            AttributeValue::Bool(v) => AnyValue::Boolean(v),
            AttributeValue::StringArray(items) => {
                AnyValue::ListAny(Box::new(items.into_iter().map(AnyValue::from).collect()))
            }
        }
    }
}

/// A key/value pair attached to a resource, span, event, link, data point or log record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Attribute {
    pub key: String,
    pub value: AttributeValue,
}

impl Attribute {
    pub fn new(key: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

impl From<Attribute> for opentelemetry::KeyValue {
    fn from(attr: Attribute) -> Self {
        opentelemetry::KeyValue::new(attr.key, opentelemetry::Value::from(attr.value))
    }
}
