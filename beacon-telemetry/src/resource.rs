//! Immutable resource descriptor shared by every signal pipeline

use crate::attribute::{Attribute, AttributeValue};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Attributes identifying the telemetry-emitting process.
///
/// Keys are unique and iterate in sorted order. No attribute ever holds an
/// empty value. Cloning is cheap; every pipeline holds the same allocation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resource {
    attributes: Arc<BTreeMap<String, AttributeValue>>,
}

impl Resource {
    pub fn builder() -> ResourceBuilder {
        ResourceBuilder::default()
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&AttributeValue> {
        self.attributes.get(key)
    }

    /// String value of `key`, if present and a string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(AttributeValue::as_str)
    }

    pub fn service_name(&self) -> &str {
        self.get_str("service.name").unwrap_or("unknown_service")
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttributeValue)> {
        self.attributes.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn to_attributes(&self) -> Vec<Attribute> {
        self.iter()
            .map(|(k, v)| Attribute::new(k, v.clone()))
            .collect()
    }

    /// Whether two handles share the same allocation.
    pub fn ptr_eq(&self, other: &Resource) -> bool {
        Arc::ptr_eq(&self.attributes, &other.attributes)
    }

    /// Convert into an SDK resource for exporters built on `opentelemetry_sdk`.
    pub fn to_sdk_resource(&self) -> opentelemetry_sdk::Resource {
        opentelemetry_sdk::Resource::builder_empty()
            .with_attributes(
                self.to_attributes()
                    .into_iter()
                    .map(opentelemetry::KeyValue::from),
            )
            .build()
    }
}

/// Mutable accumulator used while layering attribute sources.
#[derive(Debug, Default)]
pub struct ResourceBuilder {
    attributes: BTreeMap<String, AttributeValue>,
}

impl ResourceBuilder {
    /// Set `key`, replacing a previous value. Empty values are ignored so
    /// they never shadow a value from a lower-precedence source.
    ///
    /// Returns whether the value was stored.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<AttributeValue>) -> bool {
        let value = value.into();
        if value.is_empty() {
            return false;
        }
        self.attributes.insert(key.into(), value);
        true
    }

    /// Set `key` only when no value is present yet.
    pub fn set_default(&mut self, key: impl Into<String>, value: impl Into<AttributeValue>) -> bool {
        let key = key.into();
        if self.attributes.contains_key(&key) {
            return false;
        }
        self.set(key, value)
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.set(key, value);
        self
    }

    pub fn contains(&self, key: &str) -> bool {
        self.attributes.contains_key(key)
    }

    pub fn build(self) -> Resource {
        Resource {
            attributes: Arc::new(self.attributes),
        }
    }
}
