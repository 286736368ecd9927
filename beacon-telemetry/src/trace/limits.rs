//! Per-span cardinality limits

use opentelemetry::{Array, Context, KeyValue, StringValue, Value};
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::error::OTelSdkResult;
use opentelemetry_sdk::trace::{Span, SpanData, SpanProcessor};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Bounds applied to span data as it is recorded. Excess data is truncated
/// or dropped and counted; recording never fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpanLimits {
    /// Maximum characters in a string attribute value
    pub max_attribute_value_length: usize,
    pub max_attributes_per_span: usize,
    pub max_events_per_span: usize,
    pub max_links_per_span: usize,
    pub max_attributes_per_event: usize,
    pub max_attributes_per_link: usize,
}

impl Default for SpanLimits {
    fn default() -> Self {
        Self {
            max_attribute_value_length: 4_096,
            max_attributes_per_span: 128,
            max_events_per_span: 128,
            max_links_per_span: 128,
            max_attributes_per_event: 128,
            max_attributes_per_link: 128,
        }
    }
}

impl SpanLimits {
    /// Replace zero values with the defaults.
    pub fn normalized(self) -> Self {
        let d = Self::default();
        let pick = |value: usize, default: usize| if value == 0 { default } else { value };
        Self {
            max_attribute_value_length: pick(
                self.max_attribute_value_length,
                d.max_attribute_value_length,
            ),
            max_attributes_per_span: pick(self.max_attributes_per_span, d.max_attributes_per_span),
            max_events_per_span: pick(self.max_events_per_span, d.max_events_per_span),
            max_links_per_span: pick(self.max_links_per_span, d.max_links_per_span),
            max_attributes_per_event: pick(
                self.max_attributes_per_event,
                d.max_attributes_per_event,
            ),
            max_attributes_per_link: pick(self.max_attributes_per_link, d.max_attributes_per_link),
        }
    }

    /// Count limits enforced by the SDK tracer. Value length is enforced by
    /// [`TruncatingProcessor`].
    pub fn to_sdk(&self) -> opentelemetry_sdk::trace::SpanLimits {
        let count = |value: usize| u32::try_from(value).unwrap_or(u32::MAX);
        opentelemetry_sdk::trace::SpanLimits {
            max_events_per_span: count(self.max_events_per_span),
            max_attributes_per_span: count(self.max_attributes_per_span),
            max_links_per_span: count(self.max_links_per_span),
            max_attributes_per_event: count(self.max_attributes_per_event),
            max_attributes_per_link: count(self.max_attributes_per_link),
        }
    }
}

/// Truncates string attribute values on spans, events and links to a
/// character limit before handing the span on.
#[derive(Debug)]
pub struct TruncatingProcessor<P> {
    inner: P,
    max_value_length: usize,
}

impl<P: SpanProcessor> TruncatingProcessor<P> {
    pub fn new(inner: P, max_value_length: usize) -> Self {
        Self {
            inner,
            max_value_length,
        }
    }
}

impl<P: SpanProcessor> SpanProcessor for TruncatingProcessor<P> {
    fn on_start(&self, span: &mut Span, cx: &Context) {
        self.inner.on_start(span, cx);
    }

    fn on_end(&self, mut span: SpanData) {
        let limit = self.max_value_length;
        truncate_all(&mut span.attributes, limit);
        for event in span.events.events.iter_mut() {
            truncate_all(&mut event.attributes, limit);
        }
        for link in span.links.links.iter_mut() {
            truncate_all(&mut link.attributes, limit);
        }
        self.inner.on_end(span);
    }

    fn force_flush(&self) -> OTelSdkResult {
        self.inner.force_flush()
    }

    fn shutdown_with_timeout(&self, timeout: Duration) -> OTelSdkResult {
        self.inner.shutdown_with_timeout(timeout)
    }

    fn set_resource(&mut self, resource: &Resource) {
        self.inner.set_resource(resource);
    }
}

fn truncate_all(attributes: &mut [KeyValue], limit: usize) {
    for kv in attributes {
        match &mut kv.value {
            Value::String(s) => truncate_value(s, limit),
            Value::Array(Array::String(items)) => {
                for item in items {
                    truncate_value(item, limit);
                }
            }
            _ => {}
        }
    }
}

fn truncate_value(value: &mut StringValue, limit: usize) {
    if let Some((idx, _)) = value.as_str().char_indices().nth(limit) {
        let kept = value.as_str()[..idx].to_string();
        *value = StringValue::from(kept);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Debug, Default)]
    struct Collect(Arc<Mutex<Vec<SpanData>>>);

    impl SpanProcessor for Collect {
        fn on_start(&self, _span: &mut Span, _cx: &Context) {}

        fn on_end(&self, span: SpanData) {
            self.0.lock().push(span);
        }

        fn force_flush(&self) -> OTelSdkResult {
            Ok(())
        }

        fn shutdown_with_timeout(&self, _timeout: Duration) -> OTelSdkResult {
            Ok(())
        }
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let mut attrs = vec![
            KeyValue::new("greeting", "héllo wörld"),
            KeyValue::new("short", "ok"),
            KeyValue::new("count", 12_345_i64),
        ];
        truncate_all(&mut attrs, 4);
        assert_eq!(attrs[0].value.as_str(), "héll");
        assert_eq!(attrs[1].value.as_str(), "ok");
        assert_eq!(attrs[2].value, Value::I64(12_345));
    }

    #[test]
    fn test_processor_truncates_recorded_spans() {
        use opentelemetry::trace::{Span as _, Tracer as _, TracerProvider as _};

        let spans = Arc::new(Mutex::new(Vec::new()));
        let provider = opentelemetry_sdk::trace::SdkTracerProvider::builder()
            .with_span_processor(TruncatingProcessor::new(Collect(Arc::clone(&spans)), 3))
            .build();
        let mut span = provider.tracer("limits").start("op");
        span.set_attribute(KeyValue::new("db.statement", "SELECT 1"));
        span.add_event("retry", vec![KeyValue::new("reason", "timeout")]);
        span.end();

        let spans = spans.lock();
        assert_eq!(spans[0].attributes[0].value.as_str(), "SEL");
        assert_eq!(spans[0].events.events[0].attributes[0].value.as_str(), "tim");
    }

    #[test]
    fn test_count_limits_convert() {
        let limits = SpanLimits {
            max_events_per_span: 7,
            ..Default::default()
        };
        let sdk = limits.to_sdk();
        assert_eq!(sdk.max_events_per_span, 7);
        assert_eq!(sdk.max_attributes_per_span, 128);
    }

    #[test]
    fn test_normalized() {
        let limits = SpanLimits {
            max_links_per_span: 0,
            max_events_per_span: 7,
            ..Default::default()
        }
        .normalized();
        assert_eq!(limits.max_links_per_span, 128);
        assert_eq!(limits.max_events_per_span, 7);
    }
}
