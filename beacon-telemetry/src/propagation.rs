//! W3C trace context and baggage propagation over HTTP headers

use http::HeaderMap;
use http::header::{HeaderName, HeaderValue};
use opentelemetry::Context;
use opentelemetry::propagation::{
    Extractor, Injector, TextMapCompositePropagator, TextMapPropagator,
};
use opentelemetry_sdk::propagation::{BaggagePropagator, TraceContextPropagator};
use std::fmt;

/// Reads and writes `traceparent`, `tracestate` and `baggage` headers.
///
/// Extraction never fails: missing or malformed headers yield a context
/// without a remote parent, so the next span starts a new trace.
pub struct Propagator {
    inner: TextMapCompositePropagator,
}

impl Default for Propagator {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Propagator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Propagator")
            .field("fields", &self.fields())
            .finish()
    }
}

impl Propagator {
    pub fn new() -> Self {
        Self {
            inner: TextMapCompositePropagator::new(vec![
                Box::new(TraceContextPropagator::new()),
                Box::new(BaggagePropagator::new()),
            ]),
        }
    }

    /// Header names this propagator reads and writes.
    pub fn fields(&self) -> Vec<String> {
        self.inner.fields().map(str::to_string).collect()
    }

    /// Write the span context and baggage of `cx` into `headers`.
    pub fn inject_context(&self, cx: &Context, headers: &mut HeaderMap) {
        self.inner.inject_context(cx, &mut HeaderInjector(headers));
    }

    /// Remote parent and baggage carried by `headers`, on top of the
    /// current context.
    pub fn extract(&self, headers: &HeaderMap) -> Context {
        self.inner.extract(&HeaderExtractor(headers))
    }

    pub fn extract_with_context(&self, cx: &Context, headers: &HeaderMap) -> Context {
        self.inner.extract_with_context(cx, &HeaderExtractor(headers))
    }
}

/// Extractor over request headers
pub struct HeaderExtractor<'a>(pub &'a HeaderMap);

impl Extractor for HeaderExtractor<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|value| value.to_str().ok())
    }

    fn keys(&self) -> Vec<&str> {
        self.0.keys().map(HeaderName::as_str).collect()
    }
}

/// Injector over outgoing headers. Values that are not valid header text
/// are skipped.
pub struct HeaderInjector<'a>(pub &'a mut HeaderMap);

impl Injector for HeaderInjector<'_> {
    fn set(&mut self, key: &str, value: String) {
        let Ok(name) = HeaderName::from_bytes(key.as_bytes()) else {
            return;
        };
        let Ok(value) = HeaderValue::from_str(&value) else {
            return;
        };
        self.0.insert(name, value);
    }
}
