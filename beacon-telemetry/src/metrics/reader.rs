//! On-demand reader shared between the meter provider and the scrape renderer

use super::snapshot::MetricsSnapshot;
use crate::error::ExportError;
use opentelemetry_sdk::error::OTelSdkResult;
use opentelemetry_sdk::metrics::data::ResourceMetrics;
use opentelemetry_sdk::metrics::reader::MetricReader;
use opentelemetry_sdk::metrics::{InstrumentKind, ManualReader, Pipeline, Temporality};
use std::sync::{Arc, Weak};
use std::time::Duration;

/// [`ManualReader`] behind an `Arc`, so the provider and the Prometheus
/// renderer can hold the same reader. Always cumulative.
#[derive(Debug, Clone)]
pub struct ScrapeReader {
    inner: Arc<ManualReader>,
}

impl Default for ScrapeReader {
    fn default() -> Self {
        Self::new()
    }
}

impl ScrapeReader {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ManualReader::builder().build()),
        }
    }

    /// Collect current state. Fails once the provider has shut down.
    pub fn snapshot(&self) -> Result<MetricsSnapshot, ExportError> {
        let mut collected = ResourceMetrics::default();
        self.inner.collect(&mut collected)?;
        Ok(MetricsSnapshot::from_sdk(&collected))
    }
}

impl MetricReader for ScrapeReader {
    fn register_pipeline(&self, pipeline: Weak<Pipeline>) {
        self.inner.register_pipeline(pipeline)
    }

    fn collect(&self, rm: &mut ResourceMetrics) -> OTelSdkResult {
        self.inner.collect(rm)
    }

    fn force_flush(&self) -> OTelSdkResult {
        self.inner.force_flush()
    }

    fn shutdown_with_timeout(&self, timeout: Duration) -> OTelSdkResult {
        self.inner.shutdown_with_timeout(timeout)
    }

    fn temporality(&self, kind: InstrumentKind) -> Temporality {
        self.inner.temporality(kind)
    }
}
