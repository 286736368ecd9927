//! Exporter capability
//!
//! The wire protocol is not implemented here. Pipelines hand their output to
//! `opentelemetry_sdk` exporters, and an [`ExporterFactory`] builds one
//! exporter per signal from its resolved [`Endpoint`].

use crate::config::TelemetryConfig;
use crate::env::EnvSource;
use crate::error::{ExportError, Signal, TelemetryError, TelemetryResult};
use crate::metrics::MetricsSnapshot;
use opentelemetry::InstrumentationScope;
use opentelemetry::logs::{AnyValue, Severity};
use opentelemetry::trace::{SpanId, TraceId};
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::error::{OTelSdkError, OTelSdkResult};
use opentelemetry_sdk::logs::{LogBatch, LogExporter, SdkLogRecord};
use opentelemetry_sdk::metrics::Temporality;
use opentelemetry_sdk::metrics::data::ResourceMetrics;
use opentelemetry_sdk::metrics::exporter::PushMetricExporter;
use opentelemetry_sdk::trace::{SpanData, SpanExporter};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use url::Url;

/// Where and how a signal is exported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub signal: Signal,
    pub url: Url,
    pub insecure: bool,
    pub timeout: Duration,
}

impl Endpoint {
    /// Parse and check an endpoint URI.
    ///
    /// Plaintext `http` is only accepted when `insecure` is set.
    pub fn parse(
        signal: Signal,
        raw: &str,
        insecure: bool,
        timeout: Duration,
    ) -> Result<Self, ExportError> {
        let url = Url::parse(raw).map_err(|e| ExportError::InvalidEndpoint(format!("{raw}: {e}")))?;

        match url.scheme() {
            "https" => {}
            "http" if insecure => {}
            "http" => return Err(ExportError::InsecureEndpoint(raw.to_string())),
            other => {
                return Err(ExportError::InvalidEndpoint(format!(
                    "{raw}: unsupported scheme '{other}'"
                )));
            }
        }

        if url.host_str().is_none() {
            return Err(ExportError::InvalidEndpoint(format!("{raw}: missing host")));
        }

        Ok(Self {
            signal,
            url,
            insecure,
            timeout,
        })
    }

    /// Resolve the endpoint for `signal` from configuration and environment.
    pub fn resolve(
        signal: Signal,
        config: &TelemetryConfig,
        env: &dyn EnvSource,
        timeout: Duration,
    ) -> TelemetryResult<Self> {
        let raw = config.endpoint(signal, env);
        Self::parse(signal, &raw, config.insecure, timeout)
            .map_err(|source| TelemetryError::ExporterConstruction { signal, source })
    }
}

/// Builds the SDK exporters for the three signal pipelines. Construction may
/// fail, which aborts bootstrap.
pub trait ExporterFactory: Send + Sync + 'static {
    type Spans: SpanExporter + 'static;
    type Metrics: PushMetricExporter;
    type Logs: LogExporter + 'static;

    fn span_exporter(&self, endpoint: &Endpoint) -> Result<Self::Spans, ExportError>;

    fn metric_exporter(&self, endpoint: &Endpoint) -> Result<Self::Metrics, ExportError>;

    fn log_exporter(&self, endpoint: &Endpoint) -> Result<Self::Logs, ExportError>;
}

impl<F: ExporterFactory> ExporterFactory for Arc<F> {
    type Spans = F::Spans;
    type Metrics = F::Metrics;
    type Logs = F::Logs;

    fn span_exporter(&self, endpoint: &Endpoint) -> Result<Self::Spans, ExportError> {
        (**self).span_exporter(endpoint)
    }

    fn metric_exporter(&self, endpoint: &Endpoint) -> Result<Self::Metrics, ExportError> {
        (**self).metric_exporter(endpoint)
    }

    fn log_exporter(&self, endpoint: &Endpoint) -> Result<Self::Logs, ExportError> {
        (**self).log_exporter(endpoint)
    }
}

/// Exporter that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopExporter;

impl SpanExporter for NoopExporter {
    async fn export(&self, _batch: Vec<SpanData>) -> OTelSdkResult {
        Ok(())
    }
}

impl PushMetricExporter for NoopExporter {
    async fn export(&self, _metrics: &ResourceMetrics) -> OTelSdkResult {
        Ok(())
    }

    fn force_flush(&self) -> OTelSdkResult {
        Ok(())
    }

    fn shutdown_with_timeout(&self, _timeout: Duration) -> OTelSdkResult {
        Ok(())
    }

    fn temporality(&self) -> Temporality {
        Temporality::Cumulative
    }
}

impl LogExporter for NoopExporter {
    async fn export(&self, _batch: LogBatch<'_>) -> OTelSdkResult {
        Ok(())
    }
}

/// Factory producing [`NoopExporter`]s for every signal.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopExporterFactory;

impl ExporterFactory for NoopExporterFactory {
    type Spans = NoopExporter;
    type Metrics = NoopExporter;
    type Logs = NoopExporter;

    fn span_exporter(&self, _endpoint: &Endpoint) -> Result<NoopExporter, ExportError> {
        Ok(NoopExporter)
    }

    fn metric_exporter(&self, _endpoint: &Endpoint) -> Result<NoopExporter, ExportError> {
        Ok(NoopExporter)
    }

    fn log_exporter(&self, _endpoint: &Endpoint) -> Result<NoopExporter, ExportError> {
        Ok(NoopExporter)
    }
}

/// Last release failure reported by an exporter's shutdown.
pub(crate) type ReleaseSlot = Arc<Mutex<Option<ExportError>>>;

/// Wraps a factory exporter and records the outcome of its shutdown.
///
/// The SDK batch processors discard the exporter's shutdown result, so the
/// owning hook reads it back from the slot.
#[derive(Debug)]
pub(crate) struct Tracked<E> {
    inner: E,
    released: ReleaseSlot,
}

impl<E> Tracked<E> {
    pub(crate) fn new(inner: E) -> (Self, ReleaseSlot) {
        let released = ReleaseSlot::default();
        (
            Self {
                inner,
                released: Arc::clone(&released),
            },
            released,
        )
    }

    fn record(&self, result: OTelSdkResult) -> OTelSdkResult {
        result.map_err(|error| {
            let error = ExportError::from(error);
            *self.released.lock() = Some(error.clone());
            OTelSdkError::from(error)
        })
    }
}

impl<E: SpanExporter> SpanExporter for Tracked<E> {
    fn export(
        &self,
        batch: Vec<SpanData>,
    ) -> impl std::future::Future<Output = OTelSdkResult> + Send {
        self.inner.export(batch)
    }

    fn shutdown_with_timeout(&mut self, timeout: Duration) -> OTelSdkResult {
        let result = self.inner.shutdown_with_timeout(timeout);
        self.record(result)
    }

    fn force_flush(&mut self) -> OTelSdkResult {
        self.inner.force_flush()
    }

    fn set_resource(&mut self, resource: &Resource) {
        self.inner.set_resource(resource);
    }
}

impl<E: PushMetricExporter> PushMetricExporter for Tracked<E> {
    fn export(
        &self,
        metrics: &ResourceMetrics,
    ) -> impl std::future::Future<Output = OTelSdkResult> + Send {
        self.inner.export(metrics)
    }

    fn force_flush(&self) -> OTelSdkResult {
        self.inner.force_flush()
    }

    fn shutdown_with_timeout(&self, timeout: Duration) -> OTelSdkResult {
        self.record(self.inner.shutdown_with_timeout(timeout))
    }

    fn temporality(&self) -> Temporality {
        self.inner.temporality()
    }
}

impl<E: LogExporter> LogExporter for Tracked<E> {
    fn export(
        &self,
        batch: LogBatch<'_>,
    ) -> impl std::future::Future<Output = OTelSdkResult> + Send {
        self.inner.export(batch)
    }

    fn shutdown_with_timeout(&self, timeout: Duration) -> OTelSdkResult {
        self.record(self.inner.shutdown_with_timeout(timeout))
    }

    fn set_resource(&mut self, resource: &Resource) {
        self.inner.set_resource(resource);
    }
}

#[derive(Debug)]
struct InMemoryState<T> {
    items: Mutex<Vec<T>>,
    resource: Mutex<Option<Resource>>,
    fail_exports: AtomicBool,
    fail_shutdown: AtomicBool,
    export_calls: AtomicUsize,
    shutdown_calls: AtomicUsize,
}

impl<T> Default for InMemoryState<T> {
    fn default() -> Self {
        Self {
            items: Mutex::new(Vec::new()),
            resource: Mutex::new(None),
            fail_exports: AtomicBool::new(false),
            fail_shutdown: AtomicBool::new(false),
            export_calls: AtomicUsize::new(0),
            shutdown_calls: AtomicUsize::new(0),
        }
    }
}

/// Exporter that keeps everything it receives, for inspection in tests and
/// local tooling. Clones share storage.
#[derive(Debug)]
pub struct InMemoryExporter<T> {
    state: Arc<InMemoryState<T>>,
}

pub type InMemorySpanExporter = InMemoryExporter<SpanData>;
pub type InMemoryMetricExporter = InMemoryExporter<MetricsSnapshot>;
pub type InMemoryLogExporter = InMemoryExporter<ExportedLog>;

impl<T> Clone for InMemoryExporter<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<T> Default for InMemoryExporter<T> {
    fn default() -> Self {
        Self {
            state: Arc::new(InMemoryState::default()),
        }
    }
}

impl<T: Clone> InMemoryExporter<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything exported so far, in export order.
    pub fn exported(&self) -> Vec<T> {
        self.state.items.lock().clone()
    }

    pub fn reset(&self) {
        self.state.items.lock().clear();
    }

    /// Resource handed over by the pipeline, if any.
    pub fn resource(&self) -> Option<Resource> {
        self.state.resource.lock().clone()
    }

    /// Make subsequent exports fail.
    pub fn set_fail_exports(&self, fail: bool) {
        self.state.fail_exports.store(fail, Ordering::SeqCst);
    }

    /// Make `shutdown` fail.
    pub fn set_fail_shutdown(&self, fail: bool) {
        self.state.fail_shutdown.store(fail, Ordering::SeqCst);
    }

    pub fn export_calls(&self) -> usize {
        self.state.export_calls.load(Ordering::SeqCst)
    }

    pub fn shutdown_calls(&self) -> usize {
        self.state.shutdown_calls.load(Ordering::SeqCst)
    }

    fn record(&self, items: impl IntoIterator<Item = T>) -> OTelSdkResult {
        self.state.export_calls.fetch_add(1, Ordering::SeqCst);
        if self.state.fail_exports.load(Ordering::SeqCst) {
            return Err(OTelSdkError::InternalFailure(
                "in-memory exporter rejected the batch".to_string(),
            ));
        }
        self.state.items.lock().extend(items);
        Ok(())
    }

    fn close(&self) -> OTelSdkResult {
        self.state.shutdown_calls.fetch_add(1, Ordering::SeqCst);
        if self.state.fail_shutdown.load(Ordering::SeqCst) {
            return Err(OTelSdkError::InternalFailure(
                "in-memory exporter failed to shut down".to_string(),
            ));
        }
        Ok(())
    }

    fn keep_resource(&self, resource: &Resource) {
        *self.state.resource.lock() = Some(resource.clone());
    }
}

impl SpanExporter for InMemorySpanExporter {
    async fn export(&self, batch: Vec<SpanData>) -> OTelSdkResult {
        self.record(batch)
    }

    fn shutdown_with_timeout(&mut self, _timeout: Duration) -> OTelSdkResult {
        self.close()
    }

    fn set_resource(&mut self, resource: &Resource) {
        self.keep_resource(resource);
    }
}

impl PushMetricExporter for InMemoryMetricExporter {
    async fn export(&self, metrics: &ResourceMetrics) -> OTelSdkResult {
        self.keep_resource(metrics.resource());
        self.record([MetricsSnapshot::from_sdk(metrics)])
    }

    fn force_flush(&self) -> OTelSdkResult {
        Ok(())
    }

    fn shutdown_with_timeout(&self, _timeout: Duration) -> OTelSdkResult {
        self.close()
    }

    fn temporality(&self) -> Temporality {
        Temporality::Cumulative
    }
}

impl LogExporter for InMemoryLogExporter {
    async fn export(&self, batch: LogBatch<'_>) -> OTelSdkResult {
        self.record(batch.iter().map(|(record, scope)| ExportedLog {
            record: record.clone(),
            scope: scope.clone(),
        }))
    }

    fn shutdown_with_timeout(&self, _timeout: Duration) -> OTelSdkResult {
        self.close()
    }

    fn set_resource(&mut self, resource: &Resource) {
        self.keep_resource(resource);
    }
}

/// Owned copy of an exported log record and the scope that emitted it.
#[derive(Debug, Clone)]
pub struct ExportedLog {
    pub record: SdkLogRecord,
    pub scope: InstrumentationScope,
}

impl ExportedLog {
    /// Body rendered as text; string bodies are returned verbatim.
    pub fn body(&self) -> Option<String> {
        self.record.body().map(|body| match body {
            AnyValue::String(text) => text.as_str().to_string(),
            other => format!("{other:?}"),
        })
    }

    pub fn severity(&self) -> Option<Severity> {
        self.record.severity_number()
    }

    pub fn trace_id(&self) -> Option<TraceId> {
        self.record.trace_context().map(|cx| cx.trace_id)
    }

    pub fn span_id(&self) -> Option<SpanId> {
        self.record.trace_context().map(|cx| cx.span_id)
    }

    pub fn attribute(&self, key: &str) -> Option<&AnyValue> {
        self.record
            .attributes_iter()
            .find(|(k, _)| k.as_str() == key)
            .map(|(_, value)| value)
    }
}

/// Factory handing out clones of three shared in-memory exporters.
#[derive(Debug, Clone, Default)]
pub struct InMemoryExporterFactory {
    pub spans: InMemorySpanExporter,
    pub metrics: InMemoryMetricExporter,
    pub logs: InMemoryLogExporter,
}

impl InMemoryExporterFactory {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ExporterFactory for InMemoryExporterFactory {
    type Spans = InMemorySpanExporter;
    type Metrics = InMemoryMetricExporter;
    type Logs = InMemoryLogExporter;

    fn span_exporter(&self, _endpoint: &Endpoint) -> Result<InMemorySpanExporter, ExportError> {
        Ok(self.spans.clone())
    }

    fn metric_exporter(
        &self,
        _endpoint: &Endpoint,
    ) -> Result<InMemoryMetricExporter, ExportError> {
        Ok(self.metrics.clone())
    }

    fn log_exporter(&self, _endpoint: &Endpoint) -> Result<InMemoryLogExporter, ExportError> {
        Ok(self.logs.clone())
    }
}
