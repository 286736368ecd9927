//! Telemetry bootstrap and coordinated shutdown

use crate::config::TelemetryConfig;
use crate::env::{EnvSource, ProcessEnv};
use crate::error::{ExportError, ExportResult, ShutdownErrors, Signal, TelemetryError, TelemetryResult};
use crate::exporter::{ExporterFactory, NoopExporterFactory, ReleaseSlot};
use crate::logs::build_log_provider;
use crate::metrics::{MetricPipeline, PrometheusExporter, build_metric_provider};
use crate::propagation::Propagator;
use crate::resolver::{ResourceResolver, RuntimeProbe};
use crate::resource::Resource;
use crate::trace::build_trace_provider;
use async_trait::async_trait;
use opentelemetry_sdk::error::OTelSdkResult;
use opentelemetry_sdk::logs::SdkLoggerProvider;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use opentelemetry_sdk::trace::SdkTracerProvider;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

/// A fallible teardown step run during coordinated shutdown.
#[async_trait]
pub trait ShutdownHook: Send + Sync {
    fn name(&self) -> &str;

    /// Export anything buffered without closing.
    async fn force_flush(&self) -> ExportResult {
        Ok(())
    }

    async fn shutdown(&self) -> ExportResult;
}

/// Blocking flush and close of an SDK provider.
pub(crate) trait SdkPipeline: Clone + Send + Sync + 'static {
    fn flush(&self) -> OTelSdkResult;

    fn close(&self, timeout: Duration) -> OTelSdkResult;
}

impl SdkPipeline for SdkTracerProvider {
    fn flush(&self) -> OTelSdkResult {
        self.force_flush()
    }

    fn close(&self, timeout: Duration) -> OTelSdkResult {
        self.shutdown_with_timeout(timeout)
    }
}

impl SdkPipeline for SdkMeterProvider {
    fn flush(&self) -> OTelSdkResult {
        self.force_flush()
    }

    fn close(&self, timeout: Duration) -> OTelSdkResult {
        self.shutdown_with_timeout(timeout)
    }
}

impl SdkPipeline for SdkLoggerProvider {
    fn flush(&self) -> OTelSdkResult {
        self.force_flush()
    }

    fn close(&self, timeout: Duration) -> OTelSdkResult {
        self.shutdown_with_timeout(timeout)
    }
}

/// Shutdown hook of one signal pipeline.
///
/// Flush and close run on the blocking pool and are abandoned once the
/// export timeout elapses, so a stalled exporter cannot hold up the hooks
/// after it.
pub(crate) struct PipelineHook<P> {
    signal: Signal,
    provider: P,
    timeout: Duration,
    released: ReleaseSlot,
}

impl<P: SdkPipeline> PipelineHook<P> {
    pub(crate) fn new(signal: Signal, provider: P, timeout: Duration, released: ReleaseSlot) -> Self {
        Self {
            signal,
            provider,
            timeout,
            released,
        }
    }

    async fn bounded<F>(&self, op: F) -> ExportResult
    where
        F: FnOnce(P) -> OTelSdkResult + Send + 'static,
    {
        let provider = self.provider.clone();
        let task = tokio::task::spawn_blocking(move || op(provider));
        match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(result)) => result.map_err(ExportError::from),
            Ok(Err(join)) => Err(ExportError::failed(format!(
                "{} pipeline task failed: {join}",
                self.signal
            ))),
            Err(_) => {
                tracing::warn!(
                    signal = %self.signal,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "pipeline did not finish within the export timeout"
                );
                Err(ExportError::Timeout(self.timeout))
            }
        }
    }
}

#[async_trait]
impl<P: SdkPipeline> ShutdownHook for PipelineHook<P> {
    fn name(&self) -> &str {
        self.signal.as_str()
    }

    async fn force_flush(&self) -> ExportResult {
        self.bounded(|provider| provider.flush()).await
    }

    /// Close the provider. An exporter release failure takes precedence
    /// over the provider's own result.
    async fn shutdown(&self) -> ExportResult {
        let timeout = self.timeout;
        let outcome = self.bounded(move |provider| provider.close(timeout)).await;
        let released = self.released.lock().take();
        match released {
            Some(error) => Err(error),
            None => outcome,
        }
    }
}

/// Lifecycle of a telemetry handle. A handle only exists once bootstrap
/// has succeeded, so it starts out running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LifecycleState {
    Running = 0,
    ShuttingDown = 1,
    Closed = 2,
}

impl LifecycleState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => LifecycleState::Running,
            1 => LifecycleState::ShuttingDown,
            _ => LifecycleState::Closed,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Running => "running",
            LifecycleState::ShuttingDown => "shutting_down",
            LifecycleState::Closed => "closed",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pipelines in start order; hooks are registered in the same order.
const PIPELINES: [Signal; 3] = [Signal::Traces, Signal::Metrics, Signal::Logs];

/// Handle owning the resolved resource, the three providers and every
/// shutdown hook. Pass it (or an [`Instruments`](crate::Instruments) built
/// from it) to whatever needs tracers, meters or loggers.
pub struct Telemetry {
    resource: Resource,
    tracer_provider: SdkTracerProvider,
    meter_provider: SdkMeterProvider,
    logger_provider: SdkLoggerProvider,
    prometheus: Option<PrometheusExporter>,
    propagator: Propagator,
    hooks: Vec<Box<dyn ShutdownHook>>,
    state: AtomicU8,
}

impl fmt::Debug for Telemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hooks: Vec<&str> = self.hooks.iter().map(|h| h.name()).collect();
        f.debug_struct("Telemetry")
            .field("service", &self.resource.service_name())
            .field("state", &self.state())
            .field("hooks", &hooks)
            .field("prometheus", &self.prometheus.is_some())
            .finish()
    }
}

impl Telemetry {
    /// Start configuring telemetry for `service_name`.
    pub fn builder(service_name: impl Into<String>) -> TelemetryBuilder {
        TelemetryBuilder::new(service_name)
    }

    pub fn state(&self) -> LifecycleState {
        LifecycleState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn resource(&self) -> &Resource {
        &self.resource
    }

    pub fn tracer_provider(&self) -> &SdkTracerProvider {
        &self.tracer_provider
    }

    pub fn meter_provider(&self) -> &SdkMeterProvider {
        &self.meter_provider
    }

    pub fn logger_provider(&self) -> &SdkLoggerProvider {
        &self.logger_provider
    }

    /// The scrape handle, when Prometheus export is enabled.
    pub fn prometheus(&self) -> Option<&PrometheusExporter> {
        self.prometheus.as_ref()
    }

    /// W3C trace context and baggage propagation for inbound and outbound
    /// requests.
    pub fn propagator(&self) -> &Propagator {
        &self.propagator
    }

    /// Names of the registered hooks, in registration order.
    pub fn hook_names(&self) -> Vec<&str> {
        self.hooks.iter().map(|h| h.name()).collect()
    }

    /// Export everything buffered in all pipelines without shutting down.
    /// Every pipeline is flushed, each within its export timeout; the first
    /// failure is returned.
    pub async fn force_flush(&self) -> TelemetryResult<()> {
        let mut outcome = Ok(());
        for (signal, hook) in PIPELINES.into_iter().zip(&self.hooks) {
            if let Err(source) = hook.force_flush().await {
                tracing::warn!(hook = hook.name(), error = %source, "flush failed");
                if outcome.is_ok() {
                    outcome = Err(TelemetryError::Export { signal, source });
                }
            }
        }
        outcome
    }

    /// Run every shutdown hook once, in reverse registration order.
    ///
    /// A failing or stalled hook does not stop the ones after it. Failures
    /// are returned together as [`TelemetryError::Shutdown`]. Calling this
    /// again after the first call is a no-op returning `Ok`.
    pub async fn shutdown(&self) -> TelemetryResult<()> {
        if self
            .state
            .compare_exchange(
                LifecycleState::Running as u8,
                LifecycleState::ShuttingDown as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            tracing::debug!(state = %self.state(), "telemetry already shut down");
            return Ok(());
        }

        tracing::info!(hooks = self.hooks.len(), "shutting down telemetry");
        let errors = run_hooks(self.hooks.iter().rev()).await;
        self.state
            .store(LifecycleState::Closed as u8, Ordering::Release);

        if errors.is_empty() {
            tracing::info!("telemetry shut down");
            Ok(())
        } else {
            Err(TelemetryError::Shutdown(errors))
        }
    }
}

impl Drop for Telemetry {
    fn drop(&mut self) {
        if self.state() == LifecycleState::Running {
            tracing::warn!("telemetry dropped without shutdown, buffered data may be lost");
        }
    }
}

async fn run_hooks<'a>(hooks: impl Iterator<Item = &'a Box<dyn ShutdownHook>>) -> ShutdownErrors {
    let mut errors = ShutdownErrors::new();
    for hook in hooks {
        match hook.shutdown().await {
            Ok(()) => tracing::debug!(hook = hook.name(), "shutdown hook completed"),
            Err(error) => {
                tracing::error!(hook = hook.name(), %error, "shutdown hook failed");
                errors.push(hook.name(), error);
            }
        }
    }
    errors
}

/// Builder for [`Telemetry`]
pub struct TelemetryBuilder<F = NoopExporterFactory> {
    config: TelemetryConfig,
    exporters: F,
    env: Arc<dyn EnvSource>,
    probe: RuntimeProbe,
}

impl TelemetryBuilder {
    /// Create a new telemetry builder
    pub fn new(service_name: impl Into<String>) -> Self {
        Self::with_config(TelemetryConfig::new(service_name))
    }

    /// Start from a full configuration.
    pub fn with_config(config: TelemetryConfig) -> Self {
        Self {
            config,
            exporters: NoopExporterFactory,
            env: Arc::new(ProcessEnv),
            probe: RuntimeProbe::default(),
        }
    }
}

impl<F: ExporterFactory> TelemetryBuilder<F> {
    /// Set service version
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.config = self.config.with_version(version);
        self
    }

    /// Set environment
    pub fn with_environment(mut self, env: impl Into<String>) -> Self {
        self.config = self.config.with_environment(env);
        self
    }

    /// Set sampling ratio (0.0 to 1.0)
    pub fn with_sampling_ratio(mut self, ratio: f64) -> Self {
        self.config = self.config.with_sampling_ratio(ratio);
        self
    }

    /// Add a resource attribute
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config = self.config.with_attribute(key, value);
        self
    }

    /// Exporters for the three pipelines. Defaults to discarding everything.
    pub fn with_exporters<G: ExporterFactory>(self, exporters: G) -> TelemetryBuilder<G> {
        TelemetryBuilder {
            config: self.config,
            exporters,
            env: self.env,
            probe: self.probe,
        }
    }

    /// Environment used for resource resolution and endpoint lookup.
    pub fn with_env(mut self, env: Arc<dyn EnvSource>) -> Self {
        self.env = env;
        self
    }

    pub fn with_probe(mut self, probe: RuntimeProbe) -> Self {
        self.probe = probe;
        self
    }

    /// Resolve the resource and start the trace, metric and log pipelines,
    /// in that order.
    ///
    /// Any failure aborts the whole bootstrap: pipelines already started are
    /// shut down before the error is returned.
    pub async fn build(self) -> TelemetryResult<Telemetry> {
        let config = self.config.normalized();
        config.validate()?;

        let resource = ResourceResolver::new(Arc::clone(&self.env))
            .with_probe(self.probe)
            .resolve(&config)?;

        let exporters = &self.exporters;
        let env = self.env.as_ref();
        let mut hooks: Vec<Box<dyn ShutdownHook>> = Vec::with_capacity(PIPELINES.len());

        let tracer_provider = register(
            &mut hooks,
            build_trace_provider(&resource, &config, exporters, env),
        )
        .await?;
        let MetricPipeline {
            provider: meter_provider,
            prometheus,
        } = register(
            &mut hooks,
            build_metric_provider(&resource, &config, exporters, env),
        )
        .await?;
        let logger_provider = register(
            &mut hooks,
            build_log_provider(&resource, &config, exporters, env),
        )
        .await?;

        tracing::info!(
            service.name = resource.service_name(),
            resource_attributes = resource.len(),
            "telemetry running"
        );
        Ok(Telemetry {
            resource,
            tracer_provider,
            meter_provider,
            logger_provider,
            prometheus,
            propagator: Propagator::new(),
            hooks,
            state: AtomicU8::new(LifecycleState::Running as u8),
        })
    }
}

/// Keep the hook of a successfully built pipeline, or tear down everything
/// registered so far and pass the error on.
async fn register<P>(
    hooks: &mut Vec<Box<dyn ShutdownHook>>,
    built: TelemetryResult<(P, Box<dyn ShutdownHook>)>,
) -> TelemetryResult<P> {
    match built {
        Ok((provider, hook)) => {
            hooks.push(hook);
            Ok(provider)
        }
        Err(error) => {
            tracing::error!(%error, started = hooks.len(), "telemetry bootstrap failed, cleaning up");
            let cleanup = run_hooks(hooks.iter().rev()).await;
            hooks.clear();
            if !cleanup.is_empty() {
                tracing::warn!(%cleanup, "cleanup after failed bootstrap reported errors");
            }
            Err(error)
        }
    }
}
