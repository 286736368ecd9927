//! Configuration for the telemetry pipelines

use crate::env::EnvSource;
use crate::error::{Signal, TelemetryError, TelemetryResult};
use crate::metrics::view::{InstrumentKind, View};
use crate::trace::SpanLimits;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default OTLP/HTTP collector address.
pub const DEFAULT_COLLECTOR_ENDPOINT: &str = "http://localhost:4318";

/// Histogram buckets for HTTP server latency (in seconds)
pub const HTTP_LATENCY_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Telemetry configuration
///
/// Empty strings are treated as unset everywhere; unset identity fields are
/// filled in by the resource resolver from the environment, runtime detection
/// and defaults, in that order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Service name
    pub service_name: Option<String>,

    /// Service version
    pub service_version: Option<String>,

    /// Service namespace
    pub service_namespace: Option<String>,

    /// Service instance id
    pub service_instance_id: Option<String>,

    /// Deployment environment (e.g., "production", "staging", "development")
    pub environment: Option<String>,

    /// Owning team
    pub team: Option<String>,

    /// Owner contact
    pub owner: Option<String>,

    /// Build timestamp
    pub build_time: Option<String>,

    /// Git commit the binary was built from
    pub git_commit: Option<String>,

    /// Git branch the binary was built from
    pub git_branch: Option<String>,

    /// Per-signal exporter endpoints
    pub endpoints: EndpointConfig,

    /// Head sampling ratio (0.0 to 1.0)
    pub sampling_ratio: f64,

    /// Serve a Prometheus scrape reader alongside the push exporter
    pub enable_prometheus: bool,

    /// Allow plaintext transport to the collector
    pub insecure: bool,

    /// Tracing configuration
    pub traces: TraceConfig,

    /// Metrics configuration
    pub metrics: MetricsConfig,

    /// Log pipeline configuration
    pub logs: LogsConfig,

    /// Additional resource attributes; these override every other source
    pub resource_attributes: Vec<(String, String)>,
}

/// Exporter endpoints, one per signal. Empty means "resolve from environment or default".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    pub traces: String,
    pub metrics: String,
    pub logs: String,
}

/// Batching policy shared by the span and log processors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Maximum delay before a partial batch is exported
    pub batch_timeout_ms: u64,

    /// Upper bound on a single export call
    pub export_timeout_ms: u64,

    /// Maximum number of items per export call
    pub max_export_batch_size: usize,

    /// Capacity of the pending-item queue; items beyond it are dropped
    pub max_queue_size: usize,
}

/// Tracing configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceConfig {
    pub batch: BatchConfig,
    pub limits: SpanLimits,
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Push interval of the periodic reader
    pub export_interval_ms: u64,

    /// Upper bound on a single push export
    pub export_timeout_ms: u64,

    /// Per-instrument aggregation overrides
    pub views: Vec<ViewConfig>,

    /// Prometheus exposition options
    pub prometheus: PrometheusConfig,
}

/// Naming options for the Prometheus exposition. Both are off by default so
/// series names match what the scrape reader has always produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrometheusConfig {
    /// Append the unit as a name suffix, e.g. `_seconds`
    pub with_units: bool,

    /// Add an `otel_scope_name` label to every series
    pub with_scope_labels: bool,
}

/// Declarative aggregation override keyed by instrument name and kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewConfig {
    pub instrument_name: String,
    pub instrument_kind: Option<InstrumentKind>,
    pub buckets: Vec<f64>,
}

/// Log pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogsConfig {
    pub batch: BatchConfig,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: None,
            service_version: None,
            service_namespace: None,
            service_instance_id: None,
            environment: None,
            team: None,
            owner: None,
            build_time: None,
            git_commit: None,
            git_branch: None,
            endpoints: EndpointConfig::default(),
            sampling_ratio: 1.0,
            enable_prometheus: true,
            insecure: true,
            traces: TraceConfig::default(),
            metrics: MetricsConfig::default(),
            logs: LogsConfig::default(),
            resource_attributes: Vec::new(),
        }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self::traces()
    }
}

impl BatchConfig {
    /// Span batching: 5s batches, 30s export timeout, 512 per batch, 2048 queued.
    pub const fn traces() -> Self {
        Self {
            batch_timeout_ms: 5_000,
            export_timeout_ms: 30_000,
            max_export_batch_size: 512,
            max_queue_size: 2_048,
        }
    }

    /// Log batching flushes more often with a shorter export timeout.
    pub const fn logs() -> Self {
        Self {
            batch_timeout_ms: 1_000,
            export_timeout_ms: 10_000,
            max_export_batch_size: 512,
            max_queue_size: 2_048,
        }
    }

    pub fn batch_timeout(&self) -> Duration {
        Duration::from_millis(self.batch_timeout_ms)
    }

    pub fn export_timeout(&self) -> Duration {
        Duration::from_millis(self.export_timeout_ms)
    }

    fn normalized(self, defaults: BatchConfig) -> Self {
        Self {
            batch_timeout_ms: or_default(self.batch_timeout_ms, defaults.batch_timeout_ms),
            export_timeout_ms: or_default(self.export_timeout_ms, defaults.export_timeout_ms),
            max_export_batch_size: or_default(
                self.max_export_batch_size,
                defaults.max_export_batch_size,
            ),
            max_queue_size: or_default(self.max_queue_size, defaults.max_queue_size),
        }
    }

    fn validate(&self, signal: Signal) -> TelemetryResult<()> {
        if self.max_export_batch_size > self.max_queue_size {
            return Err(TelemetryError::Config(format!(
                "{signal} max_export_batch_size ({}) exceeds max_queue_size ({})",
                self.max_export_batch_size, self.max_queue_size
            )));
        }
        if self.max_export_batch_size == 0 || self.max_queue_size == 0 {
            return Err(TelemetryError::Config(format!(
                "{signal} batch and queue sizes must be positive"
            )));
        }
        if self.batch_timeout_ms == 0 || self.export_timeout_ms == 0 {
            return Err(TelemetryError::Config(format!(
                "{signal} batch and export timeouts must be positive"
            )));
        }
        Ok(())
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            export_interval_ms: 30_000,
            export_timeout_ms: 30_000,
            views: vec![ViewConfig {
                instrument_name: "http.server.request.duration".to_string(),
                instrument_kind: Some(InstrumentKind::Histogram),
                buckets: HTTP_LATENCY_BUCKETS.to_vec(),
            }],
            prometheus: PrometheusConfig::default(),
        }
    }
}

impl MetricsConfig {
    pub fn export_interval(&self) -> Duration {
        Duration::from_millis(self.export_interval_ms)
    }

    pub fn export_timeout(&self) -> Duration {
        Duration::from_millis(self.export_timeout_ms)
    }

    /// Views as consumed by the meter provider.
    pub fn views(&self) -> Vec<View> {
        self.views
            .iter()
            .map(|v| {
                View::histogram_buckets(
                    v.instrument_name.clone(),
                    v.instrument_kind,
                    v.buckets.clone(),
                )
            })
            .collect()
    }
}

impl Default for LogsConfig {
    fn default() -> Self {
        Self {
            batch: BatchConfig::logs(),
        }
    }
}

fn or_default<T: PartialEq + Default>(value: T, default: T) -> T {
    if value == T::default() { default } else { value }
}

impl TelemetryConfig {
    /// Create a new configuration with a service name
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: Some(service_name.into()),
            ..Default::default()
        }
    }

    /// Parse a configuration from TOML; missing keys take their defaults.
    pub fn from_toml_str(source: &str) -> TelemetryResult<Self> {
        Ok(toml::from_str(source)?)
    }

    /// Load a TOML configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> TelemetryResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| {
            TelemetryError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&source)
    }

    /// Set service version
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.service_version = Some(version.into());
        self
    }

    /// Set service namespace
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.service_namespace = Some(namespace.into());
        self
    }

    /// Set service instance id
    pub fn with_instance_id(mut self, instance_id: impl Into<String>) -> Self {
        self.service_instance_id = Some(instance_id.into());
        self
    }

    /// Set environment
    pub fn with_environment(mut self, env: impl Into<String>) -> Self {
        self.environment = Some(env.into());
        self
    }

    /// Set owning team and owner
    pub fn with_ownership(mut self, team: impl Into<String>, owner: impl Into<String>) -> Self {
        self.team = Some(team.into());
        self.owner = Some(owner.into());
        self
    }

    /// Set build metadata
    pub fn with_build_info(
        mut self,
        build_time: impl Into<String>,
        git_commit: impl Into<String>,
        git_branch: impl Into<String>,
    ) -> Self {
        self.build_time = Some(build_time.into());
        self.git_commit = Some(git_commit.into());
        self.git_branch = Some(git_branch.into());
        self
    }

    /// Set one collector base address for all three signals
    pub fn with_collector_endpoint(mut self, base: impl AsRef<str>) -> Self {
        let base = base.as_ref().trim_end_matches('/');
        self.endpoints.traces = format!("{base}/v1/traces");
        self.endpoints.metrics = format!("{base}/v1/metrics");
        self.endpoints.logs = format!("{base}/v1/logs");
        self
    }

    /// Set sampling ratio (0.0 to 1.0)
    pub fn with_sampling_ratio(mut self, ratio: f64) -> Self {
        self.sampling_ratio = ratio;
        self
    }

    /// Enable or disable the Prometheus scrape reader
    pub fn with_prometheus(mut self, enabled: bool) -> Self {
        self.enable_prometheus = enabled;
        self
    }

    /// Allow or forbid plaintext transport
    pub fn with_insecure(mut self, insecure: bool) -> Self {
        self.insecure = insecure;
        self
    }

    /// Add a resource attribute
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.resource_attributes.push((key.into(), value.into()));
        self
    }

    /// Add a histogram bucket override
    pub fn with_view(mut self, view: ViewConfig) -> Self {
        self.metrics.views.push(view);
        self
    }

    /// Replace zero-valued numeric settings by their documented defaults.
    pub fn normalized(mut self) -> Self {
        self.traces.batch = self.traces.batch.normalized(BatchConfig::traces());
        self.traces.limits = self.traces.limits.normalized();
        self.logs.batch = self.logs.batch.normalized(BatchConfig::logs());
        let metric_defaults = MetricsConfig::default();
        self.metrics.export_interval_ms =
            or_default(self.metrics.export_interval_ms, metric_defaults.export_interval_ms);
        self.metrics.export_timeout_ms =
            or_default(self.metrics.export_timeout_ms, metric_defaults.export_timeout_ms);
        if self.sampling_ratio.is_nan() {
            self.sampling_ratio = 1.0;
        }
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> TelemetryResult<()> {
        if !(0.0..=1.0).contains(&self.sampling_ratio) {
            return Err(TelemetryError::Config(
                "Sampling ratio must be between 0.0 and 1.0".to_string(),
            ));
        }

        self.traces.batch.validate(Signal::Traces)?;
        self.logs.batch.validate(Signal::Logs)?;

        if self.metrics.export_interval_ms == 0 || self.metrics.export_timeout_ms == 0 {
            return Err(TelemetryError::Config(
                "metric export interval and timeout must be positive".to_string(),
            ));
        }

        for view in &self.metrics.views {
            if view.instrument_name.is_empty() {
                return Err(TelemetryError::Config(
                    "view instrument name cannot be empty".to_string(),
                ));
            }
            if view.buckets.windows(2).any(|w| w[0] >= w[1]) {
                return Err(TelemetryError::Config(format!(
                    "view '{}' buckets must be strictly increasing",
                    view.instrument_name
                )));
            }
        }

        Ok(())
    }

    /// Endpoint URI for `signal`: explicit config, then the per-signal OTLP
    /// variable, then the generic OTLP variable, then the local collector.
    pub fn endpoint(&self, signal: Signal, env: &dyn EnvSource) -> String {
        let (explicit, specific, path) = match signal {
            Signal::Traces => (
                &self.endpoints.traces,
                "OTEL_EXPORTER_OTLP_TRACES_ENDPOINT",
                "v1/traces",
            ),
            Signal::Metrics => (
                &self.endpoints.metrics,
                "OTEL_EXPORTER_OTLP_METRICS_ENDPOINT",
                "v1/metrics",
            ),
            Signal::Logs => (
                &self.endpoints.logs,
                "OTEL_EXPORTER_OTLP_LOGS_ENDPOINT",
                "v1/logs",
            ),
        };

        if !explicit.trim().is_empty() {
            return explicit.trim().to_string();
        }
        if let Some(endpoint) = env.non_empty(specific) {
            return endpoint;
        }
        let base = env
            .non_empty("OTEL_EXPORTER_OTLP_ENDPOINT")
            .unwrap_or_else(|| DEFAULT_COLLECTOR_ENDPOINT.to_string());
        format!("{}/{path}", base.trim_end_matches('/'))
    }
}
