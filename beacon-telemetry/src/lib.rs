//! Telemetry provider lifecycle for Beacon services
//!
//! This crate bootstraps the trace, metric and log pipelines of a process and
//! tears them down again:
//! - Resource resolution from configuration, environment variables, runtime
//!   detection and defaults, with a fixed precedence
//! - A batched trace pipeline with parent-aware ratio sampling and span
//!   limits, built on `opentelemetry_sdk`
//! - A metric pipeline with a periodic push reader and a Prometheus scrape
//!   reader over the same instruments
//! - A batched log pipeline with automatic trace correlation and a `tracing`
//!   bridge
//! - W3C trace context and baggage propagation over HTTP headers
//! - Coordinated shutdown in reverse start order, each hook bounded by its
//!   export timeout, with aggregated errors
//!
//! The wire protocol is not part of this crate: pipelines export through the
//! SDK exporter traits, built by an [`ExporterFactory`].
//!
//! # Examples
//!
//! ## Configuration
//!
//! ```
//! use beacon_telemetry::TelemetryConfig;
//!
//! let config = TelemetryConfig::new("checkout")
//!     .with_version("1.4.2")
//!     .with_environment("production")
//!     .with_sampling_ratio(0.25)
//!     .with_collector_endpoint("https://otel.internal:4318");
//!
//! assert_eq!(config.service_name.as_deref(), Some("checkout"));
//! assert_eq!(config.endpoints.traces, "https://otel.internal:4318/v1/traces");
//! assert!(config.validate().is_ok());
//! ```
//!
//! ## Configuration from TOML
//!
//! ```
//! use beacon_telemetry::TelemetryConfig;
//!
//! let config = TelemetryConfig::from_toml_str(
//!     r#"
//!     service_name = "checkout"
//!     sampling_ratio = 0.5
//!     enable_prometheus = false
//!
//!     [traces.batch]
//!     max_queue_size = 4096
//!     "#,
//! )
//! .unwrap();
//!
//! assert_eq!(config.sampling_ratio, 0.5);
//! assert_eq!(config.traces.batch.max_queue_size, 4096);
//! assert!(!config.enable_prometheus);
//! ```
//!
//! ## Bootstrap and shutdown (requires an exporter factory)
//!
//! ```no_run
//! use beacon_telemetry::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), TelemetryError> {
//!     let telemetry = Telemetry::builder("checkout")
//!         .with_version("1.4.2")
//!         .with_exporters(InMemoryExporterFactory::new())
//!         .build()
//!         .await?;
//!
//!     init_subscriber(
//!         &SubscriberConfig::from_env(&ProcessEnv),
//!         Some(telemetry.logger_provider()),
//!     )?;
//!
//!     let instruments = Instruments::new(&telemetry);
//!     let requests = instruments.meter("checkout.http").u64_counter("http.requests").build();
//!     instruments.tracer("checkout.http").in_span("GET /cart", |_cx| {
//!         requests.add(1, &[KeyValue::new("http.method", "GET")]);
//!         tracing::info!("cart served");
//!     });
//!
//!     telemetry.shutdown().await?;
//!     Ok(())
//! }
//! ```

pub mod accessor;
pub mod attribute;
pub mod config;
pub mod env;
pub mod error;
pub mod exporter;
pub mod lifecycle;
pub mod logs;
pub mod metrics;
pub mod propagation;
pub mod resolver;
pub mod resource;
pub mod subscriber;
pub mod trace;

pub use accessor::Instruments;
pub use attribute::{Attribute, AttributeValue};
pub use config::{
    BatchConfig, DEFAULT_COLLECTOR_ENDPOINT, EndpointConfig, HTTP_LATENCY_BUCKETS, LogsConfig,
    MetricsConfig, PrometheusConfig, TelemetryConfig, TraceConfig, ViewConfig,
};
pub use env::{EnvSource, ProcessEnv};
pub use error::{
    ExportError, ExportResult, ShutdownErrors, Signal, TelemetryError, TelemetryResult,
};
pub use exporter::{
    Endpoint, ExportedLog, ExporterFactory, InMemoryExporter, InMemoryExporterFactory,
    InMemoryLogExporter, InMemoryMetricExporter, InMemorySpanExporter, NoopExporter,
    NoopExporterFactory,
};
pub use lifecycle::{LifecycleState, ShutdownHook, Telemetry, TelemetryBuilder};
pub use logs::{Logger, SdkLoggerProvider, Severity};
pub use metrics::{
    Counter, ExportedMetric, Gauge, Histogram, InstrumentKind, Meter, MetricPoint, MetricShape,
    MetricsSnapshot, PROMETHEUS_CONTENT_TYPE, PointValue, PrometheusExporter, SdkMeterProvider,
    UpDownCounter, View,
};
pub use propagation::{HeaderExtractor, HeaderInjector, Propagator};
pub use resolver::{RESOURCE_ATTRIBUTES_ENV, ResourceResolver, RuntimeProbe};
pub use resource::{Resource, ResourceBuilder};
pub use subscriber::{LogFormat, LogLevel, SubscriberConfig, init_subscriber};
pub use trace::{
    ParentRatioSampler, SdkTracerProvider, Span, SpanData, SpanKind, SpanLimits, Status,
    TraceContextExt, Tracer, TracerProvider,
};

// Re-export OpenTelemetry types callers need for instrumentation and propagation
pub use opentelemetry::trace::{SpanContext, SpanId, TraceFlags, TraceId};
pub use opentelemetry::{Context, KeyValue};
pub use opentelemetry_sdk::logs::{LogExporter, SdkLogRecord};
pub use opentelemetry_sdk::metrics::exporter::PushMetricExporter;
pub use opentelemetry_sdk::trace::SpanExporter;
