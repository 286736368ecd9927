//! Metric pipeline
//!
//! One [`SdkMeterProvider`] feeds two readers: a periodic reader pushes
//! cumulative state to the configured exporter, and a [`ScrapeReader`]
//! serves the same instruments to [`PrometheusExporter`] on demand.
//!
//! ```no_run
//! use beacon_telemetry::metrics::SdkMeterProvider;
//! use opentelemetry::KeyValue;
//! use opentelemetry::metrics::MeterProvider as _;
//!
//! # fn example(provider: &SdkMeterProvider) {
//! let meter = provider.meter("checkout");
//! let orders = meter
//!     .u64_counter("orders.placed")
//!     .with_description("Orders accepted")
//!     .build();
//! orders.add(1, &[KeyValue::new("payment.method", "card")]);
//! # }
//! ```

mod prometheus;
mod provider;
pub(crate) mod reader;
mod snapshot;
pub(crate) mod view;

pub use opentelemetry::metrics::{Counter, Gauge, Histogram, Meter, UpDownCounter};
pub use opentelemetry_sdk::metrics::SdkMeterProvider;
pub use prometheus::{CONTENT_TYPE as PROMETHEUS_CONTENT_TYPE, PrometheusExporter, encode};
pub use provider::{MetricPipeline, build_metric_provider};
pub use reader::ScrapeReader;
pub use snapshot::{ExportedMetric, MetricPoint, MetricShape, MetricsSnapshot, PointValue};
pub use view::{InstrumentKind, View};
