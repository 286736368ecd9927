//! The metric pipeline builder

use super::prometheus::PrometheusExporter;
use super::reader::ScrapeReader;
use super::view::select_stream;
use crate::config::TelemetryConfig;
use crate::env::EnvSource;
use crate::error::{Signal, TelemetryError, TelemetryResult};
use crate::exporter::{Endpoint, ExporterFactory, Tracked};
use crate::lifecycle::{PipelineHook, ShutdownHook};
use crate::resource::Resource;
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};

/// A running meter provider and, when enabled, the scrape handle reading
/// from it.
#[derive(Debug, Clone)]
pub struct MetricPipeline {
    pub provider: SdkMeterProvider,
    pub prometheus: Option<PrometheusExporter>,
}

/// Build the metric pipeline: a periodic push reader around the configured
/// exporter and, when enabled, a Prometheus scrape reader. Both readers see
/// the same instruments and the configured bucket overrides.
pub fn build_metric_provider<F: ExporterFactory>(
    resource: &Resource,
    config: &TelemetryConfig,
    exporters: &F,
    env: &dyn EnvSource,
) -> TelemetryResult<(MetricPipeline, Box<dyn ShutdownHook>)> {
    let metrics = &config.metrics;
    let endpoint = Endpoint::resolve(Signal::Metrics, config, env, metrics.export_timeout())?;
    let exporter = exporters
        .metric_exporter(&endpoint)
        .map_err(|source| TelemetryError::ExporterConstruction {
            signal: Signal::Metrics,
            source,
        })?;
    let (exporter, released) = Tracked::new(exporter);

    let periodic = PeriodicReader::builder(exporter)
        .with_interval(metrics.export_interval())
        .build();
    let views = metrics.views();
    let mut builder = SdkMeterProvider::builder()
        .with_resource(resource.to_sdk_resource())
        .with_reader(periodic)
        .with_view(move |instrument| select_stream(&views, instrument));

    let mut prometheus = None;
    if config.enable_prometheus {
        let reader = ScrapeReader::new();
        builder = builder.with_reader(reader.clone());
        prometheus = Some(PrometheusExporter::new(reader, metrics.prometheus));
    }
    let provider = builder.build();

    tracing::info!(
        endpoint = %endpoint.url,
        interval_ms = metrics.export_interval_ms,
        prometheus = config.enable_prometheus,
        "metric pipeline started"
    );
    let hook = PipelineHook::new(
        Signal::Metrics,
        provider.clone(),
        metrics.export_timeout(),
        released,
    );
    Ok((
        MetricPipeline {
            provider,
            prometheus,
        },
        Box::new(hook),
    ))
}
