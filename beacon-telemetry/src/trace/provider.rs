//! The trace pipeline builder

use super::limits::TruncatingProcessor;
use super::sampler::ParentRatioSampler;
use crate::config::{BatchConfig, TelemetryConfig};
use crate::env::EnvSource;
use crate::error::{Signal, TelemetryError, TelemetryResult};
use crate::exporter::{Endpoint, ExporterFactory, Tracked};
use crate::lifecycle::{PipelineHook, ShutdownHook};
use crate::resource::Resource;
use opentelemetry_sdk::trace::{BatchConfigBuilder, BatchSpanProcessor, SdkTracerProvider};

/// SDK batching parameters for spans.
pub(crate) fn span_batch_config(batch: &BatchConfig) -> opentelemetry_sdk::trace::BatchConfig {
    BatchConfigBuilder::default()
        .with_max_queue_size(batch.max_queue_size)
        .with_max_export_batch_size(batch.max_export_batch_size)
        .with_scheduled_delay(batch.batch_timeout())
        .build()
}

/// Build the trace pipeline: exporter, parent-aware ratio sampler, span
/// limits and batch processor.
///
/// Exporter construction failure is returned as is; no pipeline is started.
pub fn build_trace_provider<F: ExporterFactory>(
    resource: &Resource,
    config: &TelemetryConfig,
    exporters: &F,
    env: &dyn EnvSource,
) -> TelemetryResult<(SdkTracerProvider, Box<dyn ShutdownHook>)> {
    let batch = config.traces.batch;
    let endpoint = Endpoint::resolve(Signal::Traces, config, env, batch.export_timeout())?;
    let exporter = exporters
        .span_exporter(&endpoint)
        .map_err(|source| TelemetryError::ExporterConstruction {
            signal: Signal::Traces,
            source,
        })?;
    let (exporter, released) = Tracked::new(exporter);

    let limits = config.traces.limits;
    let processor = BatchSpanProcessor::builder(exporter)
        .with_batch_config(span_batch_config(&batch))
        .build();
    let provider = SdkTracerProvider::builder()
        .with_resource(resource.to_sdk_resource())
        .with_sampler(ParentRatioSampler::new(config.sampling_ratio))
        .with_span_limits(limits.to_sdk())
        .with_span_processor(TruncatingProcessor::new(
            processor,
            limits.max_attribute_value_length,
        ))
        .build();

    tracing::info!(
        endpoint = %endpoint.url,
        sampling_ratio = config.sampling_ratio,
        "trace pipeline started"
    );
    let hook = PipelineHook::new(
        Signal::Traces,
        provider.clone(),
        batch.export_timeout(),
        released,
    );
    Ok((provider, Box::new(hook)))
}
