//! The log pipeline builder

use crate::config::{BatchConfig, TelemetryConfig};
use crate::env::EnvSource;
use crate::error::{Signal, TelemetryError, TelemetryResult};
use crate::exporter::{Endpoint, ExporterFactory, Tracked};
use crate::lifecycle::{PipelineHook, ShutdownHook};
use crate::resource::Resource;
use opentelemetry_sdk::logs::{BatchConfigBuilder, BatchLogProcessor, SdkLoggerProvider};

/// SDK batching parameters for log records.
pub(crate) fn log_batch_config(batch: &BatchConfig) -> opentelemetry_sdk::logs::BatchConfig {
    BatchConfigBuilder::default()
        .with_max_queue_size(batch.max_queue_size)
        .with_max_export_batch_size(batch.max_export_batch_size)
        .with_scheduled_delay(batch.batch_timeout())
        .build()
}

/// Build the log pipeline: exporter plus a batch processor tuned for log
/// volume.
pub fn build_log_provider<F: ExporterFactory>(
    resource: &Resource,
    config: &TelemetryConfig,
    exporters: &F,
    env: &dyn EnvSource,
) -> TelemetryResult<(SdkLoggerProvider, Box<dyn ShutdownHook>)> {
    let batch = config.logs.batch;
    let endpoint = Endpoint::resolve(Signal::Logs, config, env, batch.export_timeout())?;
    let exporter = exporters
        .log_exporter(&endpoint)
        .map_err(|source| TelemetryError::ExporterConstruction {
            signal: Signal::Logs,
            source,
        })?;
    let (exporter, released) = Tracked::new(exporter);

    let processor = BatchLogProcessor::builder(exporter)
        .with_batch_config(log_batch_config(&batch))
        .build();
    let provider = SdkLoggerProvider::builder()
        .with_resource(resource.to_sdk_resource())
        .with_log_processor(processor)
        .build();

    tracing::info!(endpoint = %endpoint.url, "log pipeline started");
    let hook = PipelineHook::new(
        Signal::Logs,
        provider.clone(),
        batch.export_timeout(),
        released,
    );
    Ok((provider, Box::new(hook)))
}
