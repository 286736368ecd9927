// Beacon - observability bootstrap for services
//
// Re-exports the telemetry lifecycle crate and adds a one-call start for
// processes that read their settings from the environment.

pub use beacon_telemetry::*;

/// Build the telemetry pipelines for `config` and install the `tracing`
/// subscriber configured by `BEACON_LOG_*` / `RUST_LOG`, bridged into the log
/// pipeline.
///
/// On subscriber failure the freshly built pipelines are shut down again
/// before the error is returned.
pub async fn start<F: ExporterFactory>(
    config: TelemetryConfig,
    exporters: F,
) -> TelemetryResult<Telemetry> {
    let telemetry = TelemetryBuilder::with_config(config)
        .with_exporters(exporters)
        .build()
        .await?;

    let subscriber = SubscriberConfig::from_env(&ProcessEnv);
    if let Err(error) = init_subscriber(&subscriber, Some(telemetry.logger_provider())) {
        if let Err(cleanup) = telemetry.shutdown().await {
            tracing::warn!(error = %cleanup, "telemetry cleanup after subscriber failure");
        }
        return Err(error);
    }
    Ok(telemetry)
}

// Prelude for common imports
pub mod prelude {
    pub use crate::{
        Attribute,
        Counter,
        ExporterFactory,
        Gauge,
        Histogram,
        Instruments,
        KeyValue,
        LifecycleState,
        Logger,
        Meter,
        Propagator,
        Severity,
        Span,
        SpanKind,
        Status,
        Telemetry,
        TelemetryBuilder,
        TelemetryConfig,
        TelemetryError,
        TelemetryResult,
        TraceContextExt,
        Tracer,
        TracerProvider,
        UpDownCounter,
        start,
    };
}
