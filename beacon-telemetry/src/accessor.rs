//! Named tracer, meter and logger handles for instrumentation call sites

use crate::lifecycle::Telemetry;
use crate::logs::Logger;
use opentelemetry::InstrumentationScope;
use opentelemetry::global::BoxedTracer;
use opentelemetry::logs::LoggerProvider as _;
use opentelemetry::metrics::{InstrumentProvider, Meter, MeterProvider as _};
use opentelemetry::trace::TracerProvider as _;
use opentelemetry::trace::noop::NoopTracer;
use opentelemetry_sdk::logs::SdkLoggerProvider;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use opentelemetry_sdk::trace::SdkTracerProvider;
use std::borrow::Cow;
use std::sync::Arc;

/// Hands out instruments backed by one [`Telemetry`] handle.
///
/// Cheap to clone and safe to use at any point in the lifecycle: once a
/// provider is shutting down or closed, the handles it returns record
/// nothing.
///
/// ```no_run
/// use beacon_telemetry::{Instruments, Telemetry};
/// use opentelemetry::trace::Tracer as _;
///
/// # async fn example() -> beacon_telemetry::TelemetryResult<()> {
/// let telemetry = Telemetry::builder("checkout").build().await?;
/// let instruments = Instruments::new(&telemetry);
///
/// let tracer = instruments.tracer("checkout.http");
/// tracer.in_span("GET /cart", |_cx| {
///     instruments.logger("checkout.http").info("cart served");
/// });
///
/// telemetry.shutdown().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct Instruments {
    providers: Option<Providers>,
}

#[derive(Debug, Clone)]
struct Providers {
    tracer: SdkTracerProvider,
    meter: SdkMeterProvider,
    logger: SdkLoggerProvider,
}

/// Instrument provider whose instruments discard every measurement.
struct NoopInstruments;

impl InstrumentProvider for NoopInstruments {}

impl Instruments {
    pub fn new(telemetry: &Telemetry) -> Self {
        Self {
            providers: Some(Providers {
                tracer: telemetry.tracer_provider().clone(),
                meter: telemetry.meter_provider().clone(),
                logger: telemetry.logger_provider().clone(),
            }),
        }
    }

    /// Instruments that record nothing, for code running without telemetry.
    pub fn noop() -> Self {
        Self::default()
    }

    pub fn tracer(&self, name: impl Into<Cow<'static, str>>) -> BoxedTracer {
        match &self.providers {
            Some(p) => BoxedTracer::new(Box::new(p.tracer.tracer(name))),
            None => BoxedTracer::new(Box::new(NoopTracer::new())),
        }
    }

    pub fn meter(&self, name: &'static str) -> Meter {
        match &self.providers {
            Some(p) => p.meter.meter(name),
            None => Meter::new(Arc::new(NoopInstruments)),
        }
    }

    pub fn logger(&self, name: impl Into<Cow<'static, str>>) -> Logger {
        match &self.providers {
            Some(p) => {
                let scope = InstrumentationScope::builder(name).build();
                Logger::new(p.logger.logger_with_scope(scope))
            }
            None => Logger::noop(),
        }
    }
}

impl From<&Telemetry> for Instruments {
    fn from(telemetry: &Telemetry) -> Self {
        Self::new(telemetry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exporter::InMemoryExporterFactory;
    use crate::resolver::RuntimeProbe;
    use opentelemetry::trace::{Span as _, Tracer as _};
    use std::collections::HashMap;

    async fn telemetry(factory: &InMemoryExporterFactory) -> Telemetry {
        Telemetry::builder("checkout")
            .with_exporters(factory.clone())
            .with_env(Arc::new(HashMap::<&'static str, &'static str>::new()))
            .with_probe(RuntimeProbe::new().with_root("/nonexistent").with_hostname("web-1"))
            .build()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_handles_backed_by_providers() {
        let factory = InMemoryExporterFactory::new();
        let telemetry = telemetry(&factory).await;
        let instruments = Instruments::new(&telemetry);

        let span = instruments.tracer("cart").start("load");
        assert!(span.is_recording());
        drop(span);
        instruments.meter("cart").u64_counter("cart.loads").build().add(1, &[]);
        instruments.logger("cart").info("loaded");

        telemetry.shutdown().await.unwrap();
        let spans = factory.spans.exported();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].instrumentation_scope.name(), "cart");
        let logs = factory.logs.exported();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].scope.name(), "cart");
        assert!(factory.metrics.exported()[0].metric("cart.loads").is_some());
    }

    #[tokio::test]
    async fn test_handles_degrade_after_shutdown() {
        let factory = InMemoryExporterFactory::new();
        let telemetry = telemetry(&factory).await;
        let instruments = Instruments::from(&telemetry);
        telemetry.shutdown().await.unwrap();
        let pushed = factory.metrics.export_calls();

        let mut span = instruments.tracer("cart").start("late");
        assert!(!span.is_recording());
        span.end();
        instruments.meter("cart").u64_counter("late").build().add(1, &[]);
        instruments.logger("cart").info("late");

        assert!(factory.spans.exported().is_empty());
        assert!(factory.logs.exported().is_empty());
        assert_eq!(factory.metrics.export_calls(), pushed);
    }

    #[test]
    fn test_noop_instruments() {
        let instruments = Instruments::noop();
        let span = instruments.tracer("x").start("span");
        assert!(!span.is_recording());
        assert!(!span.span_context().is_valid());
        instruments.logger("x").warn("dropped");
        instruments.meter("x").f64_histogram("latency").build().record(1.0, &[]);
    }
}
