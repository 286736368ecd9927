//! Integration tests for common Beacon workflows.
//!
//! These tests drive the facade the way a service would: bootstrap,
//! instrument, scrape and shut down.

use beacon::prelude::*;
use beacon::{InMemoryExporterFactory, RuntimeProbe};
use opentelemetry::trace::Span as _;
use std::collections::HashMap;
use std::sync::Arc;

async fn telemetry(factory: &InMemoryExporterFactory) -> Telemetry {
    Telemetry::builder("storefront")
        .with_version("3.1.0")
        .with_environment("staging")
        .with_exporters(factory.clone())
        .with_env(Arc::new(HashMap::<&'static str, &'static str>::new()))
        .with_probe(
            RuntimeProbe::new()
                .with_root("/nonexistent-beacon-root")
                .with_hostname("storefront-1"),
        )
        .build()
        .await
        .unwrap()
}

// =============================================================================
// Request handling
// =============================================================================

#[tokio::test]
async fn test_request_produces_span_metric_and_log() {
    let factory = InMemoryExporterFactory::new();
    let telemetry = telemetry(&factory).await;
    let instruments = Instruments::new(&telemetry);

    let requests = instruments
        .meter("storefront.http")
        .u64_counter("http.server.requests")
        .with_description("Requests served")
        .build();
    let latency = instruments
        .meter("storefront.http")
        .f64_histogram("http.server.request.duration")
        .with_unit("s")
        .build();

    instruments.tracer("storefront.http").in_span("GET /products", |cx| {
        let route = [KeyValue::new("http.route", "/products")];
        requests.add(1, &route);
        latency.record(0.042, &route);
        cx.span().set_status(Status::Ok);
        instruments.logger("storefront.http").info("listed products");
    });

    let scrape = telemetry.prometheus().unwrap().render();
    assert!(scrape.contains("target_info{"));
    assert!(scrape.contains("service_name=\"storefront\""));
    assert!(scrape.contains("http_server_requests_total{"));
    assert!(scrape.contains("http_server_request_duration_count{"));
    assert!(!scrape.contains("otel_scope_name"));

    telemetry.shutdown().await.unwrap();

    let spans = factory.spans.exported();
    let logs = factory.logs.exported();
    assert_eq!(spans.len(), 1);
    assert_eq!(spans[0].status, Status::Ok);
    assert_eq!(logs[0].span_id(), Some(spans[0].span_context.span_id()));
    assert!(!factory.metrics.exported().is_empty());
}

// =============================================================================
// Lifecycle
// =============================================================================

#[tokio::test]
async fn test_instruments_outlive_shutdown() {
    let factory = InMemoryExporterFactory::new();
    let telemetry = telemetry(&factory).await;
    let instruments = Instruments::new(&telemetry);
    let counter = instruments.meter("jobs").u64_counter("jobs.run").build();

    assert_eq!(telemetry.state(), LifecycleState::Running);
    telemetry.shutdown().await.unwrap();
    assert_eq!(telemetry.state(), LifecycleState::Closed);

    counter.add(1, &[]);
    instruments.logger("jobs").error("after shutdown");
    assert!(!instruments.tracer("jobs").start("after shutdown").is_recording());
    assert!(telemetry.shutdown().await.is_ok());
    assert!(factory.logs.exported().is_empty());
}

#[test]
fn test_noop_instruments_without_runtime() {
    let instruments = Instruments::noop();
    instruments.meter("cli").u64_counter("cli.invocations").build().add(1, &[]);
    instruments.tracer("cli").in_span("parse args", |cx| {
        assert!(!cx.span().is_recording());
    });
    instruments.logger("cli").info("no pipeline");
}

#[test]
fn test_config_from_toml_file() {
    let dir = std::env::temp_dir().join(format!("beacon-config-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("telemetry.toml");
    std::fs::write(
        &path,
        r#"
        service_name = "storefront"
        environment = "production"
        sampling_ratio = 0.1

        [endpoints]
        traces = "https://otel.internal:4318/v1/traces"
        "#,
    )
    .unwrap();

    let config = TelemetryConfig::from_file(&path).unwrap();
    assert_eq!(config.service_name.as_deref(), Some("storefront"));
    assert_eq!(config.environment.as_deref(), Some("production"));
    assert_eq!(config.sampling_ratio, 0.1);
    assert_eq!(config.endpoints.traces, "https://otel.internal:4318/v1/traces");

    std::fs::remove_dir_all(&dir).unwrap();
}
