//! Trace sampling, metric readers and log batching through a bootstrapped handle

use beacon_telemetry::*;
use opentelemetry::trace::{Span as _, TraceState};
use std::collections::HashMap;
use std::sync::Arc;

async fn bootstrap(config: TelemetryConfig, factory: &InMemoryExporterFactory) -> Telemetry {
    TelemetryBuilder::with_config(config)
        .with_exporters(factory.clone())
        .with_env(Arc::new(HashMap::<&'static str, &'static str>::new()))
        .with_probe(
            RuntimeProbe::new()
                .with_root("/nonexistent-beacon-root")
                .with_hostname("web-1"),
        )
        .build()
        .await
        .unwrap()
}

fn remote_parent(sampled: bool) -> Context {
    let flags = if sampled {
        TraceFlags::SAMPLED
    } else {
        TraceFlags::default()
    };
    Context::new().with_remote_span_context(SpanContext::new(
        TraceId::from_bytes([0x4b; 16]),
        SpanId::from_bytes([0x1f; 8]),
        flags,
        true,
        TraceState::default(),
    ))
}

fn pushed(factory: &InMemoryExporterFactory, push: usize, name: &str) -> Option<PointValue> {
    factory.metrics.exported()[push]
        .metric(name)
        .and_then(|m| m.point(&[]).cloned())
}

#[tokio::test]
async fn test_sampled_parent_forces_sampled_children() {
    let factory = InMemoryExporterFactory::new();
    let telemetry = bootstrap(
        TelemetryConfig::new("checkout").with_sampling_ratio(0.0),
        &factory,
    )
    .await;
    let tracer = Instruments::new(&telemetry).tracer("http");

    let child = tracer.start_with_context("GET /cart", &remote_parent(true));
    assert!(child.span_context().is_sampled());
    let child_cx = Context::new().with_span(child);
    let mut grandchild = tracer.start_with_context("load cart", &child_cx);
    assert!(grandchild.span_context().is_sampled());
    grandchild.end();
    child_cx.span().end();

    let mut unsampled = tracer.start_with_context("GET /health", &remote_parent(false));
    assert!(!unsampled.is_recording());
    unsampled.end();
    let mut root = tracer.start("background job");
    assert!(!root.is_recording());
    root.end();

    telemetry.shutdown().await.unwrap();
    let spans = factory.spans.exported();
    assert_eq!(spans.len(), 2);
    assert!(spans.iter().all(|s| s.span_context.trace_id() == TraceId::from_bytes([0x4b; 16])));
    assert_eq!(spans[0].name, "load cart");
    assert_eq!(spans[0].parent_span_id, spans[1].span_context.span_id());
    assert_eq!(spans[1].parent_span_id, SpanId::from_bytes([0x1f; 8]));
}

#[tokio::test]
async fn test_propagated_request_continues_remote_trace() {
    let factory = InMemoryExporterFactory::new();
    let telemetry = bootstrap(
        TelemetryConfig::new("checkout").with_sampling_ratio(0.0),
        &factory,
    )
    .await;
    let mut headers = http::HeaderMap::new();
    headers.insert(
        "traceparent",
        http::HeaderValue::from_static("00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01"),
    );

    let parent = telemetry.propagator().extract(&headers);
    let tracer = Instruments::new(&telemetry).tracer("http");
    let span = tracer.start_with_context("GET /orders", &parent);
    let cx = parent.with_span(span);

    let mut outgoing = http::HeaderMap::new();
    telemetry.propagator().inject_context(&cx, &mut outgoing);
    cx.span().end();
    telemetry.shutdown().await.unwrap();

    let spans = factory.spans.exported();
    assert_eq!(spans.len(), 1);
    let sent = outgoing["traceparent"].to_str().unwrap();
    assert!(sent.starts_with("00-4bf92f3577b34da6a3ce929d0e0e4736-"), "{sent}");
    assert!(sent.contains(&spans[0].span_context.span_id().to_string()));
}

#[tokio::test]
async fn test_push_and_pull_readers_never_double_count() {
    let factory = InMemoryExporterFactory::new();
    let telemetry = bootstrap(TelemetryConfig::new("checkout"), &factory).await;
    let prometheus = telemetry.prometheus().unwrap().clone();
    let orders = Instruments::new(&telemetry)
        .meter("orders")
        .u64_counter("orders.placed")
        .build();

    orders.add(5, &[]);
    assert!(prometheus.render().contains("orders_placed_total 5\n"));
    telemetry.force_flush().await.unwrap();
    assert!(prometheus.render().contains("orders_placed_total 5\n"));

    orders.add(3, &[]);
    telemetry.force_flush().await.unwrap();
    let scrape = prometheus.scrape_response();
    assert_eq!(scrape.headers()[http::header::CONTENT_TYPE], PROMETHEUS_CONTENT_TYPE);
    assert!(scrape.body().contains("orders_placed_total 8\n"));

    assert_eq!(factory.metrics.exported().len(), 2);
    assert_eq!(pushed(&factory, 0, "orders.placed"), Some(PointValue::U64(5)));
    assert_eq!(pushed(&factory, 1, "orders.placed"), Some(PointValue::U64(8)));

    telemetry.shutdown().await.unwrap();
    assert_eq!(prometheus.scrape_response().status(), http::StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_prometheus_naming_options() {
    let factory = InMemoryExporterFactory::new();
    let mut config = TelemetryConfig::new("checkout");
    config.metrics.prometheus = PrometheusConfig {
        with_units: true,
        with_scope_labels: true,
    };
    let telemetry = bootstrap(config, &factory).await;
    Instruments::new(&telemetry)
        .meter("http")
        .f64_histogram("http.server.request.duration")
        .with_unit("s")
        .build()
        .record(0.2, &[]);

    let scrape = telemetry.prometheus().unwrap().render();
    assert!(
        scrape.contains("http_server_request_duration_seconds_count{otel_scope_name=\"http\"} 1\n"),
        "{scrape}"
    );
    telemetry.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_prometheus_disabled() {
    let factory = InMemoryExporterFactory::new();
    let telemetry = bootstrap(TelemetryConfig::new("checkout").with_prometheus(false), &factory).await;
    assert!(telemetry.prometheus().is_none());
    telemetry.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_default_latency_view_applies() {
    let factory = InMemoryExporterFactory::new();
    let telemetry = bootstrap(TelemetryConfig::new("checkout"), &factory).await;
    Instruments::new(&telemetry)
        .meter("http")
        .f64_histogram("http.server.request.duration")
        .with_unit("s")
        .build()
        .record(0.2, &[]);

    telemetry.force_flush().await.unwrap();
    match pushed(&factory, 0, "http.server.request.duration") {
        Some(PointValue::Histogram { bounds, count, .. }) => {
            assert_eq!(bounds, HTTP_LATENCY_BUCKETS.to_vec());
            assert_eq!(count, 1);
        }
        other => panic!("unexpected point {other:?}"),
    }
    telemetry.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_log_batches_keep_emission_order() {
    let factory = InMemoryExporterFactory::new();
    let mut config = TelemetryConfig::new("checkout");
    config.logs.batch = BatchConfig {
        max_queue_size: 64,
        max_export_batch_size: 2,
        ..BatchConfig::logs()
    };
    let telemetry = bootstrap(config, &factory).await;
    let logger = Instruments::new(&telemetry).logger("jobs");

    for i in 0..5 {
        logger.info(format!("job {i}"));
    }
    telemetry.force_flush().await.unwrap();
    let bodies: Vec<String> = factory
        .logs
        .exported()
        .iter()
        .filter_map(|r| r.body())
        .collect();
    assert_eq!(bodies, vec!["job 0", "job 1", "job 2", "job 3", "job 4"]);

    logger.info("job 5");
    telemetry.shutdown().await.unwrap();
    assert_eq!(factory.logs.exported().len(), 6);
}

#[tokio::test]
async fn test_logs_outside_spans_are_uncorrelated() {
    let factory = InMemoryExporterFactory::new();
    let telemetry = bootstrap(TelemetryConfig::new("checkout"), &factory).await;
    let instruments = Instruments::new(&telemetry);

    instruments.logger("jobs").warn("no span");
    instruments.tracer("jobs").in_span("run", |_| {
        instruments.logger("jobs").error("inside span");
    });
    telemetry.shutdown().await.unwrap();

    let logs = factory.logs.exported();
    assert_eq!(logs[0].span_id(), None);
    assert_eq!(logs[0].severity(), Some(Severity::Warn));
    assert_eq!(logs[1].severity(), Some(Severity::Error));
    assert_eq!(logs[1].span_id(), Some(factory.spans.exported()[0].span_context.span_id()));
}
