//! Resource resolution through the public bootstrap path

use beacon_telemetry::*;
use std::collections::HashMap;
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

fn env(pairs: &[(&'static str, &'static str)]) -> Arc<dyn EnvSource> {
    Arc::new(pairs.iter().copied().collect::<HashMap<_, _>>())
}

fn probe() -> RuntimeProbe {
    RuntimeProbe::new()
        .with_root("/nonexistent-beacon-root")
        .with_hostname("web-1")
}

fn resolve(config: TelemetryConfig, pairs: &[(&'static str, &'static str)]) -> Resource {
    ResourceResolver::new(env(pairs))
        .with_probe(probe())
        .resolve(&config.normalized())
        .unwrap()
}

#[test]
fn test_service_name_from_environment() {
    let resource = resolve(TelemetryConfig::default(), &[("SERVICE_NAME", "billing")]);
    assert_eq!(resource.service_name(), "billing");
}

#[test]
fn test_configured_service_name_wins() {
    let resource = resolve(
        TelemetryConfig::new("checkout"),
        &[("SERVICE_NAME", "billing"), ("OTEL_SERVICE_NAME", "ledger")],
    );
    assert_eq!(resource.service_name(), "checkout");
}

#[test]
fn test_blank_configured_service_name_falls_through() {
    let resource = resolve(TelemetryConfig::new("   "), &[("OTEL_SERVICE_NAME", "ledger")]);
    assert_eq!(resource.service_name(), "ledger");
}

#[test]
fn test_unknown_service_fallback() {
    let resource = resolve(TelemetryConfig::default(), &[("SERVICE_NAME", "")]);
    assert!(resource.service_name().starts_with("unknown_service"));
}

#[test]
fn test_precedence_tiers() {
    let config = TelemetryConfig::new("checkout").with_environment("staging");
    let resource = resolve(
        config,
        &[
            ("ENVIRONMENT", "production"),
            ("SERVICE_VERSION", "2.0.0"),
            ("K8S_POD_UID", "7f3c"),
        ],
    );

    // config
    assert_eq!(resource.get_str("deployment.environment.name"), Some("staging"));
    // env over default
    assert_eq!(resource.get_str("service.version"), Some("2.0.0"));
    // env over detected hostname
    assert_eq!(resource.get_str("service.instance.id"), Some("7f3c"));
    // detected
    assert_eq!(resource.get_str("host.name"), Some("web-1"));
    // default
    assert_eq!(resource.get_str("telemetry.sdk.language"), Some("rust"));
}

#[test]
fn test_detected_values_beat_defaults() {
    let resource = resolve(TelemetryConfig::new("checkout"), &[]);
    assert_eq!(resource.get_str("service.instance.id"), Some("web-1"));
    assert_eq!(resource.get_str("service.version"), Some("dev"));
    assert_eq!(
        resource.get_str("deployment.environment.name"),
        Some("development")
    );
}

#[test]
fn test_resolved_resource_has_no_empty_values() {
    let resource = resolve(
        TelemetryConfig::new("checkout").with_version(""),
        &[
            ("SERVICE_NAMESPACE", ""),
            ("GIT_COMMIT", "  "),
            ("K8S_NODE_NAME", ""),
            ("CONTAINER_IMAGE", "registry:5000/team/api"),
            ("OTEL_RESOURCE_ATTRIBUTES", "team.slack=,region=eu"),
        ],
    );

    for (key, value) in resource.iter() {
        assert!(!value.is_empty(), "{key} resolved to an empty value");
    }
    assert_eq!(resource.get("service.namespace"), None);
    assert_eq!(resource.get("service.build.commit"), None);
    assert_eq!(resource.get("container.image.tag"), None);
    assert_eq!(resource.get_str("container.image.name"), Some("registry:5000/team/api"));
    assert_eq!(resource.get_str("region"), Some("eu"));
    assert_eq!(resource.get_str("service.version"), Some("dev"));
}

#[test]
fn test_kubernetes_detection_from_mounted_files() {
    let root = TempDir::new().unwrap();
    let secrets = root.path().join("var/run/secrets/kubernetes.io/serviceaccount");
    fs::create_dir_all(&secrets).unwrap();
    fs::write(secrets.join("namespace"), "payments\n").unwrap();

    let id = "a".repeat(64);
    fs::create_dir_all(root.path().join("proc/self")).unwrap();
    fs::write(
        root.path().join("proc/self/cgroup"),
        format!("0::/kubepods/burstable/pod1/cri-containerd-{id}.scope\n"),
    )
    .unwrap();

    let resource = ResourceResolver::new(env(&[
        ("KUBERNETES_SERVICE_HOST", "10.0.0.1"),
        ("HOSTNAME", "checkout-7d9f-x2k4"),
    ]))
    .with_probe(RuntimeProbe::new().with_root(root.path()).with_hostname("node-3"))
    .resolve(&TelemetryConfig::new("checkout"))
    .unwrap();

    assert_eq!(resource.get_str("k8s.namespace.name"), Some("payments"));
    assert_eq!(resource.get_str("k8s.pod.name"), Some("checkout-7d9f-x2k4"));
    assert_eq!(resource.get_str("container.id"), Some(id.as_str()));
    assert_eq!(resource.get_str("container.name"), Some("checkout-7d9f-x2k4"));
    assert_eq!(resource.get_str("service.instance.id"), Some(&id[..12]));
}

#[tokio::test]
async fn test_hostname_failure_aborts_bootstrap() {
    let factory = InMemoryExporterFactory::new();
    let err = Telemetry::builder("checkout")
        .with_exporters(factory.clone())
        .with_env(env(&[]))
        .with_probe(RuntimeProbe::new().with_hostname_error("permission denied"))
        .build()
        .await
        .unwrap_err();

    assert!(matches!(err, TelemetryError::ResourceResolution(_)));
    assert_eq!(factory.spans.shutdown_calls(), 0);
}

#[tokio::test]
async fn test_every_signal_shares_the_resource() {
    let factory = InMemoryExporterFactory::new();
    let telemetry = Telemetry::builder("checkout")
        .with_version("1.4.2")
        .with_exporters(factory.clone())
        .with_env(env(&[("SERVICE_NAME", "ignored")]))
        .with_probe(probe())
        .build()
        .await
        .unwrap();
    let instruments = Instruments::new(&telemetry);

    instruments.tracer("cart").start("load").end();
    instruments.logger("cart").info("loaded");
    instruments
        .meter("cart")
        .f64_histogram("cart.load.duration")
        .with_unit("s")
        .build()
        .record(0.02, &[]);
    telemetry.shutdown().await.unwrap();

    let expected = telemetry.resource();
    assert_eq!(expected.service_name(), "checkout");
    assert_eq!(expected.get_str("service.version"), Some("1.4.2"));
    assert_eq!(factory.spans.exported().len(), 1);
    assert_eq!(factory.logs.exported().len(), 1);
    let sdk = expected.to_sdk_resource();
    for seen in [
        factory.spans.resource(),
        factory.logs.resource(),
        factory.metrics.resource(),
    ] {
        let seen = seen.unwrap();
        assert_eq!(seen.len(), sdk.len());
        for (key, value) in sdk.iter() {
            assert_eq!(seen.get(key).as_ref(), Some(value), "{key:?}");
        }
    }
}
