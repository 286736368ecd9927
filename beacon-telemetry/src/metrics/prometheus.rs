//! Prometheus text exposition over the scrape reader
//!
//! Nothing runs in the background: each scrape collects the current
//! cumulative state and renders it. Resource attributes are exposed once,
//! as labels of the `target_info` gauge.

use super::reader::ScrapeReader;
use super::snapshot::{MetricPoint, MetricShape, MetricsSnapshot, PointValue};
use crate::config::PrometheusConfig;
use http::{HeaderValue, Response, StatusCode, header};
use opentelemetry::KeyValue;
use std::fmt::Write as _;

/// Content type of the exposition format.
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4";

/// Renders the state held by a [`ScrapeReader`] registered with the meter
/// provider.
#[derive(Debug, Clone)]
pub struct PrometheusExporter {
    reader: ScrapeReader,
    options: PrometheusConfig,
}

impl PrometheusExporter {
    pub fn new(reader: ScrapeReader, options: PrometheusConfig) -> Self {
        Self { reader, options }
    }

    pub fn options(&self) -> PrometheusConfig {
        self.options
    }

    /// Current metric state in exposition format. Empty once the provider
    /// has shut down.
    pub fn render(&self) -> String {
        self.reader
            .snapshot()
            .map(|snapshot| encode(&snapshot, &self.options))
            .unwrap_or_default()
    }

    /// Response for a `/metrics` scrape: 200 with the rendered text, or 503
    /// when nothing can be collected.
    pub fn scrape_response(&self) -> Response<String> {
        let (status, body) = match self.reader.snapshot() {
            Ok(snapshot) => (StatusCode::OK, encode(&snapshot, &self.options)),
            Err(error) => {
                tracing::debug!(%error, "prometheus scrape rejected");
                (StatusCode::SERVICE_UNAVAILABLE, String::new())
            }
        };

        let mut response = Response::new(body);
        *response.status_mut() = status;
        response
            .headers_mut()
            .insert(header::CONTENT_TYPE, HeaderValue::from_static(CONTENT_TYPE));
        response
    }
}

struct Family {
    name: String,
    kind: &'static str,
    help: String,
    samples: String,
}

/// Render a snapshot in the Prometheus text format.
pub fn encode(snapshot: &MetricsSnapshot, options: &PrometheusConfig) -> String {
    let mut families: Vec<Family> = Vec::new();

    for metric in &snapshot.metrics {
        let base = metric_name(&metric.name, &metric.unit, options.with_units);
        let (name, kind) = match metric.shape {
            MetricShape::Sum { monotonic: true } => {
                let name = if base.ends_with("_total") {
                    base
                } else {
                    format!("{base}_total")
                };
                (name, "counter")
            }
            MetricShape::Sum { .. } | MetricShape::Gauge => (base, "gauge"),
            MetricShape::Histogram => (base, "histogram"),
        };

        let index = match families.iter().position(|f| f.name == name) {
            Some(index) if families[index].kind != kind => {
                tracing::warn!(
                    metric = %name,
                    "prometheus name collision across instrument kinds, skipping"
                );
                continue;
            }
            Some(index) => index,
            None => {
                families.push(Family {
                    name: name.clone(),
                    kind,
                    help: metric.description.clone(),
                    samples: String::new(),
                });
                families.len() - 1
            }
        };

        let scope = options.with_scope_labels.then_some(metric.scope.as_str());
        let family = &mut families[index];
        for point in &metric.points {
            write_point(&mut family.samples, &name, scope, point);
        }
    }

    let mut out = String::new();
    write_target_info(&mut out, snapshot);
    for family in families {
        if !family.help.is_empty() {
            let _ = writeln!(out, "# HELP {} {}", family.name, escape_help(&family.help));
        }
        let _ = writeln!(out, "# TYPE {} {}", family.name, family.kind);
        out.push_str(&family.samples);
    }
    out
}

fn write_target_info(out: &mut String, snapshot: &MetricsSnapshot) {
    if snapshot.resource.is_empty() {
        return;
    }
    let mut labels: Vec<String> = snapshot
        .resource
        .iter()
        .map(|(key, value)| {
            format!(
                "{}=\"{}\"",
                label_name(key.as_str()),
                escape_label(&value.to_string())
            )
        })
        .collect();
    labels.sort();
    out.push_str("# HELP target_info Target metadata\n");
    out.push_str("# TYPE target_info gauge\n");
    let _ = writeln!(out, "target_info{{{}}} 1", labels.join(","));
}

fn write_point(out: &mut String, name: &str, scope: Option<&str>, point: &MetricPoint) {
    let attributes = &point.attributes;
    match &point.value {
        PointValue::U64(v) => {
            let _ = writeln!(out, "{name}{} {v}", labels(scope, attributes, None));
        }
        PointValue::I64(v) => {
            let _ = writeln!(out, "{name}{} {v}", labels(scope, attributes, None));
        }
        PointValue::F64(v) => {
            let _ = writeln!(
                out,
                "{name}{} {}",
                labels(scope, attributes, None),
                format_value(*v)
            );
        }
        PointValue::Histogram {
            count,
            sum,
            bounds,
            bucket_counts,
        } => {
            let mut cumulative = 0u64;
            for (bound, bucket) in bounds.iter().zip(bucket_counts) {
                cumulative += bucket;
                let le = format_value(*bound);
                let _ = writeln!(
                    out,
                    "{name}_bucket{} {cumulative}",
                    labels(scope, attributes, Some(&le))
                );
            }
            let _ = writeln!(
                out,
                "{name}_bucket{} {count}",
                labels(scope, attributes, Some("+Inf"))
            );
            let plain = labels(scope, attributes, None);
            let _ = writeln!(out, "{name}_sum{plain} {}", format_value(*sum));
            let _ = writeln!(out, "{name}_count{plain} {count}");
        }
    }
}

fn labels(scope: Option<&str>, attributes: &[KeyValue], le: Option<&str>) -> String {
    let mut pairs = Vec::with_capacity(attributes.len() + 2);
    if let Some(scope) = scope {
        pairs.push(format!("otel_scope_name=\"{}\"", escape_label(scope)));
    }
    for kv in attributes {
        pairs.push(format!(
            "{}=\"{}\"",
            label_name(kv.key.as_str()),
            escape_label(&kv.value.to_string())
        ));
    }
    if let Some(le) = le {
        pairs.push(format!("le=\"{le}\""));
    }
    if pairs.is_empty() {
        return String::new();
    }
    format!("{{{}}}", pairs.join(","))
}

/// Sanitized metric name, with the unit appended as a suffix when asked.
fn metric_name(name: &str, unit: &str, with_units: bool) -> String {
    let mut base = sanitize(name, true);
    if !with_units {
        return base;
    }
    if let Some(suffix) = unit_suffix(unit) {
        if !base.ends_with(&format!("_{suffix}")) {
            base.push('_');
            base.push_str(&suffix);
        }
    }
    base
}

fn unit_suffix(unit: &str) -> Option<String> {
    // Curly-brace annotations like `{request}` carry no unit.
    let unit = match unit.find('{') {
        Some(start) => unit[..start].trim(),
        None => unit.trim(),
    };
    if unit.is_empty() || unit == "1" {
        return None;
    }

    let word = |u: &str| -> String {
        match u {
            "d" => "days",
            "h" => "hours",
            "min" => "minutes",
            "s" => "seconds",
            "ms" => "milliseconds",
            "us" => "microseconds",
            "ns" => "nanoseconds",
            "By" => "bytes",
            "KiBy" => "kibibytes",
            "MiBy" => "mebibytes",
            "GiBy" => "gibibytes",
            "KBy" => "kilobytes",
            "MBy" => "megabytes",
            "GBy" => "gigabytes",
            "%" => "percent",
            "Hz" => "hertz",
            other => return sanitize(other, false),
        }
        .to_string()
    };

    let suffix = match unit.split_once('/') {
        Some((num, per)) if !num.is_empty() && !per.is_empty() => {
            let per = match per {
                "s" => "second".to_string(),
                "m" => "minute".to_string(),
                "h" => "hour".to_string(),
                "d" => "day".to_string(),
                other => word(other),
            };
            format!("{}_per_{per}", word(num))
        }
        _ => word(unit),
    };
    let suffix = suffix.trim_matches('_').to_string();
    (!suffix.is_empty()).then_some(suffix)
}

fn label_name(key: &str) -> String {
    sanitize(key, false)
}

/// Replace characters outside `[a-zA-Z0-9_]` (plus `:` for metric names)
/// with `_`, collapse repeats and guard against a leading digit.
fn sanitize(raw: &str, allow_colon: bool) -> String {
    let mut out = String::with_capacity(raw.len() + 1);
    for c in raw.chars() {
        let keep = c.is_ascii_alphanumeric() || c == '_' || (allow_colon && c == ':');
        let c = if keep { c } else { '_' };
        if c == '_' && out.ends_with('_') {
            continue;
        }
        out.push(c);
    }
    if out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out
}

fn escape_label(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            c => out.push(c),
        }
    }
    out
}

fn escape_help(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\n', "\\n")
}

fn format_value(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value.is_infinite() {
        let inf = if value.is_sign_positive() { "+Inf" } else { "-Inf" };
        inf.to_string()
    } else {
        value.to_string()
    }
}
