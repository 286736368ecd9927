//! Owned copies of collected metric state
//!
//! SDK collections borrow from the pipeline and cannot outlive the export
//! call. A [`MetricsSnapshot`] keeps what the scrape renderer and the
//! in-memory exporter need, with integer instruments kept as integers.

use opentelemetry::KeyValue;
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::metrics::data::{AggregatedMetrics, MetricData, ResourceMetrics};

/// Value of a single data point.
#[derive(Debug, Clone, PartialEq)]
pub enum PointValue {
    U64(u64),
    I64(i64),
    F64(f64),
    Histogram {
        count: u64,
        sum: f64,
        bounds: Vec<f64>,
        bucket_counts: Vec<u64>,
    },
}

impl PointValue {
    /// Scalar value widened to `f64`, `None` for histograms.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PointValue::U64(v) => Some(*v as f64),
            PointValue::I64(v) => Some(*v as f64),
            PointValue::F64(v) => Some(*v),
            PointValue::Histogram { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetricPoint {
    pub attributes: Vec<KeyValue>,
    pub value: PointValue,
}

/// How a metric aggregates, as far as exposition cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricShape {
    Sum { monotonic: bool },
    Gauge,
    Histogram,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExportedMetric {
    pub scope: String,
    pub name: String,
    pub description: String,
    pub unit: String,
    pub shape: MetricShape,
    pub points: Vec<MetricPoint>,
}

impl ExportedMetric {
    /// Value of the point whose attributes are exactly `attributes`.
    pub fn point(&self, attributes: &[KeyValue]) -> Option<&PointValue> {
        self.points
            .iter()
            .find(|p| {
                p.attributes.len() == attributes.len()
                    && attributes.iter().all(|kv| p.attributes.contains(kv))
            })
            .map(|p| &p.value)
    }
}

/// One collection: the resource plus every metric in scope order.
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub resource: Resource,
    pub metrics: Vec<ExportedMetric>,
}

impl MetricsSnapshot {
    pub fn from_sdk(collected: &ResourceMetrics) -> Self {
        let mut metrics = Vec::new();
        for scope in collected.scope_metrics() {
            let scope_name = scope.scope().name().to_string();
            for metric in scope.metrics() {
                let (shape, points) = match metric.data() {
                    AggregatedMetrics::U64(data) => convert(data, PointValue::U64, |v| v as f64),
                    AggregatedMetrics::I64(data) => convert(data, PointValue::I64, |v| v as f64),
                    AggregatedMetrics::F64(data) => convert(data, PointValue::F64, |v| v),
                };
                metrics.push(ExportedMetric {
                    scope: scope_name.clone(),
                    name: metric.name().to_string(),
                    description: metric.description().to_string(),
                    unit: metric.unit().to_string(),
                    shape,
                    points,
                });
            }
        }
        Self {
            resource: collected.resource().clone(),
            metrics,
        }
    }

    /// First metric named `name`, across all scopes.
    pub fn metric(&self, name: &str) -> Option<&ExportedMetric> {
        self.metrics.iter().find(|m| m.name == name)
    }
}

fn convert<T: Copy>(
    data: &MetricData<T>,
    scalar: fn(T) -> PointValue,
    widen: fn(T) -> f64,
) -> (MetricShape, Vec<MetricPoint>) {
    match data {
        MetricData::Sum(sum) => (
            MetricShape::Sum {
                monotonic: sum.is_monotonic(),
            },
            sum.data_points()
                .map(|p| MetricPoint {
                    attributes: p.attributes().cloned().collect(),
                    value: scalar(p.value()),
                })
                .collect(),
        ),
        MetricData::Gauge(gauge) => (
            MetricShape::Gauge,
            gauge
                .data_points()
                .map(|p| MetricPoint {
                    attributes: p.attributes().cloned().collect(),
                    value: scalar(p.value()),
                })
                .collect(),
        ),
        MetricData::Histogram(histogram) => (
            MetricShape::Histogram,
            histogram
                .data_points()
                .map(|p| MetricPoint {
                    attributes: p.attributes().cloned().collect(),
                    value: PointValue::Histogram {
                        count: p.count(),
                        sum: widen(p.sum()),
                        bounds: p.bounds().collect(),
                        bucket_counts: p.bucket_counts().collect(),
                    },
                })
                .collect(),
        ),
        // Exponential buckets are never configured; keep count and sum only.
        MetricData::ExponentialHistogram(histogram) => (
            MetricShape::Histogram,
            histogram
                .data_points()
                .map(|p| MetricPoint {
                    attributes: p.attributes().cloned().collect(),
                    value: PointValue::Histogram {
                        count: p.count() as u64,
                        sum: widen(p.sum()),
                        bounds: Vec::new(),
                        bucket_counts: Vec::new(),
                    },
                })
                .collect(),
        ),
    }
}
