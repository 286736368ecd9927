//! Declarative histogram bucket overrides

use opentelemetry_sdk::metrics::{
    Aggregation, Instrument, InstrumentKind as SdkInstrumentKind, Stream,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Shape of an instrument, as named in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstrumentKind {
    Counter,
    UpDownCounter,
    Histogram,
    Gauge,
}

impl InstrumentKind {
    /// Whether an SDK instrument kind falls under this kind. Observable
    /// instruments match their synchronous counterpart.
    pub fn matches(&self, kind: SdkInstrumentKind) -> bool {
        matches!(
            (self, kind),
            (InstrumentKind::Counter, SdkInstrumentKind::Counter)
                | (InstrumentKind::Counter, SdkInstrumentKind::ObservableCounter)
                | (InstrumentKind::UpDownCounter, SdkInstrumentKind::UpDownCounter)
                | (InstrumentKind::UpDownCounter, SdkInstrumentKind::ObservableUpDownCounter)
                | (InstrumentKind::Histogram, SdkInstrumentKind::Histogram)
                | (InstrumentKind::Gauge, SdkInstrumentKind::Gauge)
                | (InstrumentKind::Gauge, SdkInstrumentKind::ObservableGauge)
        )
    }
}

impl fmt::Display for InstrumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InstrumentKind::Counter => "counter",
            InstrumentKind::UpDownCounter => "up_down_counter",
            InstrumentKind::Histogram => "histogram",
            InstrumentKind::Gauge => "gauge",
        };
        f.write_str(name)
    }
}

/// Explicit bucket boundaries for histograms matching a name and,
/// optionally, a kind.
#[derive(Debug, Clone, PartialEq)]
pub struct View {
    pub instrument_name: String,
    pub instrument_kind: Option<InstrumentKind>,
    pub boundaries: Vec<f64>,
}

impl View {
    pub fn histogram_buckets(
        instrument_name: impl Into<String>,
        instrument_kind: Option<InstrumentKind>,
        boundaries: Vec<f64>,
    ) -> Self {
        Self {
            instrument_name: instrument_name.into(),
            instrument_kind,
            boundaries,
        }
    }

    /// Whether this view applies. Bucket overrides only ever apply to
    /// histograms, whatever kind filter was configured.
    pub fn matches(&self, name: &str, kind: SdkInstrumentKind) -> bool {
        self.instrument_name == name
            && kind == SdkInstrumentKind::Histogram
            && self.instrument_kind.is_none_or(|k| k.matches(kind))
    }

    fn stream(&self) -> Option<Stream> {
        Stream::builder()
            .with_aggregation(Aggregation::ExplicitBucketHistogram {
                boundaries: self.boundaries.clone(),
                record_min_max: true,
            })
            .build()
            .ok()
    }
}

/// Stream override for `instrument`: the last matching view wins, `None`
/// leaves the default aggregation in place.
pub(crate) fn select_stream(views: &[View], instrument: &Instrument) -> Option<Stream> {
    views
        .iter()
        .rev()
        .find(|view| view.matches(instrument.name(), instrument.kind()))
        .and_then(View::stream)
}
