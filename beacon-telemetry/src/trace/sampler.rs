//! Head sampling

use opentelemetry::trace::{
    Link, SamplingDecision, SamplingResult, SpanKind, TraceContextExt, TraceId, TraceState,
};
use opentelemetry::{Context, KeyValue};
use opentelemetry_sdk::trace::{Sampler, ShouldSample};

/// Parent-aware ratio sampling.
///
/// A sampled parent always yields a sampled child and an unsampled remote
/// parent never does. Roots, invalid parents and unsampled local parents are
/// decided by the trace-id ratio, so the same trace id always gets the same
/// answer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParentRatioSampler {
    ratio: f64,
}

impl ParentRatioSampler {
    /// `ratio` is clamped to `[0.0, 1.0]`; NaN samples nothing.
    pub fn new(ratio: f64) -> Self {
        let ratio = if ratio.is_nan() { 0.0 } else { ratio.clamp(0.0, 1.0) };
        Self { ratio }
    }

    pub fn ratio(&self) -> f64 {
        self.ratio
    }
}

impl ShouldSample for ParentRatioSampler {
    fn should_sample(
        &self,
        parent_context: Option<&Context>,
        trace_id: TraceId,
        name: &str,
        span_kind: &SpanKind,
        attributes: &[KeyValue],
        links: &[Link],
    ) -> SamplingResult {
        let parent = parent_context
            .filter(|cx| cx.has_active_span())
            .map(|cx| cx.span().span_context().clone())
            .filter(|sc| sc.is_valid());

        let decision = match &parent {
            Some(sc) if sc.is_sampled() => Some(SamplingDecision::RecordAndSample),
            Some(sc) if sc.is_remote() => Some(SamplingDecision::Drop),
            _ => None,
        };

        match decision {
            Some(decision) => SamplingResult {
                decision,
                attributes: Vec::new(),
                trace_state: parent
                    .map(|sc| sc.trace_state().clone())
                    .unwrap_or_else(TraceState::default),
            },
            None => Sampler::TraceIdRatioBased(self.ratio).should_sample(
                parent_context,
                trace_id,
                name,
                span_kind,
                attributes,
                links,
            ),
        }
    }
}
