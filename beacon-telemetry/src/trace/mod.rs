//! Trace pipeline: sampling, span limits and batched export

pub mod limits;
pub mod provider;
pub mod sampler;

pub use limits::{SpanLimits, TruncatingProcessor};
pub use opentelemetry::trace::{Span, SpanKind, Status, TraceContextExt, Tracer, TracerProvider};
pub use opentelemetry_sdk::trace::{SdkTracer, SdkTracerProvider, SpanData};
pub use provider::build_trace_provider;
pub use sampler::ParentRatioSampler;
