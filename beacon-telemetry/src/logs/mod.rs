//! Log pipeline: loggers, batched export and the `tracing` bridge

pub mod logger;
pub mod provider;

pub use logger::Logger;
pub use opentelemetry::logs::Severity;
pub use opentelemetry_sdk::logs::{SdkLogger, SdkLoggerProvider};
pub use provider::build_log_provider;
