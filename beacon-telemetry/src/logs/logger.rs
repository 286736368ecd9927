//! Convenience emitter over the SDK logger

use crate::attribute::Attribute;
use opentelemetry::logs::{AnyValue, LogRecord as _, Logger as _, Severity};
use opentelemetry_sdk::logs::SdkLogger;

/// Named log record emitter. Records are correlated with the active span
/// when one exists. A noop logger drops everything.
#[derive(Debug, Clone, Default)]
pub struct Logger {
    inner: Option<SdkLogger>,
}

impl Logger {
    pub fn new(inner: SdkLogger) -> Self {
        Self { inner: Some(inner) }
    }

    pub fn noop() -> Self {
        Self::default()
    }

    pub fn emit(&self, severity: Severity, body: impl Into<String>, attributes: Vec<Attribute>) {
        let Some(logger) = &self.inner else {
            return;
        };
        let mut record = logger.create_log_record();
        record.set_severity_number(severity);
        record.set_severity_text(severity.name());
        record.set_body(AnyValue::from(body.into()));
        record.add_attributes(
            attributes
                .into_iter()
                .map(|attr| (attr.key, AnyValue::from(attr.value))),
        );
        logger.emit(record);
    }

    pub fn debug(&self, body: impl Into<String>) {
        self.emit(Severity::Debug, body, Vec::new());
    }

    pub fn info(&self, body: impl Into<String>) {
        self.emit(Severity::Info, body, Vec::new());
    }

    pub fn warn(&self, body: impl Into<String>) {
        self.emit(Severity::Warn, body, Vec::new());
    }

    pub fn error(&self, body: impl Into<String>) {
        self.emit(Severity::Error, body, Vec::new());
    }
}
