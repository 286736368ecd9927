//! Error types for the telemetry pipelines

use opentelemetry_sdk::error::OTelSdkError;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for telemetry operations
pub type TelemetryResult<T> = Result<T, TelemetryError>;

/// One of the three telemetry signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signal {
    Traces,
    Metrics,
    Logs,
}

impl Signal {
    pub fn as_str(&self) -> &'static str {
        match self {
            Signal::Traces => "trace",
            Signal::Metrics => "metric",
            Signal::Logs => "log",
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors produced by an exporter or by the pipeline driving it.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ExportError {
    /// The export call did not complete within the export timeout
    #[error("export timed out after {0:?}")]
    Timeout(Duration),

    /// The exporter reported a failure
    #[error("export failed: {0}")]
    Failed(String),

    /// The pipeline has already been shut down
    #[error("pipeline is shut down")]
    Shutdown,

    /// The endpoint could not be parsed
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// A plaintext endpoint was configured while insecure transport is disabled
    #[error("plaintext endpoint {0} requires insecure transport to be enabled")]
    InsecureEndpoint(String),
}

impl ExportError {
    pub fn failed(message: impl Into<String>) -> Self {
        ExportError::Failed(message.into())
    }
}

impl From<OTelSdkError> for ExportError {
    fn from(err: OTelSdkError) -> Self {
        match err {
            OTelSdkError::AlreadyShutdown => ExportError::Shutdown,
            OTelSdkError::Timeout(after) => ExportError::Timeout(after),
            OTelSdkError::InternalFailure(message) => ExportError::Failed(message),
        }
    }
}

impl From<ExportError> for OTelSdkError {
    fn from(err: ExportError) -> Self {
        match err {
            ExportError::Shutdown => OTelSdkError::AlreadyShutdown,
            ExportError::Timeout(after) => OTelSdkError::Timeout(after),
            other => OTelSdkError::InternalFailure(other.to_string()),
        }
    }
}

/// Result of a single export attempt
pub type ExportResult = Result<(), ExportError>;

/// Telemetry error types
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The resource descriptor could not be resolved
    #[error("Resource resolution error: {0}")]
    ResourceResolution(String),

    /// An exporter could not be constructed; bootstrap is aborted
    #[error("Failed to construct {signal} exporter: {source}")]
    ExporterConstruction {
        signal: Signal,
        #[source]
        source: ExportError,
    },

    /// A steady-state export failed
    #[error("{signal} export failed: {source}")]
    Export {
        signal: Signal,
        #[source]
        source: ExportError,
    },

    /// A single shutdown hook failed
    #[error("Shutdown hook '{hook}' failed: {source}")]
    ShutdownHook {
        hook: String,
        #[source]
        source: ExportError,
    },

    /// One or more shutdown hooks failed
    #[error("Telemetry shutdown failed: {0}")]
    Shutdown(ShutdownErrors),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Installing the tracing subscriber failed
    #[error("Subscriber error: {0}")]
    Subscriber(String),
}

impl TelemetryError {
    /// Names of the hooks that failed, when this is an aggregated shutdown error.
    pub fn failed_hooks(&self) -> Vec<&str> {
        match self {
            TelemetryError::Shutdown(errors) => errors.hook_names().collect(),
            TelemetryError::ShutdownHook { hook, .. } => vec![hook.as_str()],
            _ => Vec::new(),
        }
    }
}

/// Every hook failure collected during a coordinated shutdown, in invocation order.
#[derive(Debug, Default)]
pub struct ShutdownErrors {
    errors: Vec<(String, ExportError)>,
}

impl ShutdownErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, hook: impl Into<String>, error: ExportError) {
        self.errors.push((hook.into(), error));
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn hook_names(&self) -> impl Iterator<Item = &str> {
        self.errors.iter().map(|(hook, _)| hook.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ExportError)> {
        self.errors.iter().map(|(hook, err)| (hook.as_str(), err))
    }
}

impl fmt::Display for ShutdownErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} hook(s) failed", self.errors.len())?;
        for (i, (hook, err)) in self.errors.iter().enumerate() {
            let sep = if i == 0 { ": " } else { "; " };
            write!(f, "{sep}{hook}: {err}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ShutdownErrors {}

impl From<toml::de::Error> for TelemetryError {
    fn from(err: toml::de::Error) -> Self {
        TelemetryError::Config(err.to_string())
    }
}
