//! `tracing` subscriber setup
//!
//! Diagnostics go to stderr through a `fmt` layer and, when a
//! [`SdkLoggerProvider`] is supplied, to the log pipeline through the
//! OpenTelemetry appender bridge. Both layers are filtered by `RUST_LOG`, or
//! by the configured level when `RUST_LOG` is unset. The bridge never sees
//! the SDK's own diagnostics.
//!
//! Environment variables:
//! - `BEACON_LOG_LEVEL=trace|debug|info|warn|error|off`
//! - `BEACON_LOG_FORMAT=pretty|compact|json`
//! - `BEACON_LOG_COLOR=1|0`

use crate::env::EnvSource;
use crate::error::{TelemetryError, TelemetryResult};
use opentelemetry_appender_tracing::layer::OpenTelemetryTracingBridge;
use opentelemetry_sdk::logs::SdkLoggerProvider;
use std::str::FromStr;
use tracing::Subscriber;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

/// Minimum level of emitted diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    Off,
}

impl LogLevel {
    /// Directive understood by [`EnvFilter`].
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Off => "off",
        }
    }
}

impl FromStr for LogLevel {
    type Err = TelemetryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            "off" | "none" => Ok(LogLevel::Off),
            other => Err(TelemetryError::Config(format!("unknown log level '{other}'"))),
        }
    }
}

/// Output format of the `fmt` layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Compact,
    #[default]
    Json,
}

impl FromStr for LogFormat {
    type Err = TelemetryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "compact" => Ok(LogFormat::Compact),
            "json" => Ok(LogFormat::Json),
            other => Err(TelemetryError::Config(format!("unknown log format '{other}'"))),
        }
    }
}

/// Subscriber configuration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriberConfig {
    pub level: LogLevel,
    pub format: LogFormat,
    /// ANSI colors (ignored for JSON)
    pub color: bool,
    /// `RUST_LOG` directives; take precedence over `level`
    pub directives: Option<String>,
}

impl SubscriberConfig {
    /// Read `BEACON_LOG_*` and `RUST_LOG`. Unparseable values fall back to
    /// the defaults.
    pub fn from_env(env: &dyn EnvSource) -> Self {
        let level = env
            .non_empty("BEACON_LOG_LEVEL")
            .and_then(|s| s.parse().ok())
            .unwrap_or_default();
        let format = env
            .non_empty("BEACON_LOG_FORMAT")
            .and_then(|s| s.parse().ok())
            .unwrap_or_default();
        let color = env
            .non_empty("BEACON_LOG_COLOR")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        Self {
            level,
            format,
            color,
            directives: env.non_empty("RUST_LOG"),
        }
    }

    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    fn filter(&self) -> EnvFilter {
        if let Some(directives) = &self.directives {
            match EnvFilter::try_new(directives) {
                Ok(filter) => return filter,
                Err(e) => {
                    tracing::warn!(error = %e, "invalid RUST_LOG directives, using configured level");
                }
            }
        }
        EnvFilter::new(self.level.as_str())
    }

    /// Filter for the log bridge. Records emitted while exporting must not
    /// feed back into the pipeline.
    fn bridge_filter(&self) -> EnvFilter {
        SDK_TARGETS
            .iter()
            .filter_map(|target| format!("{target}=off").parse::<Directive>().ok())
            .fold(self.filter(), EnvFilter::add_directive)
    }
}

const SDK_TARGETS: &[&str] = &[
    "opentelemetry",
    "opentelemetry_sdk",
    "opentelemetry_appender_tracing",
];

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Build the subscriber without installing it.
pub fn subscriber(
    config: &SubscriberConfig,
    logs: Option<&SdkLoggerProvider>,
) -> impl Subscriber + Send + Sync {
    let mut layers: Vec<BoxedLayer> = Vec::with_capacity(2);

    let output: BoxedLayer = match config.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_filter(config.filter())
            .boxed(),
        LogFormat::Pretty => fmt::layer()
            .pretty()
            .with_ansi(config.color)
            .with_writer(std::io::stderr)
            .with_filter(config.filter())
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_ansi(config.color)
            .with_writer(std::io::stderr)
            .with_filter(config.filter())
            .boxed(),
    };
    layers.push(output);

    if let Some(provider) = logs {
        layers.push(
            OpenTelemetryTracingBridge::new(provider)
                .with_filter(config.bridge_filter())
                .boxed(),
        );
    }

    tracing_subscriber::registry().with(layers)
}

/// Install the subscriber as the global default. Fails if one is already set.
pub fn init_subscriber(
    config: &SubscriberConfig,
    logs: Option<&SdkLoggerProvider>,
) -> TelemetryResult<()> {
    subscriber(config, logs)
        .try_init()
        .map_err(|e| TelemetryError::Subscriber(e.to_string()))
}
