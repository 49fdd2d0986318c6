//! Tracing Setup
//!
//! Installs a `tracing-subscriber` fmt layer filtered by `RUST_LOG`, and
//! optionally an OTLP span exporter.
//!
//! # Environment Variables
//!
//! - `OTEL_ENABLED`: Set to "true" to export spans (default: false)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: http://localhost:4317)
//! - `OTEL_SERVICE_NAME`: Service name for traces (default: crypto-stream-<role>)
//!
//! # Usage
//!
//! ```ignore
//! use crypto_stream::infrastructure::telemetry;
//!
//! let _guard = telemetry::init("producer")?;
//! ```

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::trace::SdkTracerProvider;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const SERVICE_PREFIX: &str = "crypto-stream";
const DEFAULT_OTLP_ENDPOINT: &str = "http://localhost:4317";
const DEFAULT_DIRECTIVE: &str = "crypto_stream=info";

/// Errors raised while installing the subscriber.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// A filter directive failed to parse.
    #[error("invalid log directive: {0}")]
    Directive(#[from] tracing_subscriber::filter::ParseError),

    /// The OTLP exporter could not be built.
    #[error("failed to build OTLP exporter: {0}")]
    Exporter(#[from] opentelemetry_otlp::ExporterBuildError),

    /// A global subscriber is already installed.
    #[error("failed to install subscriber: {0}")]
    Install(#[from] tracing_subscriber::util::TryInitError),
}

/// Shuts down the tracer provider when dropped.
pub struct TelemetryGuard {
    tracer_provider: Option<SdkTracerProvider>,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.tracer_provider.take()
            && let Err(e) = provider.shutdown()
        {
            eprintln!("Failed to shutdown OpenTelemetry tracer provider: {e}");
        }
    }
}

/// Telemetry configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// Whether spans are exported.
    pub enabled: bool,
    /// OTLP exporter endpoint.
    pub otlp_endpoint: String,
    /// Service name for traces.
    pub service_name: String,
}

impl TelemetryConfig {
    /// Defaults for one process role (`producer` or `dataloader`).
    #[must_use]
    pub fn for_role(role: &str) -> Self {
        Self {
            enabled: false,
            otlp_endpoint: DEFAULT_OTLP_ENDPOINT.to_string(),
            service_name: format!("{SERVICE_PREFIX}-{role}"),
        }
    }

    /// Role defaults overridden by environment variables.
    #[must_use]
    pub fn from_env(role: &str) -> Self {
        Self::from_lookup(role, |key| std::env::var(key).ok())
    }

    fn from_lookup(role: &str, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::for_role(role);
        Self {
            enabled: lookup("OTEL_ENABLED").is_some_and(|v| v.eq_ignore_ascii_case("true")),
            otlp_endpoint: lookup("OTEL_EXPORTER_OTLP_ENDPOINT")
                .unwrap_or(defaults.otlp_endpoint),
            service_name: lookup("OTEL_SERVICE_NAME").unwrap_or(defaults.service_name),
        }
    }
}

/// Initialize telemetry for `role` from the environment.
///
/// # Errors
///
/// See [`init_with_config`].
pub fn init(role: &str) -> Result<TelemetryGuard, TelemetryError> {
    init_with_config(TelemetryConfig::from_env(role))
}

/// Initialize telemetry with an explicit configuration.
///
/// The guard must be kept alive for the duration of the program.
///
/// # Errors
///
/// Returns an error if the exporter cannot be built or a subscriber is
/// already installed.
pub fn init_with_config(config: TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    let env_filter = EnvFilter::from_default_env()
        .add_directive(DEFAULT_DIRECTIVE.parse()?)
        .add_directive("sqlx=warn".parse()?)
        .add_directive("tungstenite=warn".parse()?);

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    if !config.enabled {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()?;

        return Ok(TelemetryGuard {
            tracer_provider: None,
        });
    }

    let otlp_exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(&config.otlp_endpoint)
        .build()?;

    let tracer_provider = SdkTracerProvider::builder()
        .with_batch_exporter(otlp_exporter)
        .with_resource(
            opentelemetry_sdk::Resource::builder()
                .with_service_name(config.service_name.clone())
                .build(),
        )
        .build();

    let tracer = tracer_provider.tracer(config.service_name);
    let otel_layer = tracing_opentelemetry::layer().with_tracer(tracer);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .with(otel_layer)
        .try_init()?;

    Ok(TelemetryGuard {
        tracer_provider: Some(tracer_provider),
    })
}
