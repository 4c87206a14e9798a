//! Tracing, metrics and log export for twinrpc clients
//!
//! The client crates only ever emit through `tracing` macros and the global
//! `opentelemetry` meter. Whether any of that leaves the process is decided
//! here, once, by the application:
//!
//! - **Traces**: `tracing` spans bridged to OTLP through `tracing-opentelemetry`
//! - **Metrics**: a periodic OTLP metric reader behind the global meter provider
//! - **Logs**: `tracing-subscriber` formatting, JSON by default
//!
//! ```rust,no_run
//! use twinrpc_core::ObservabilityConfig;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ObservabilityConfig::new("billing-gateway")
//!         .with_endpoint("http://localhost:4317")
//!         .with_log_level("twinrpc_client=debug,info");
//!
//!     twinrpc_core::init_observability(config).expect("observability");
//!
//!     // ... issue calls ...
//!
//!     twinrpc_core::shutdown_observability();
//! }
//! ```
//!
//! `OTEL_EXPORTER_OTLP_ENDPOINT` and `RUST_LOG` are honored when set.

use opentelemetry::{global, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::Resource;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

type InitResult<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

const DEFAULT_OTLP_ENDPOINT: &str = "http://localhost:4317";
const METRIC_EXPORT_INTERVAL: Duration = Duration::from_secs(30);

/// Observability configuration
///
/// Each pillar can be switched off independently. With traces and metrics
/// both disabled nothing is exported and only local log output remains.
///
/// ```rust
/// use twinrpc_core::ObservabilityConfig;
///
/// let config = ObservabilityConfig::new("edge-worker")
///     .with_metrics(false)
///     .with_json_logs(false);
/// assert_eq!(config.service_name, "edge-worker");
/// assert!(config.enable_traces);
/// ```
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    /// Service name attached to every span and metric
    pub service_name: String,
    /// Service version, defaults to the crate version
    pub service_version: String,
    /// OTLP/gRPC collector endpoint
    pub otlp_endpoint: String,
    /// Export spans over OTLP
    pub enable_traces: bool,
    /// Export client metrics over OTLP
    pub enable_metrics: bool,
    /// Emit local log output
    pub enable_logs: bool,
    /// Format local log output as JSON lines rather than human-readable text
    pub json_logs: bool,
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            service_name: "twinrpc".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            otlp_endpoint: std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
                .unwrap_or_else(|_| DEFAULT_OTLP_ENDPOINT.to_string()),
            enable_traces: true,
            enable_metrics: true,
            enable_logs: true,
            json_logs: true,
            log_level: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        }
    }
}

impl ObservabilityConfig {
    /// Create a configuration for the named service with default settings
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            ..Default::default()
        }
    }

    /// Set the OTLP collector endpoint
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.otlp_endpoint = endpoint.into();
        self
    }

    /// Set the fallback log filter directive
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Set the reported service version
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.service_version = version.into();
        self
    }

    /// Enable or disable span export
    pub fn with_traces(mut self, enable: bool) -> Self {
        self.enable_traces = enable;
        self
    }

    /// Enable or disable metric export
    pub fn with_metrics(mut self, enable: bool) -> Self {
        self.enable_metrics = enable;
        self
    }

    /// Enable or disable local log output
    pub fn with_logs(mut self, enable: bool) -> Self {
        self.enable_logs = enable;
        self
    }

    /// Choose between JSON and plain text log lines
    pub fn with_json_logs(mut self, json: bool) -> Self {
        self.json_logs = json;
        self
    }

    fn resource(&self) -> Resource {
        Resource::builder_empty()
            .with_attributes(vec![
                KeyValue::new(
                    opentelemetry_semantic_conventions::resource::SERVICE_NAME,
                    self.service_name.clone(),
                ),
                KeyValue::new(
                    opentelemetry_semantic_conventions::resource::SERVICE_VERSION,
                    self.service_version.clone(),
                ),
            ])
            .build()
    }
}

/// Install the global tracer provider, meter provider and tracing subscriber
///
/// Call once at startup, before building clients. A second call fails because
/// the global subscriber is already set.
///
/// # Errors
///
/// Fails when an OTLP exporter cannot be built, the log filter directive is
/// invalid, or a global subscriber has already been installed.
pub fn init_observability(config: ObservabilityConfig) -> InitResult<()> {
    let tracer = if config.enable_traces {
        Some(init_tracer(&config)?)
    } else {
        None
    };

    if config.enable_metrics {
        init_metrics(&config)?;
    }

    init_tracing_subscriber(&config, tracer)?;

    tracing::info!(
        service_name = %config.service_name,
        otlp_endpoint = %config.otlp_endpoint,
        traces = config.enable_traces,
        metrics = config.enable_metrics,
        logs = config.enable_logs,
        "Observability initialized"
    );

    Ok(())
}

fn init_tracer(config: &ObservabilityConfig) -> InitResult<opentelemetry_sdk::trace::Tracer> {
    use opentelemetry::trace::TracerProvider as _;
    use opentelemetry_sdk::trace::{RandomIdGenerator, Sampler, SdkTracerProvider};

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(config.otlp_endpoint.clone())
        .build()?;

    let provider = SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(config.resource())
        .with_sampler(Sampler::AlwaysOn)
        .with_id_generator(RandomIdGenerator::default())
        .build();

    // The subscriber layer needs the tracer before the provider goes global.
    let tracer = provider.tracer(config.service_name.clone());
    global::set_tracer_provider(provider);

    Ok(tracer)
}

fn init_metrics(config: &ObservabilityConfig) -> InitResult<()> {
    use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};

    let exporter = opentelemetry_otlp::MetricExporter::builder()
        .with_tonic()
        .with_endpoint(config.otlp_endpoint.clone())
        .build()?;

    let reader = PeriodicReader::builder(exporter)
        .with_interval(METRIC_EXPORT_INTERVAL)
        .build();

    let provider = SdkMeterProvider::builder()
        .with_reader(reader)
        .with_resource(config.resource())
        .build();

    global::set_meter_provider(provider);
    Ok(())
}

fn init_tracing_subscriber(
    config: &ObservabilityConfig,
    tracer: Option<opentelemetry_sdk::trace::Tracer>,
) -> InitResult<()> {
    let env_filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&config.log_level))?;

    let telemetry_layer = tracer.map(|tracer| tracing_opentelemetry::layer().with_tracer(tracer));

    let (json_layer, text_layer) = match (config.enable_logs, config.json_logs) {
        (false, _) => (None, None),
        (true, true) => (
            Some(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_line_number(true)
                    .json(),
            ),
            None,
        ),
        (true, false) => (
            None,
            Some(tracing_subscriber::fmt::layer().with_target(true)),
        ),
    };

    tracing_subscriber::registry()
        .with(telemetry_layer)
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
        .try_init()?;

    Ok(())
}

/// Flush and release telemetry providers
///
/// Providers flush on drop in opentelemetry 0.30, so this only marks the
/// shutdown in the log stream. Safe to call more than once.
pub fn shutdown_observability() {
    tracing::info!("Shutting down observability");
}
