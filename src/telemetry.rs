use crate::config::{LogFormat, TelemetryConfig};
use opentelemetry::{KeyValue, global};
use opentelemetry_appender_tracing::layer::OpenTelemetryTracingBridge;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{
    Resource,
    logs::SdkLoggerProvider,
    metrics::{PeriodicReader, SdkMeterProvider},
    propagation::TraceContextPropagator,
    trace::SdkTracerProvider,
};
use opentelemetry_semantic_conventions::resource::{SERVICE_NAME, SERVICE_VERSION};
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt, util::SubscriberInitExt};

const SERVICE: &str = "courier-server";

/// Holds the OTLP providers so they can be flushed on exit.
#[derive(Debug, Default)]
#[must_use = "dropping the guard skips the final telemetry flush"]
pub struct TelemetryGuard {
    providers: Option<Providers>,
}

#[derive(Debug)]
struct Providers {
    tracer: SdkTracerProvider,
    meter: SdkMeterProvider,
    logger: SdkLoggerProvider,
}

impl TelemetryGuard {
    /// Flushes and shuts down every provider. Failures are reported on stderr
    /// since the log pipeline may already be gone.
    #[allow(clippy::print_stderr)]
    pub fn shutdown(self) {
        let Some(p) = self.providers else {
            return;
        };
        if let Err(e) = p.tracer.shutdown() {
            eprintln!("failed to shut down tracer provider: {e}");
        }
        if let Err(e) = p.meter.shutdown() {
            eprintln!("failed to shut down meter provider: {e}");
        }
        if let Err(e) = p.logger.shutdown() {
            eprintln!("failed to shut down logger provider: {e}");
        }
    }
}

fn env_filter() -> anyhow::Result<EnvFilter> {
    Ok(EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"))
        .add_directive("sqlx=warn".parse()?)
        .add_directive("hyper=warn".parse()?)
        .add_directive("h2=warn".parse()?)
        .add_directive("tonic=warn".parse()?)
        .add_directive("lettre=warn".parse()?))
}

fn init_providers(endpoint: &str) -> anyhow::Result<Providers> {
    let resource = Resource::builder()
        .with_attributes(vec![
            KeyValue::new(SERVICE_NAME, SERVICE),
            KeyValue::new(SERVICE_VERSION, env!("CARGO_PKG_VERSION")),
        ])
        .build();

    global::set_text_map_propagator(TraceContextPropagator::new());

    let tracer = SdkTracerProvider::builder()
        .with_resource(resource.clone())
        .with_batch_exporter(opentelemetry_otlp::SpanExporter::builder().with_tonic().with_endpoint(endpoint).build()?)
        .build();
    global::set_tracer_provider(tracer.clone());

    let metric_exporter = opentelemetry_otlp::MetricExporter::builder().with_tonic().with_endpoint(endpoint).build()?;
    let meter = SdkMeterProvider::builder()
        .with_resource(resource.clone())
        .with_reader(PeriodicReader::builder(metric_exporter).build())
        .build();
    global::set_meter_provider(meter.clone());

    let logger = SdkLoggerProvider::builder()
        .with_resource(resource)
        .with_batch_exporter(opentelemetry_otlp::LogExporter::builder().with_tonic().with_endpoint(endpoint).build()?)
        .build();

    Ok(Providers { tracer, meter, logger })
}

/// Installs the global tracing subscriber and, when an OTLP endpoint is
/// configured, the OpenTelemetry trace, metric and log pipelines.
///
/// # Errors
/// Returns an error if a filter directive is invalid or an OTLP exporter cannot be built.
pub fn init_telemetry(config: &TelemetryConfig) -> anyhow::Result<TelemetryGuard> {
    let registry = Registry::default().with(env_filter()?);

    let providers = config.otlp_endpoint.as_deref().map(init_providers).transpose()?;

    let otel_layer = providers.as_ref().map(|p| {
        let tracer = opentelemetry::trace::TracerProvider::tracer(&p.tracer, SERVICE);
        OpenTelemetryLayer::new(tracer)
    });
    let log_bridge = providers.as_ref().map(|p| OpenTelemetryTracingBridge::new(&p.logger));

    let registry = registry.with(otel_layer).with(log_bridge);

    match config.log_format {
        LogFormat::Text => {
            registry.with(tracing_subscriber::fmt::layer()).try_init()?;
        }
        LogFormat::Json => {
            registry.with(tracing_subscriber::fmt::layer().json()).try_init()?;
        }
    }

    if let Some(endpoint) = &config.otlp_endpoint {
        tracing::info!(endpoint = %endpoint, "OpenTelemetry export enabled");
    }

    Ok(TelemetryGuard { providers })
}
