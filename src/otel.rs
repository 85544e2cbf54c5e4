use std::time::Duration;

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_appender_tracing::layer::OpenTelemetryTracingBridge;
use opentelemetry_otlp::{Protocol, WithExportConfig};
use opentelemetry_sdk::{
    logs::SdkLoggerProvider, metrics::SdkMeterProvider, trace::SdkTracerProvider,
};
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::{
    EnvFilter, Layer as _, filter::Directive, layer::SubscriberExt as _,
    util::SubscriberInitExt as _,
};

use crate::cli::{CliArgs, CliArgsOtelExporter};

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub struct Provider {
    logger: SdkLoggerProvider,
    meter: SdkMeterProvider,
    service_name: String,
    tracer: SdkTracerProvider,
}

impl Provider {
    /// # Errors
    ///
    /// Will return `Err` if an OTLP exporter is requested without an endpoint
    /// or protocol, or if the exporter could not be built.
    pub fn new(cli: &CliArgs) -> Result<Self, BoxError> {
        Ok(Self {
            logger: logger_provider(cli)?,
            meter: meter_provider(cli)?,
            service_name: cli.otel_service_name.clone(),
            tracer: tracer_provider(cli)?,
        })
    }

    #[must_use]
    pub fn meter(&self) -> &SdkMeterProvider {
        &self.meter
    }

    pub fn init_tracing_subscriber(&self) {
        let logger_layer =
            OpenTelemetryTracingBridge::new(&self.logger).with_filter(external_component_filter());

        let tracer_layer = OpenTelemetryLayer::new(self.tracer.tracer(self.service_name.clone()))
            .with_filter(external_component_filter());

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_thread_names(true)
            .with_filter(EnvFilter::from_default_env());

        tracing_subscriber::registry()
            .with(logger_layer)
            .with(tracer_layer)
            .with(fmt_layer)
            .init();
    }

    /// # Errors
    ///
    /// Will return `Err` if open telemetry providers could not shutdown.
    pub fn shutdown(&self) -> Result<(), BoxError> {
        let mut shutdown_errors = Vec::new();
        if let Err(e) = self.tracer.shutdown() {
            shutdown_errors.push(format!("tracer provider: {e}"));
        }
        if let Err(e) = self.meter.shutdown() {
            shutdown_errors.push(format!("meter provider: {e}"));
        }
        if let Err(e) = self.logger.shutdown() {
            shutdown_errors.push(format!("logger provider: {e}"));
        }
        if !shutdown_errors.is_empty() {
            return Err(format!(
                "Failed to shutdown providers:{}",
                shutdown_errors.join("\n")
            )
            .into());
        }

        Ok(())
    }
}

/// Logs emitted by the exporters' own transports do not carry OpenTelemetry
/// context and would be exported in a loop, so `hyper`, `tonic`, `h2` and
/// `reqwest` are switched off for the OpenTelemetry layers.
fn external_component_filter() -> EnvFilter {
    ["hyper=off", "tonic=off", "h2=off", "reqwest=off"]
        .into_iter()
        .filter_map(|directive| directive.parse::<Directive>().ok())
        .fold(EnvFilter::from_default_env(), EnvFilter::add_directive)
}

fn resource(cli: &CliArgs) -> opentelemetry_sdk::Resource {
    opentelemetry_sdk::Resource::builder()
        .with_service_name(cli.otel_service_name.clone())
        .build()
}

/*
 * ============================================================================
 * Signals
 * ============================================================================
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Signal {
    Logs,
    Metrics,
    Traces,
}

impl Signal {
    fn name(self) -> &'static str {
        match self {
            Signal::Logs => "LOGS",
            Signal::Metrics => "METRICS",
            Signal::Traces => "TRACES",
        }
    }

    fn path(self) -> &'static str {
        match self {
            Signal::Logs => "v1/logs",
            Signal::Metrics => "v1/metrics",
            Signal::Traces => "v1/traces",
        }
    }

    fn exporters(self, cli: &CliArgs) -> &[CliArgsOtelExporter] {
        match self {
            Signal::Logs => cli.otel_logs_exporter.as_deref(),
            Signal::Metrics => cli.otel_metrics_exporter.as_deref(),
            Signal::Traces => cli.otel_traces_exporter.as_deref(),
        }
        .unwrap_or_default()
    }

    /// A signal specific endpoint is used as is. The base endpoint has the
    /// signal's path appended for HTTP transports.
    fn endpoint(self, cli: &CliArgs, protocol: Protocol) -> Result<String, BoxError> {
        let specific = match self {
            Signal::Logs => &cli.otel_exporter_otlp_logs_endpoint,
            Signal::Metrics => &cli.otel_exporter_otlp_metrics_endpoint,
            Signal::Traces => &cli.otel_exporter_otlp_traces_endpoint,
        };

        if let Some(endpoint) = specific {
            return Ok(endpoint.clone());
        }

        if let Some(endpoint) = &cli.otel_exporter_otlp_endpoint {
            return Ok(match protocol {
                Protocol::Grpc => endpoint.clone(),
                Protocol::HttpBinary | Protocol::HttpJson => {
                    format!("{}/{}", endpoint.trim_end_matches('/'), self.path())
                }
            });
        }

        Err(format!(
            "OTEL_EXPORTER_OTLP_{}_ENDPOINT or OTEL_EXPORTER_OTLP_ENDPOINT must be set",
            self.name()
        )
        .into())
    }

    fn protocol(self, cli: &CliArgs) -> Result<Protocol, BoxError> {
        match self {
            Signal::Logs => cli.otel_exporter_otlp_logs_protocol,
            Signal::Metrics => cli.otel_exporter_otlp_metrics_protocol,
            Signal::Traces => cli.otel_exporter_otlp_traces_protocol,
        }
        .or(cli.otel_exporter_otlp_protocol)
        .map(Into::into)
        .ok_or_else(|| {
            format!(
                "OTEL_EXPORTER_OTLP_{}_PROTOCOL or OTEL_EXPORTER_OTLP_PROTOCOL must be set",
                self.name()
            )
            .into()
        })
    }

    fn timeout(self, cli: &CliArgs) -> Duration {
        Duration::from_millis(
            match self {
                Signal::Logs => cli.otel_exporter_otlp_logs_timeout,
                Signal::Metrics => cli.otel_exporter_otlp_metrics_timeout,
                Signal::Traces => cli.otel_exporter_otlp_traces_timeout,
            }
            .unwrap_or(cli.otel_exporter_otlp_timeout),
        )
    }
}

/*
 * ============================================================================
 * Providers
 * ============================================================================
 */
fn logger_provider(cli: &CliArgs) -> Result<SdkLoggerProvider, BoxError> {
    let signal = Signal::Logs;
    let mut provider_builder = SdkLoggerProvider::builder().with_resource(resource(cli));

    if signal.exporters(cli).contains(&CliArgsOtelExporter::Console) {
        provider_builder =
            provider_builder.with_simple_exporter(opentelemetry_stdout::LogExporter::default());
    }

    if signal.exporters(cli).contains(&CliArgsOtelExporter::Otlp) {
        let protocol = signal.protocol(cli)?;
        let endpoint = signal.endpoint(cli, protocol)?;
        let timeout = signal.timeout(cli);

        let exporter = match protocol {
            Protocol::Grpc => opentelemetry_otlp::LogExporter::builder()
                .with_tonic()
                .with_endpoint(endpoint)
                .with_protocol(protocol)
                .with_timeout(timeout)
                .build()?,
            Protocol::HttpBinary | Protocol::HttpJson => {
                opentelemetry_otlp::LogExporter::builder()
                    .with_http()
                    .with_endpoint(endpoint)
                    .with_protocol(protocol)
                    .with_timeout(timeout)
                    .build()?
            }
        };

        provider_builder = provider_builder.with_batch_exporter(exporter);
    }

    Ok(provider_builder.build())
}

fn meter_provider(cli: &CliArgs) -> Result<SdkMeterProvider, BoxError> {
    let signal = Signal::Metrics;
    let mut provider_builder = SdkMeterProvider::builder().with_resource(resource(cli));

    if signal.exporters(cli).contains(&CliArgsOtelExporter::Console) {
        provider_builder = provider_builder
            .with_periodic_exporter(opentelemetry_stdout::MetricExporterBuilder::default().build());
    }

    if signal.exporters(cli).contains(&CliArgsOtelExporter::Otlp) {
        let protocol = signal.protocol(cli)?;
        let endpoint = signal.endpoint(cli, protocol)?;
        let timeout = signal.timeout(cli);

        let exporter = match protocol {
            Protocol::Grpc => opentelemetry_otlp::MetricExporter::builder()
                .with_tonic()
                .with_endpoint(endpoint)
                .with_protocol(protocol)
                .with_timeout(timeout)
                .build()?,
            Protocol::HttpBinary | Protocol::HttpJson => {
                opentelemetry_otlp::MetricExporter::builder()
                    .with_http()
                    .with_endpoint(endpoint)
                    .with_protocol(protocol)
                    .with_timeout(timeout)
                    .build()?
            }
        };

        provider_builder = provider_builder.with_periodic_exporter(exporter);
    }

    Ok(provider_builder.build())
}

fn tracer_provider(cli: &CliArgs) -> Result<SdkTracerProvider, BoxError> {
    let signal = Signal::Traces;
    let mut provider_builder = SdkTracerProvider::builder().with_resource(resource(cli));

    if signal.exporters(cli).contains(&CliArgsOtelExporter::Console) {
        provider_builder =
            provider_builder.with_simple_exporter(opentelemetry_stdout::SpanExporter::default());
    }

    if signal.exporters(cli).contains(&CliArgsOtelExporter::Otlp) {
        let protocol = signal.protocol(cli)?;
        let endpoint = signal.endpoint(cli, protocol)?;
        let timeout = signal.timeout(cli);

        let exporter = match protocol {
            Protocol::Grpc => opentelemetry_otlp::SpanExporter::builder()
                .with_tonic()
                .with_endpoint(endpoint)
                .with_protocol(protocol)
                .with_timeout(timeout)
                .build()?,
            Protocol::HttpBinary | Protocol::HttpJson => {
                opentelemetry_otlp::SpanExporter::builder()
                    .with_http()
                    .with_endpoint(endpoint)
                    .with_protocol(protocol)
                    .with_timeout(timeout)
                    .build()?
            }
        };

        provider_builder = provider_builder.with_batch_exporter(exporter);
    }

    Ok(provider_builder.build())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use clap::Parser;
    use opentelemetry_otlp::Protocol;

    use crate::cli::{CliArgs, CliArgsOtelExporter};

    use super::Signal;

    fn cli(args: &[&str]) -> CliArgs {
        CliArgs::try_parse_from(
            ["pki-operator"]
                .iter()
                .chain(args)
                .chain(["crd", "generate"].iter()),
        )
        .unwrap()
    }

    #[test]
    fn endpoint_base_appends_signal_path_for_http() {
        // arrange
        let cli = cli(&["--otel-exporter-otlp-endpoint", "http://collector:4318/"]);

        // act
        let logs = Signal::Logs.endpoint(&cli, Protocol::HttpBinary).unwrap();
        let traces = Signal::Traces.endpoint(&cli, Protocol::HttpJson).unwrap();

        // assert
        assert_eq!("http://collector:4318/v1/logs", logs);
        assert_eq!("http://collector:4318/v1/traces", traces);
    }

    #[test]
    fn endpoint_base_is_used_as_is_for_grpc() {
        // arrange
        let cli = cli(&["--otel-exporter-otlp-endpoint", "http://collector:4317"]);

        // act
        let metrics = Signal::Metrics.endpoint(&cli, Protocol::Grpc).unwrap();

        // assert
        assert_eq!("http://collector:4317", metrics);
    }

    #[test]
    fn endpoint_specific_overrides_base() {
        // arrange
        let cli = cli(&[
            "--otel-exporter-otlp-endpoint",
            "http://collector:4318",
            "--otel-exporter-otlp-metrics-endpoint",
            "http://metrics:4318/custom",
        ]);

        // act
        let metrics = Signal::Metrics.endpoint(&cli, Protocol::HttpBinary).unwrap();

        // assert
        assert_eq!("http://metrics:4318/custom", metrics);
    }

    #[test]
    fn endpoint_missing_is_an_error() {
        // arrange
        let cli = cli(&[]);

        // act
        let error = Signal::Traces.endpoint(&cli, Protocol::Grpc).unwrap_err();

        // assert
        assert!(error.to_string().contains("OTEL_EXPORTER_OTLP_TRACES_ENDPOINT"));
    }

    #[test]
    fn protocol_and_timeout_fall_back_to_base() {
        // arrange
        let cli = cli(&[
            "--otel-exporter-otlp-protocol",
            "grpc",
            "--otel-exporter-otlp-logs-protocol",
            "http/json",
            "--otel-exporter-otlp-timeout",
            "500",
            "--otel-exporter-otlp-traces-timeout",
            "250",
        ]);

        // assert
        assert_eq!(Protocol::HttpJson, Signal::Logs.protocol(&cli).unwrap());
        assert_eq!(Protocol::Grpc, Signal::Metrics.protocol(&cli).unwrap());
        assert_eq!(Duration::from_millis(500), Signal::Logs.timeout(&cli));
        assert_eq!(Duration::from_millis(250), Signal::Traces.timeout(&cli));
    }

    #[test]
    fn exporters_default_to_none() {
        // arrange
        let cli = cli(&["--otel-metrics-exporter", "console"]);

        // assert
        assert!(Signal::Logs.exporters(&cli).is_empty());
        assert_eq!(
            &[CliArgsOtelExporter::Console],
            Signal::Metrics.exporters(&cli)
        );
    }
}
