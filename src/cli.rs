use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::allowed_names::DEFAULT_ALLOWED_NAMES_FILE_PATH;

/*
 * ============================================================================
 * Cli
 * ============================================================================
 */
#[allow(clippy::module_name_repetitions)]
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: CliCommands,

    /// Specifies which exporter is used for logs.
    #[arg(long, env = "OTEL_LOGS_EXPORTER", global = true, value_delimiter = ',')]
    pub otel_logs_exporter: Option<Vec<CliArgsOtelExporter>>,

    /// Specifies which exporter is used for metrics.
    #[arg(long, env = "OTEL_METRICS_EXPORTER", global = true, value_delimiter = ',')]
    pub otel_metrics_exporter: Option<Vec<CliArgsOtelExporter>>,

    /// Specifies which exporter is used for traces.
    #[arg(long, env = "OTEL_TRACES_EXPORTER", global = true, value_delimiter = ',')]
    pub otel_traces_exporter: Option<Vec<CliArgsOtelExporter>>,

    /// A base endpoint URL for any signal type.
    #[arg(long, env = "OTEL_EXPORTER_OTLP_ENDPOINT", global = true)]
    pub otel_exporter_otlp_endpoint: Option<String>,

    /// Endpoint URL for log data only.
    #[arg(long, env = "OTEL_EXPORTER_OTLP_LOGS_ENDPOINT", global = true)]
    pub otel_exporter_otlp_logs_endpoint: Option<String>,

    /// Endpoint URL for metric data only.
    #[arg(long, env = "OTEL_EXPORTER_OTLP_METRICS_ENDPOINT", global = true)]
    pub otel_exporter_otlp_metrics_endpoint: Option<String>,

    /// Endpoint URL for trace data only.
    #[arg(long, env = "OTEL_EXPORTER_OTLP_TRACES_ENDPOINT", global = true)]
    pub otel_exporter_otlp_traces_endpoint: Option<String>,

    /// Specifies the OTLP transport protocol to be used for all telemetry data.
    #[arg(long, env = "OTEL_EXPORTER_OTLP_PROTOCOL", global = true)]
    pub otel_exporter_otlp_protocol: Option<CliArgsOtelExporterProtocol>,

    /// Specifies the OTLP transport protocol to be used for log data.
    #[arg(long, env = "OTEL_EXPORTER_OTLP_LOGS_PROTOCOL", global = true)]
    pub otel_exporter_otlp_logs_protocol: Option<CliArgsOtelExporterProtocol>,

    /// Specifies the OTLP transport protocol to be used for metrics data.
    #[arg(long, env = "OTEL_EXPORTER_OTLP_METRICS_PROTOCOL", global = true)]
    pub otel_exporter_otlp_metrics_protocol: Option<CliArgsOtelExporterProtocol>,

    /// Specifies the OTLP transport protocol to be used for trace data.
    #[arg(long, env = "OTEL_EXPORTER_OTLP_TRACES_PROTOCOL", global = true)]
    pub otel_exporter_otlp_traces_protocol: Option<CliArgsOtelExporterProtocol>,

    /// The timeout value for all outgoing data (in milliseconds).
    #[arg(
        long,
        env = "OTEL_EXPORTER_OTLP_TIMEOUT",
        global = true,
        default_value_t = 10000
    )]
    pub otel_exporter_otlp_timeout: u64,

    /// The timeout value for all outgoing logs (in milliseconds).
    #[arg(long, env = "OTEL_EXPORTER_OTLP_LOGS_TIMEOUT", global = true)]
    pub otel_exporter_otlp_logs_timeout: Option<u64>,

    /// The timeout value for all outgoing metrics (in milliseconds).
    #[arg(long, env = "OTEL_EXPORTER_OTLP_METRICS_TIMEOUT", global = true)]
    pub otel_exporter_otlp_metrics_timeout: Option<u64>,

    /// The timeout value for all outgoing traces (in milliseconds).
    #[arg(long, env = "OTEL_EXPORTER_OTLP_TRACES_TIMEOUT", global = true)]
    pub otel_exporter_otlp_traces_timeout: Option<u64>,

    /// Sets the value of the `service.name` resource attribute.
    #[arg(
        long,
        env = "OTEL_SERVICE_NAME",
        global = true,
        default_value = "pki-operator"
    )]
    pub otel_service_name: String,
}

#[must_use]
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

#[allow(clippy::module_name_repetitions)]
#[derive(Subcommand, Debug)]
pub enum CliCommands {
    /// Controller
    Controller(ControllerArgs),

    /// Custom Resource Definition
    Crd(CrdArgs),

    /// Markdown
    #[command(hide = true)]
    Markdown(MarkdownArgs),
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CliArgsOtelExporter {
    Console,
    Otlp,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CliArgsOtelExporterProtocol {
    Grpc,
    #[value(name = "http/protobuf")]
    HttpBinary,
    #[value(name = "http/json")]
    HttpJson,
}

impl From<CliArgsOtelExporterProtocol> for opentelemetry_otlp::Protocol {
    fn from(value: CliArgsOtelExporterProtocol) -> Self {
        match value {
            CliArgsOtelExporterProtocol::Grpc => opentelemetry_otlp::Protocol::Grpc,
            CliArgsOtelExporterProtocol::HttpBinary => opentelemetry_otlp::Protocol::HttpBinary,
            CliArgsOtelExporterProtocol::HttpJson => opentelemetry_otlp::Protocol::HttpJson,
        }
    }
}

/*
 * ============================================================================
 * Controller
 * ============================================================================
 */
#[derive(Args, Debug)]
pub struct ControllerArgs {
    #[command(subcommand)]
    pub command: ControllerCommands,
}

#[derive(Subcommand, Debug)]
pub enum ControllerCommands {
    /// Run
    Run(ControllerRunArgs),
}

#[derive(Args, Debug)]
pub struct ControllerRunArgs {
    /// File listing the allowed `.spec.serviceName` values, one per line.
    #[arg(long, env = "PKI_OPERATOR_ALLOWED_NAMES_FILE", default_value = DEFAULT_ALLOWED_NAMES_FILE_PATH, value_hint = clap::ValueHint::FilePath)]
    pub allowed_names_file: PathBuf,

    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    #[arg(long, default_value_t = 8080)]
    pub port: u16,

    /// Name of the controller reported on published Events.
    #[arg(long, default_value = "pki-operator")]
    pub reporting_controller: String,

    /// Instance of the controller reported on published Events.
    #[arg(long, env = "POD_NAME")]
    pub reporting_instance: Option<String>,
}

/*
 * ============================================================================
 * Custom Resource Document
 * ============================================================================
 */
#[derive(Args, Debug)]
pub struct CrdArgs {
    #[command(subcommand)]
    pub command: CrdCommands,
}

#[derive(Subcommand, Debug)]
pub enum CrdCommands {
    /// Generate
    Generate(CrdGenerateArgs),
}

#[derive(Args, Debug)]
pub struct CrdGenerateArgs {
    #[arg(long, value_enum, default_value_t = CrdGenerateArgsFormat::Yaml)]
    pub format: CrdGenerateArgsFormat,

    #[arg(long, value_hint = clap::ValueHint::DirPath)]
    pub output: Option<PathBuf>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrdGenerateArgsFormat {
    Json,
    Yaml,
}

/*
 * ============================================================================
 * Markdown
 * ============================================================================
 */
#[derive(Args, Debug)]
pub struct MarkdownArgs {
    #[command(subcommand)]
    pub command: MarkdownCommands,
}

#[derive(Subcommand, Debug)]
pub enum MarkdownCommands {
    /// Generate
    Generate(MarkdownGenerateArgs),

    /// View
    View(MarkdownViewArgs),
}

#[derive(Args, Debug)]
pub struct MarkdownGenerateArgs {
    #[arg(long, value_hint = clap::ValueHint::DirPath)]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct MarkdownViewArgs {}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use clap::Parser;

    use super::{
        CliArgs, CliArgsOtelExporter, CliArgsOtelExporterProtocol, CliCommands,
        ControllerCommands, CrdCommands, CrdGenerateArgsFormat,
    };

    #[test]
    fn controller_run_defaults() {
        // act
        let cli = CliArgs::try_parse_from(["pki-operator", "controller", "run"]).unwrap();

        // assert
        let CliCommands::Controller(controller) = cli.command else {
            panic!("expected controller command");
        };
        let ControllerCommands::Run(run) = controller.command;
        assert_eq!(PathBuf::from("/AllowedNames"), run.allowed_names_file);
        assert_eq!("127.0.0.1", run.host);
        assert_eq!(8080, run.port);
        assert_eq!("pki-operator", run.reporting_controller);
        assert_eq!("pki-operator", cli.otel_service_name);
        assert_eq!(10000, cli.otel_exporter_otlp_timeout);
    }

    #[test]
    fn controller_run_allowed_names_file() {
        // act
        let cli = CliArgs::try_parse_from([
            "pki-operator",
            "controller",
            "run",
            "--allowed-names-file",
            "/etc/pki/allowed-names",
            "--port",
            "9090",
        ])
        .unwrap();

        // assert
        let CliCommands::Controller(controller) = cli.command else {
            panic!("expected controller command");
        };
        let ControllerCommands::Run(run) = controller.command;
        assert_eq!(
            PathBuf::from("/etc/pki/allowed-names"),
            run.allowed_names_file
        );
        assert_eq!(9090, run.port);
    }

    #[test]
    fn crd_generate_json() {
        // act
        let cli =
            CliArgs::try_parse_from(["pki-operator", "crd", "generate", "--format", "json"])
                .unwrap();

        // assert
        let CliCommands::Crd(crd) = cli.command else {
            panic!("expected crd command");
        };
        let CrdCommands::Generate(generate) = crd.command;
        assert_eq!(CrdGenerateArgsFormat::Json, generate.format);
        assert!(generate.output.is_none());
    }

    #[test]
    fn otel_exporters_are_comma_separated() {
        // act
        let cli = CliArgs::try_parse_from([
            "pki-operator",
            "--otel-traces-exporter",
            "console,otlp",
            "--otel-exporter-otlp-protocol",
            "http/protobuf",
            "crd",
            "generate",
        ])
        .unwrap();

        // assert
        assert_eq!(
            Some(vec![CliArgsOtelExporter::Console, CliArgsOtelExporter::Otlp]),
            cli.otel_traces_exporter
        );
        assert_eq!(
            Some(CliArgsOtelExporterProtocol::HttpBinary),
            cli.otel_exporter_otlp_protocol
        );
    }
}
