use std::{fs::File, io::Write, path::Path, process::ExitCode};

use kube::runtime::events::Reporter;
use pki_operator::{
    allowed_names::AllowedNames,
    cli::{
        CliArgs, CliCommands, ControllerArgs, ControllerCommands, ControllerRunArgs, CrdArgs,
        CrdCommands, CrdGenerateArgs, CrdGenerateArgsFormat, MarkdownArgs, MarkdownCommands,
        MarkdownGenerateArgs, parse,
    },
    http_server,
    metrics::Metrics,
    otel, pki,
};

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = &parse();

    let provider = match otel::Provider::new(cli) {
        Ok(provider) => provider,
        Err(error) => {
            eprintln!("failed to initialize open telemetry: {error}");
            return ExitCode::FAILURE;
        }
    };
    provider.init_tracing_subscriber();

    let result = match &cli.command {
        CliCommands::Controller(controller) => match &controller.command {
            ControllerCommands::Run(run) => controller_run(cli, controller, run, &provider).await,
        },
        CliCommands::Crd(crd) => match &crd.command {
            CrdCommands::Generate(generate) => crd_generate(cli, crd, generate),
        },
        CliCommands::Markdown(markdown) => match &markdown.command {
            MarkdownCommands::Generate(generate) => markdown_generate(cli, markdown, generate),
            MarkdownCommands::View(_) => {
                clap_markdown::print_help_markdown::<CliArgs>();
                Ok(())
            }
        },
    };

    if let Err(error) = &result {
        tracing::error!(error =% error, "failed");
    }

    if let Err(error) = provider.shutdown() {
        eprintln!("{error}");
    }

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(_) => ExitCode::FAILURE,
    }
}

async fn controller_run(
    _cli: &CliArgs,
    _controller: &ControllerArgs,
    run: &ControllerRunArgs,
    provider: &otel::Provider,
) -> Result<(), BoxError> {
    let addr = format!("{}:{}", run.host, run.port).parse()?;

    let allowed_names = AllowedNames::load(&run.allowed_names_file)?;
    tracing::info!(
        path =% run.allowed_names_file.display(),
        count = allowed_names.len(),
        allowed_names =% allowed_names,
        "loaded allowed names"
    );
    if allowed_names.is_empty() {
        tracing::warn!(
            path =% run.allowed_names_file.display(),
            "no allowed names, every pki will be rejected"
        );
    }

    let client = kube::Client::try_default().await?;
    let metrics = Metrics::new(provider.meter());

    let config = pki::Config {
        allowed_names,
        reporter: Reporter {
            controller: run.reporting_controller.clone(),
            instance: run.reporting_instance.clone(),
        },
    };

    let http_server = http_server::run(addr);
    let controller = pki::run_controller(client, config, metrics);

    tokio::select! {
        result = http_server => result?,
        () = controller => {},
    }

    Ok(())
}

fn crd_generate(_cli: &CliArgs, _crd: &CrdArgs, generate: &CrdGenerateArgs) -> Result<(), BoxError> {
    let crd = pki::generate_custom_resource_definition();

    let content = match generate.format {
        CrdGenerateArgsFormat::Json => serde_json::to_string_pretty(&crd)?,
        CrdGenerateArgsFormat::Yaml => serde_yaml::to_string(&crd)?,
    };

    let file_name = match generate.format {
        CrdGenerateArgsFormat::Json => "pki.json",
        CrdGenerateArgsFormat::Yaml => "pki.yaml",
    };

    write_output(generate.output.as_deref(), file_name, &content)
}

fn markdown_generate(
    _cli: &CliArgs,
    _markdown: &MarkdownArgs,
    generate: &MarkdownGenerateArgs,
) -> Result<(), BoxError> {
    let content = clap_markdown::help_markdown::<CliArgs>();

    write_output(generate.output.as_deref(), "cli.md", &content)
}

fn write_output(output: Option<&Path>, file_name: &str, content: &str) -> Result<(), BoxError> {
    if let Some(output) = output {
        File::create(output.join(file_name))?.write_all(content.as_bytes())?;
    } else {
        print!("{content}");
    }

    Ok(())
}
