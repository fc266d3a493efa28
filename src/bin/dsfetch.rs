use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use dsfetch::error::DatasetError;
use dsfetch::output::{
    DownloadItem, DownloadResult, JsonOutput, ListResult, RemoveResult, StderrProgress,
    TextOutput,
};
use dsfetch::provider::Provider;
use dsfetch::settings::Settings;
use dsfetch::version::LATEST;

#[derive(Parser)]
#[command(name = "dsfetch")]
#[command(about = "Fetch named, versioned datasets into a local cache")]
#[command(version)]
struct Cli {
    /// Settings file (defaults to $DSFETCH_CONFIG or ~/.dsfetch/config.yml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Named provider from the settings file
    #[arg(long, global = true)]
    provider: Option<String>,

    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "List datasets and their versions")]
    List(ListArgs),
    #[command(about = "Download datasets (name or name:version)")]
    Download(DownloadArgs),
    #[command(about = "Remove a version from the local cache")]
    Remove(RemoveArgs),
}

#[derive(Args)]
struct ListArgs {
    /// Only list what the local cache holds
    #[arg(long)]
    local: bool,
}

#[derive(Args)]
struct DownloadArgs {
    #[arg(required = true)]
    datasets: Vec<String>,

    #[arg(long)]
    force: bool,
}

#[derive(Args)]
struct RemoveArgs {
    dataset: String,

    /// Keep the dataset folder even when no version is left
    #[arg(long)]
    keep_dataset: bool,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<DatasetError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &DatasetError) -> u8 {
    if error.is_dataset_not_found() || error.is_version_not_found() {
        2
    } else if error.is_transport() {
        3
    } else {
        1
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = match &cli.config {
        Some(path) => Settings::read(path)?,
        None => Settings::load_default()?,
    }
    .with_current(cli.provider.clone());

    match cli.command {
        Commands::List(args) => run_list(&settings, args, cli.json),
        Commands::Download(args) => run_download(&settings, args, cli.json),
        Commands::Remove(args) => run_remove(&settings, args, cli.json),
    }
}

fn run_list(settings: &Settings, args: ListArgs, json: bool) -> miette::Result<()> {
    let provider = settings.make_provider()?;
    let result = ListResult::collect(&provider, args.local)?;
    if json {
        JsonOutput::print_list(&result).into_diagnostic()
    } else {
        TextOutput::print_list(&result).into_diagnostic()
    }
}

fn run_download(settings: &Settings, args: DownloadArgs, json: bool) -> miette::Result<()> {
    let mut items = Vec::with_capacity(args.datasets.len());
    for specifier in &args.datasets {
        let (name, requested) = split_specifier(specifier);
        let provider = with_progress(settings.provider_for_dataset(name)?, json);
        let (path, version) = provider.get_folder(name, requested, args.force)?;
        items.push(DownloadItem {
            name: name.to_string(),
            requested: requested.to_string(),
            version,
            path: path.to_string(),
        });
    }
    let result = DownloadResult { items };
    if json {
        JsonOutput::print_download(&result).into_diagnostic()
    } else {
        TextOutput::print_download(&result).into_diagnostic()
    }
}

fn run_remove(settings: &Settings, args: RemoveArgs, json: bool) -> miette::Result<()> {
    let (name, version) = args.dataset.split_once(':').ok_or_else(|| {
        miette::Report::msg(format!(
            "remove needs an exact version, e.g. {}:1.0.0",
            args.dataset
        ))
    })?;
    let provider = settings.make_provider()?;
    provider.delete_version(name, version, args.keep_dataset)?;
    let result = RemoveResult {
        name: name.to_string(),
        version: version.to_string(),
        kept_dataset: args.keep_dataset,
    };
    if json {
        JsonOutput::print_remove(&result).into_diagnostic()
    } else {
        TextOutput::print_remove(&result).into_diagnostic()
    }
}

fn with_progress(provider: Provider, json: bool) -> Provider {
    if json {
        provider.with_progress(JsonOutput)
    } else {
        provider.with_progress(StderrProgress)
    }
}

fn split_specifier(specifier: &str) -> (&str, &str) {
    match specifier.split_once(':') {
        Some((name, version)) if !version.is_empty() => (name, version),
        Some((name, _)) => (name, LATEST),
        None => (specifier, LATEST),
    }
}
