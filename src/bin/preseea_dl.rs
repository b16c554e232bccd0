use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::Parser;
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use preseea_downloader::app::{App, CrawlOptions};
use preseea_downloader::config::{ConfigLoader, CrawlOverrides};
use preseea_downloader::corpus::PreseeaHttpClient;
use preseea_downloader::error::PreseeaError;
use preseea_downloader::output::{ConsoleOutput, JsonOutput, OutputMode};
use preseea_downloader::store::Store;

#[derive(Parser)]
#[command(name = "preseea-dl")]
#[command(about = "Download PRESEEA corpus audio and transcripts and build a metadata.csv dataset")]
#[command(version, author)]
struct Cli {
    /// Country to filter on (default matches every country)
    #[arg(long)]
    country: Option<String>,

    /// Number of parallel download workers
    #[arg(long)]
    concurrent: Option<usize>,

    /// JSON config file (default: preseea.json when present)
    #[arg(long)]
    config: Option<String>,

    /// Directory that receives preseea/, data/ and metadata.csv
    #[arg(long)]
    root: Option<Utf8PathBuf>,

    /// Stop after this many result pages
    #[arg(long)]
    max_pages: Option<u32>,

    #[arg(long)]
    skip_manifest: bool,

    /// Print only a JSON summary
    #[arg(long)]
    non_interactive: bool,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<PreseeaError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &PreseeaError) -> u8 {
    match error {
        PreseeaError::ConfigRead(_)
        | PreseeaError::ConfigParse(_)
        | PreseeaError::InvalidConfig(_) => 2,
        PreseeaError::PageHttp(_)
        | PreseeaError::PageStatus { .. }
        | PreseeaError::DownloadHttp { .. }
        | PreseeaError::DownloadStatus { .. } => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };

    let overrides = CrawlOverrides {
        country: cli.country,
        concurrent: cli.concurrent,
        max_pages: cli.max_pages,
    };
    let config = ConfigLoader::resolve(cli.config.as_deref(), overrides)?;

    let store = match cli.root {
        Some(root) => Store::new(root, &config),
        None => Store::current_dir(&config)?,
    };
    let client = PreseeaHttpClient::new(&config)?;
    let app = App::new(store, client, &config);
    let options = CrawlOptions {
        skip_manifest: cli.skip_manifest,
    };

    match output_mode {
        OutputMode::NonInteractive => {
            let summary = app.crawl(options, &JsonOutput)?;
            JsonOutput::print_summary(&summary).into_diagnostic()?;
        }
        OutputMode::Interactive => {
            let summary = app.crawl(options, &ConsoleOutput)?;
            ConsoleOutput::print_summary(&summary).into_diagnostic()?;
        }
    }
    Ok(())
}
