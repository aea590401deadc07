//! Command-line entry point for catalog-harvester.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Mutex;

use catalog_harvester::{Config, Harvester, run_with_shutdown};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Harvest a paginated media catalog into an object store and a git-tracked metadata tree
#[derive(Debug, Parser)]
#[command(name = "catalog-harvester", version, about)]
struct Args {
    /// Path to the JSON configuration file
    #[arg(long, default_value = "config.json")]
    config: PathBuf,

    /// Categories to harvest, overriding the configured list
    #[arg(long, num_args = 1..)]
    categories: Option<Vec<String>>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let mut config = match Config::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };
    if let Some(categories) = args.categories {
        config = config.with_categories(categories);
    }

    let log_file = match config.paths.log_dir.as_deref().map(open_log_file).transpose() {
        Ok(file) => file,
        Err(e) => {
            eprintln!("error: cannot create log file: {e}");
            return ExitCode::FAILURE;
        }
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(log_file.map(|(path, file)| {
            eprintln!("logging to {}", path.display());
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file))
        }))
        .init();

    tracing::info!(
        config = %args.config.display(),
        categories = ?config.categories,
        "starting catalog-harvester"
    );

    let harvester = match Harvester::new(config).await {
        Ok(harvester) => harvester,
        Err(e) => {
            tracing::error!(error = %e, "startup failed");
            return ExitCode::FAILURE;
        }
    };

    match run_with_shutdown(&harvester).await {
        Ok(summary) => {
            if summary.interrupted {
                tracing::warn!("harvest interrupted, progress saved");
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "harvest failed");
            ExitCode::FAILURE
        }
    }
}

/// `<log_dir>/harvest_<timestamp>.log`
fn open_log_file(log_dir: &Path) -> std::io::Result<(PathBuf, File)> {
    std::fs::create_dir_all(log_dir)?;
    let path = log_dir.join(format!(
        "harvest_{}.log",
        chrono::Local::now().format("%Y%m%d_%H%M%S")
    ));
    let file = File::create(&path)?;
    Ok((path, file))
}
