//! gantry: watch deployment locations for archives.
//!
//! Usage:
//!   gantry                                  # locations from config, or ./deployment/file
//!   gantry -l file:///opt/deploy -l https://repo.example.com/apps/
//!   gantry --config /etc/gantry.yaml --no-encode

mod error;

use crate::error::{ErrorKind, Result};
use clap::Parser;
use exn::ResultExt;
use gantry_config::Config;
use gantry_deploy::{ScannerManager, TracingListener};
use gantry_scanner::BackendHandle;
use gantry_scanner::backend::{FileBackend, HttpBackend};
use gantry_scanner::filter::SuffixFilter;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_LOG_FILTER: &str = "gantry=info,gantry_deploy=info,gantry_scanner=info,warn";

#[derive(Parser)]
#[command(name = "gantry", version)]
#[command(about = "Watch deployment locations for new, changed and removed archives", long_about = None)]
struct Cli {
    /// Configuration file (toml, yaml or json)
    #[arg(long, short, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Location to scan; repeat for several. Replaces configured locations
    #[arg(long = "location", short = 'l', value_name = "URI")]
    locations: Vec<String>,

    /// Treat locations as already URL-encoded
    #[arg(long)]
    no_encode: bool,

    /// Directory holding the default deployment location
    #[arg(long, value_name = "PATH")]
    work_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::FAILURE
        },
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = Config::load(cli.config.as_deref()).or_raise(|| ErrorKind::Config)?;
    if !cli.locations.is_empty() {
        config.locations = cli.locations;
    }
    if cli.no_encode {
        config.encode_locations = false;
    }
    if let Some(work_dir) = cli.work_dir {
        config.work_dir = Some(work_dir);
    }
    tracing::debug!(?config, "Loaded configuration");

    let manager = ScannerManager::new(Arc::new(TracingListener))
        .with_filter(Arc::new(SuffixFilter::new(&config.archive_suffix)))
        .with_work_dir(config.work_dir());
    manager
        .start(&config.locations, backends(&config)?, config.encode_locations)
        .await
        .or_raise(|| ErrorKind::Start)?;

    tokio::select! {
        () = manager.wait_first_pass_settled() => {
            tracing::info!(locations = manager.worker_count(), "Initial scan complete");
            shutdown_signal().await;
        },
        () = shutdown_signal() => {},
    }
    tracing::info!("Shutting down");
    manager.stop().await;
    Ok(())
}

/// File first, then HTTP, with intervals and timeout from the configuration.
fn backends(config: &Config) -> Result<Vec<BackendHandle>> {
    let file = FileBackend::default().with_interval(config.file_interval());
    let http = HttpBackend::with_timeout("http", config.http_timeout())
        .or_raise(|| ErrorKind::Backend)?
        .with_interval(config.http_interval());
    Ok(vec![Arc::new(file), Arc::new(http)])
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "Could not listen for Ctrl-C; stopping");
    }
}
