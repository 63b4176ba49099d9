//! CLI entry point for the SICAR downloader.

use std::io::{self, IsTerminal};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result, bail};
use clap::Parser;
use sicar_core::captcha::build_solver;
use sicar_core::config::resolve_default_config_path;
use sicar_core::{BatchDownloader, PolygonKind, Sicar, SicarConfig};
use tracing::{debug, info};

mod cli;
mod progress;

use cli::{Args, Command};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(filter)
        .init();

    debug!(?args, "CLI arguments parsed");

    let config = load_config(&args)?;

    let interrupted = Arc::new(AtomicBool::new(false));
    let interrupted_signal = Arc::clone(&interrupted);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupted_signal.store(true, Ordering::SeqCst);
        }
    });

    match &args.command {
        Command::State {
            region,
            polygon,
            output,
        } => {
            let mut sicar = connect(&config, &interrupted).await?;
            let path = sicar
                .download_region_polygon_to(*region, *polygon, output)
                .await?;
            println!("{}", path.display());
        }
        Command::Country {
            polygon, output, ..
        } => run_country(config, *polygon, output, &args, interrupted).await?,
        Command::Car { car_number, output } => {
            let mut sicar = connect(&config, &interrupted).await?;
            let path = sicar.download_property_to(car_number, output).await?;
            println!("{}", path.display());
        }
        Command::Search { car_number } => {
            let sicar = connect(&config, &interrupted).await?;
            let record = sicar.search_property(car_number).await?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        Command::ReleaseDates { json } => {
            let sicar = connect(&config, &interrupted).await?;
            let dates = sicar.release_dates().await?;
            if *json {
                println!("{}", serde_json::to_string_pretty(&dates)?);
            } else {
                for (region, date) in &dates {
                    println!("{region}  {date}");
                }
            }
        }
    }

    Ok(())
}

/// Loads `--config`, else the default config file when present, else
/// built-in defaults; then applies command-line overrides.
fn load_config(args: &Args) -> Result<SicarConfig> {
    let mut config = if let Some(path) = &args.config {
        SicarConfig::load(path).with_context(|| format!("loading {}", path.display()))?
    } else {
        match resolve_default_config_path().filter(|path| path.is_file()) {
            Some(path) => {
                debug!(path = %path.display(), "using default config file");
                SicarConfig::load(&path).with_context(|| format!("loading {}", path.display()))?
            }
            None => SicarConfig::default(),
        }
    };
    args.apply_overrides(&mut config);
    config.validate()?;
    Ok(config)
}

async fn connect(config: &SicarConfig, interrupted: &Arc<AtomicBool>) -> Result<Sicar> {
    let sicar = Sicar::connect(config, build_solver(&config.solver))
        .await?
        .with_interrupt(Arc::clone(interrupted));
    Ok(sicar)
}

async fn run_country(
    config: SicarConfig,
    polygon: PolygonKind,
    output: &Path,
    args: &Args,
    interrupted: Arc<AtomicBool>,
) -> Result<()> {
    let solver = build_solver(&config.solver);
    let batch = BatchDownloader::new(config, solver)?.with_interrupt(interrupted);

    let use_spinner = progress::should_use_spinner(
        io::stderr().is_terminal(),
        args.quiet,
        progress::is_dumb_terminal(),
    );
    let (progress_handle, progress_stop) =
        progress::spawn_progress_ui(use_spinner, batch.stats(), polygon.to_string());

    let report = batch.download_country(polygon, output).await;

    progress_stop.store(true, Ordering::SeqCst);
    if let Some(handle) = progress_handle {
        let _ = handle.await;
    }

    info!(
        succeeded = report.succeeded(),
        failed = report.failed(),
        "country download finished"
    );
    for entry in &report.targets {
        if let Ok(path) = &entry.result {
            println!("{}", path.display());
        }
    }

    if !report.is_success() {
        for (target, error) in report.failures() {
            eprintln!("{target}: {error}");
        }
        bail!(
            "{} of {} downloads failed",
            report.failed(),
            report.targets.len()
        );
    }
    Ok(())
}
