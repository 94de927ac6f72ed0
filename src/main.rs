//! Binary entrypoint for the gallery.
//!
//! Delegates all logic to the library crate; no local modules here.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use tokio_util::sync::CancellationToken;
use tracing::{Level, info};
use tracing_subscriber::EnvFilter;

use unsplashed_gallery::config::{Configuration, SourceConfig};
use unsplashed_gallery::tasks::preload::HttpPreloader;
use unsplashed_gallery::tasks::presenter::{self, OutputFormat};
use unsplashed_gallery::tasks::rotation::RotationController;
use unsplashed_gallery::tasks::source::ConfiguredSource;

#[derive(Debug, Parser)]
#[command(name = "gallery", version, about = "Rotating slideshow of random Unsplash photos")]
struct Args {
    /// Path to YAML config
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Override the rotation interval (e.g. "45s", "2m")
    #[arg(long, value_name = "DURATION", value_parser = humantime::parse_duration)]
    interval: Option<Duration>,

    /// How frames are rendered
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    output: OutputFormat,

    /// Increase log verbosity (repeatable)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbosity: u8) -> Result<()> {
    // map -v to log level
    let level = match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"))
        .add_directive(format!("unsplashed_gallery={level}").parse()?)
        .add_directive(format!("gallery={level}").parse()?);
    // stdout is reserved for JSON frames
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::warn!("ctrl-c handler failed: {err}");
            std::future::pending::<()>().await;
        }
    };
    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(err) => {
                tracing::warn!("failed to register SIGTERM handler: {err}");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();
    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let Args {
        config,
        interval,
        output,
        verbose,
    } = Args::parse();
    init_tracing(verbose)?;

    let mut cfg = Configuration::from_yaml_file(&config)
        .with_context(|| format!("failed to load configuration from {}", config.display()))?;
    if let Some(interval) = interval {
        cfg.rotation_interval = interval;
    }
    let cfg = cfg.validated().context("invalid configuration values")?;
    let source_kind = match &cfg.source {
        SourceConfig::Remote(_) => "remote",
        SourceConfig::Fixed(_) => "fixed",
    };
    info!(
        config = %config.display(),
        source = source_kind,
        interval = %humantime::format_duration(cfg.rotation_interval),
        "loaded configuration"
    );

    let source =
        ConfiguredSource::from_config(&cfg.source).context("failed to set up image source")?;
    let preloader = HttpPreloader::new(&cfg.preload).context("failed to set up preloader")?;
    let controller = RotationController::new(source, preloader, cfg.timing());

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            info!("shutdown requested");
            cancel.cancel();
        });
    }

    let presenter = tokio::spawn(presenter::run(
        controller.subscribe(),
        output,
        cancel.clone(),
    ));

    controller.start();
    cancel.cancelled().await;
    controller.stop();

    presenter.await.context("presenter task panicked")??;
    Ok(())
}
