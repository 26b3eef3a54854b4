//! Headless location-ping agent.
//!
//! Usage: `beacon-agent [CONFIG_PATH]`
//!
//! Loads the TOML config (the default path is optional; an explicit path must
//! exist), starts the tracker against the file mode store and the HTTP
//! location sink, and runs until Ctrl-C.

use anyhow::Context;
use beacon::BeaconConfig;
use beacon::sampler::{LocationSource, StaticLocationSource, UnavailableLocationSource};
use beacon::tracker::Tracker;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let (config, config_path) = load_config()?;
    let _log_guard = init_logging(&config);

    tracing::info!(config = %config_path.display(), "beacon-agent starting");

    let source: Arc<dyn LocationSource> = match config.sampler.fixed {
        Some(fixed) => Arc::new(StaticLocationSource::from(fixed)),
        None => {
            tracing::warn!("no location source configured; every sample will fail");
            Arc::new(UnavailableLocationSource)
        }
    };

    let tracker = Tracker::from_config(&config, source).context("cannot configure tracker")?;
    let handle = tracker.start();

    tokio::signal::ctrl_c()
        .await
        .context("cannot listen for Ctrl-C")?;
    tracing::info!("shutdown requested");

    handle.shutdown().await.map_err(|e| {
        tracing::error!(error = %e, "beacon-agent exited with error");
        anyhow::anyhow!("beacon-agent failed: {e}")
    })?;

    tracing::info!("beacon-agent shut down cleanly");
    Ok(())
}

fn load_config() -> anyhow::Result<(BeaconConfig, PathBuf)> {
    if let Some(arg) = std::env::args_os().nth(1) {
        let path = PathBuf::from(arg);
        let config = BeaconConfig::from_file(&path)
            .with_context(|| format!("cannot load config {}", path.display()))?;
        return Ok((config, path));
    }

    let path = BeaconConfig::default_config_path();
    if !path.exists() {
        return Ok((BeaconConfig::default(), path));
    }
    let config = BeaconConfig::from_file(&path)
        .with_context(|| format!("cannot load config {}", path.display()))?;
    Ok((config, path))
}

/// Log to stderr, and to a daily-rolling file unless `logging.to_file` is off.
fn init_logging(config: &BeaconConfig) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let (file_layer, guard) = match config.logging.effective_file_dir() {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "beacon-agent.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();
    guard
}
