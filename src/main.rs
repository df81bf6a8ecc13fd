//! Script host CLI entry point.
//!
//! Runs the persistent sandboxed script host: scripts arrive as lines
//! on stdin, results are delivered asynchronously through the process
//! log, correlated by request id. The process stays resident after
//! stdin closes so the engine warm-up cost is paid once; SIGTERM or
//! Ctrl+C stops it.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use script_host_common::ConfigFile;
use script_host_service::ScriptHostService;

#[derive(Debug, Parser)]
#[command(name = "script-host", about = "Persistent sandboxed JavaScript execution host")]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(long, env = "SCRIPT_HOST_CONFIG")]
    config: Option<PathBuf>,

    /// Override the packaged-assets directory.
    #[arg(long, env = "SCRIPT_HOST_ASSETS_DIR")]
    assets_dir: Option<String>,

    /// Override the module cache directory.
    #[arg(long, env = "SCRIPT_HOST_CACHE_DIR")]
    cache_dir: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,script_host=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => ConfigFile::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => ConfigFile::default(),
    };

    if let Some(assets_dir) = cli.assets_dir {
        config.runtime.engine.assets_dir = assets_dir;
    }
    if let Some(cache_dir) = cli.cache_dir {
        config.runtime.engine.cache_dir = cache_dir;
    }

    info!(
        assets_dir = %config.runtime.engine.assets_dir,
        module_asset = %config.runtime.engine.module_asset,
        timeout_ms = config.runtime.execution.timeout_ms,
        "Starting script host"
    );

    let mut service = ScriptHostService::with_tracing_sink(config.runtime, config.service);
    service.start()?;

    info!("Reading scripts from stdin, one per line");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            () = shutdown_signal() => break,
            line = lines.next_line() => match line? {
                Some(line) => {
                    let source = line.trim();
                    if source.is_empty() {
                        continue;
                    }
                    match service.submit(source) {
                        Ok(id) => info!(request_id = %id, "Script submitted"),
                        Err(e) => warn!(error = %e, "Submission rejected"),
                    }
                }
                None => {
                    // The triggering caller is gone; stay resident
                    info!("stdin closed; staying resident until a stop signal");
                    shutdown_signal().await;
                    break;
                }
            }
        }
    }

    service.stop().await;
    info!("Shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
}
