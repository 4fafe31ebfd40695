//! rollwrite CLI - Copy stdin into a self-rotating log file

use anyhow::{Context, Result};
use clap::Parser;
use rollwrite_writer::{spawn_capture, RollingWriter};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cli;

use cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    // Diagnostics go to stderr; stdout is never touched
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "rollwrite={level},rollwrite_core={level},rollwrite_writer={level}",
                    level = log_level
                )
                .into()
            }),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .without_time()
                .with_writer(std::io::stderr),
        )
        .init();

    if let Err(e) = run(&cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }

    // A stdin read still pending after a signal would keep the runtime alive
    std::process::exit(0)
}

async fn run(cli: &Cli) -> Result<()> {
    let config = cli.writer_config().context("Failed to load config")?;
    let writer = Arc::new(RollingWriter::new(config).context("Failed to open writer")?);
    let capture = spawn_capture(tokio::io::stdin(), Arc::clone(&writer));

    tokio::select! {
        result = capture => {
            let copied = result.context("Capture task failed")??;
            info!("Copied {} bytes from stdin", copied);
        }
        signal = shutdown_signal() => {
            info!("Received {}, shutting down...", signal?);
        }
    }

    // close() blocks for up to the close timeout
    let closer = Arc::clone(&writer);
    tokio::task::spawn_blocking(move || closer.close())
        .await
        .context("Close task failed")??;

    info!("Closed {}", writer.path().display());
    Ok(())
}

#[cfg(unix)]
async fn shutdown_signal() -> Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    tokio::select! {
        _ = sigterm.recv() => Ok("SIGTERM"),
        _ = sigint.recv() => Ok("SIGINT"),
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() -> Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    Ok("Ctrl-C")
}
