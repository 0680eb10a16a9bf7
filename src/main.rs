//! iapgo CLI - local tunnel broker for Google Cloud IAP
//!
//! Opens an IAP tunnel to an instance, optionally tunnels SSH through it to a
//! host the instance can reach, and optionally runs a command against the
//! resulting local port.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ArgAction, CommandFactory, Parser};
use iapgo_lib::{
    load_config, Cause, GcloudAccountResolver, Lifecycle, Orchestrator, DEFAULT_CONFIG_FILE,
    DEFAULT_CONFIG_SECTION, EXAMPLE_CONFIG,
};
use tracing::{debug, error, info};
use tracing_subscriber::prelude::*;

/// iapgo - IAP tunnel with optional nested SSH tunnel
#[derive(Parser, Debug)]
#[command(name = "iapgo")]
#[command(about = "Tunnel to a Google Cloud instance through IAP, optionally nesting SSH")]
#[command(version = env!("GIT_TAG"))]
#[command(long_version = concat!(env!("GIT_TAG"), "\nCommit: ", env!("GIT_HASH"), "\nBuilt: ", env!("BUILD_TIME")))]
#[command(disable_help_flag = true)]
struct Cli {
    /// Print usage with an example configuration file
    #[arg(short, long, action = ArgAction::SetTrue)]
    help: bool,

    /// Configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    file: PathBuf,

    /// Section of the configuration file to use
    #[arg(short, long, default_value = DEFAULT_CONFIG_SECTION)]
    config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.help {
        print_usage()?;
        return Ok(());
    }

    let log_level = if cli.verbose { "debug" } else { "info" };
    init_logging(log_level)?;

    let cause = run(cli).await?;
    if cause.is_failure() {
        std::process::exit(1);
    }

    Ok(())
}

async fn run(cli: Cli) -> Result<Cause> {
    let span = tracing::info_span!("iapgo", section = %cli.config);

    let config = load_config(&cli.file, &cli.config, &GcloudAccountResolver::new())
        .await
        .with_context(|| {
            format!(
                "Failed to load section {} from {}",
                cli.config,
                cli.file.display()
            )
        })?;
    debug!(parent: &span, ?config, "loaded configuration");

    let lifecycle = Lifecycle::new();
    tokio::spawn(watch_signals(lifecycle.clone()));

    let tunnel = Orchestrator::new(config, lifecycle)
        .with_span(span.clone())
        .start()
        .await
        .context("Failed to start tunnel")?;

    let cause = tunnel.run().await;
    info!(parent: &span, cause = %cause, "iapgo stopped");

    Ok(cause)
}

fn print_usage() -> Result<()> {
    Cli::command()
        .print_help()
        .context("Failed to print usage")?;
    println!("\nExample configuration file:\n{}", EXAMPLE_CONFIG);
    Ok(())
}

/// Cancel the lifecycle on Control-C or SIGTERM.
async fn watch_signals(lifecycle: Lifecycle) {
    tokio::select! {
        _ = lifecycle.cancelled() => return,
        _ = shutdown_signal() => {}
    }

    info!("Shutdown signal received, stopping tunnel...");
    lifecycle.cancel(Cause::Interrupted);
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Error listening for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::warn!("Error listening for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

fn init_logging(log_level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(log_level))
        .context("Failed to initialize logging filter")?;

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    Ok(())
}
