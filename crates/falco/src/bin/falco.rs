//! Falco daemon binary
//!
//! Subcommands:
//! - `falco run` (default) - start the deterrent, heartbeat and control surface
//! - `falco config` - print the effective configuration and where it came from

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use falco::{telemetry, FalcoDaemon};
use falcoconf::FalcoConfig;
use tracing::info;

#[derive(Parser)]
#[command(name = "falco")]
#[command(about = "Motion-triggered bird deterrent")]
#[command(version)]
struct Cli {
    /// Config file to use instead of ./falco.toml
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the daemon (default)
    Run,

    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (config, sources) = FalcoConfig::load_with_sources_from(cli.config.as_deref())
        .context("Failed to load configuration")?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Config => {
            for path in &sources.files {
                println!("# loaded {}", path.display());
            }
            for var in &sources.env_overrides {
                println!("# override {}", var);
            }
            print!("{}", config.to_toml());
            Ok(())
        }
        Commands::Run => {
            println!("Welcome to Falco");
            telemetry::init(&config.infra.telemetry.log_level)?;
            info!("falco {} starting", env!("CARGO_PKG_VERSION"));
            for path in &sources.files {
                info!("config: {}", path.display());
            }

            let daemon = FalcoDaemon::from_config(&config)?;
            daemon.run(shutdown_signal()).await
        }
    }
}

async fn shutdown_signal() {
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received SIGINT, shutting down...");
        }
        _ = async {
            #[cfg(unix)]
            {
                use tokio::signal::unix::{signal, SignalKind};
                match signal(SignalKind::terminate()) {
                    Ok(mut sigterm) => {
                        sigterm.recv().await;
                    }
                    Err(_) => std::future::pending::<()>().await,
                }
            }
            #[cfg(not(unix))]
            {
                std::future::pending::<()>().await;
            }
        } => {
            info!("Received SIGTERM, shutting down...");
        }
    }
}
