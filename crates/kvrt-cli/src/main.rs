#![deny(unsafe_code)]

//! kvrt CLI — runs the control-plane daemon or sends it one command.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use kvrt_config::AppConfig;
use kvrt_core::ipc::{IpcClient, render};

/// kvrt — a local control-plane daemon and client.
#[derive(Parser)]
#[command(name = "kvrt", version, about, long_about = None)]
struct Cli {
    /// Path to configuration file.
    #[arg(short, long, default_value = "kvrt.toml")]
    config: PathBuf,

    /// Control socket path, overriding the configuration file.
    #[arg(short, long)]
    socket: Option<PathBuf>,

    /// Increase log verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the daemon until it is told to shut down.
    Server,

    /// Send one command to a running daemon.
    Client {
        /// hello, status or shutdown (case-insensitive).
        command: String,
    },

    /// Validate and display configuration.
    Config {
        /// Show the resolved configuration.
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let loaded = load_config(&cli.config).await?;
    let found = loaded.is_some();
    let mut config = loaded.unwrap_or_default();
    if let Some(socket) = &cli.socket {
        config
            .set_socket_path(socket.to_string_lossy())
            .context("invalid --socket")?;
    }

    init_tracing(cli.verbose, &config.logging.level);
    if !found {
        info!(path = %cli.config.display(), "Config file not found, using defaults");
    }

    match cli.command {
        Commands::Server => cmd_server(config).await,
        Commands::Client { command } => cmd_client(&config, &command).await,
        Commands::Config { show } => cmd_config(&cli.config, &config, show),
    }
}

/// `RUST_LOG` wins, then `-v`, then the configured level.
fn init_tracing(verbose: u8, configured: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| match verbose {
        0 => EnvFilter::try_new(configured).unwrap_or_else(|_| EnvFilter::new("info")),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn cmd_server(config: AppConfig) -> Result<ExitCode> {
    info!("Starting kvrt daemon");

    let daemon = kvrt_core::Daemon::new(config);
    let report = daemon.run().await?;
    info!(
        accepted = report.accepted,
        cancelled = report.cancelled,
        "kvrt daemon exited"
    );
    Ok(ExitCode::SUCCESS)
}

async fn cmd_client(config: &AppConfig, word: &str) -> Result<ExitCode> {
    let client = IpcClient::from_config(config);
    let response = client.run(word).await?;

    println!("{}", render(&response));
    if response.status.is_ok() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

fn cmd_config(config_path: &Path, config: &AppConfig, show: bool) -> Result<ExitCode> {
    if show {
        let toml_str =
            toml::to_string_pretty(config).map_err(|e| anyhow::anyhow!("TOML error: {e}"))?;
        println!("{toml_str}");
    } else {
        println!("Configuration at '{}' is valid.", config_path.display());
    }
    Ok(ExitCode::SUCCESS)
}

async fn load_config(path: &Path) -> Result<Option<AppConfig>> {
    if path.exists() {
        let config = AppConfig::load(path)
            .await
            .with_context(|| format!("failed to load {}", path.display()))?;
        Ok(Some(config))
    } else {
        Ok(None)
    }
}
