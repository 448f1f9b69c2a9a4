//! clinreact CLI: the main entry point.
//!
//! Reads one question per line, answers it with the configured strategy and
//! prints the result. `exit`, `quit` or end of input ends the session.

use anyhow::Context;
use clap::Parser;
use clinreact_config::AppConfig;
use std::path::PathBuf;

mod console;
mod session;

#[derive(Parser)]
#[command(
    name = "clinreact",
    about = "clinreact: ask clinical questions answered from patient records",
    version
)]
struct Cli {
    /// Path to the configuration file (default: ~/.clinreact/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging (includes the rendered prompt of every step)
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    let config = match &cli.config {
        Some(path) => AppConfig::load_with_overrides(path),
        None => AppConfig::load(),
    }
    .context("Failed to load config")?;

    session::run(config).await
}
