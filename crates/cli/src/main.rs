//! Latch CLI - authenticated API calls with a persisted session

mod commands;
mod config;
mod logging;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use commands::Commands;
use latch_core::FileStorage;
use std::path::PathBuf;
use tracing::{Level, debug, error};

#[derive(Parser)]
#[command(name = "latch")]
#[command(about = "Authenticated API calls with automatic token refresh")]
#[command(version)]
struct Cli {
    /// Set logging level
    #[arg(short = 'l', long, global = true, default_value = "warn")]
    log_level: LogLevel,

    /// Configuration file (defaults to <state dir>/latch.json when present)
    #[arg(short = 'c', long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding configuration and persisted state
    #[arg(short = 'd', long, global = true, env = "LATCH_STATE_DIR")]
    state_dir: Option<PathBuf>,

    /// Override the configured base URL
    #[arg(long, global = true)]
    base_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    logging::init_logging(cli.log_level.into())?;

    let config_dir = cli
        .state_dir
        .clone()
        .unwrap_or_else(FileStorage::default_dir);
    let mut config = config::load_config(
        cli.config.as_deref(),
        &config::default_config_path(&config_dir),
    )?;
    if let Some(base_url) = cli.base_url {
        config.base_url = base_url;
    }
    // --state-dir wins over the configured directory
    let state_dir = cli.state_dir.unwrap_or_else(|| config.state_dir());
    debug!(
        state_dir = %state_dir.display(),
        base_url = %config.base_url,
        "Loaded configuration"
    );

    if let Err(e) = cli.command.execute(config, state_dir).await {
        error!("Command failed: {e:#}");
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }

    Ok(())
}

#[derive(Clone, Debug, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for Level {
    fn from(log_level: LogLevel) -> Self {
        match log_level {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }
}
