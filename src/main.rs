//! Hivemind CLI entry point

use anyhow::{Context, Result};
use clap::Parser;

use hivemind::cli::{handle_init, handle_run, handle_validate, Cli, Commands};
use hivemind::infrastructure::config::ConfigLoader;
use hivemind::infrastructure::logging;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Init runs before any config exists.
    if let Commands::Init { force } = &cli.command {
        return handle_init(*force);
    }

    let config = match &cli.config {
        Some(path) => ConfigLoader::load_from_file(path)?,
        None => ConfigLoader::load().context("Failed to load configuration")?,
    };
    let _log_guard = logging::init(&config.logging).context("Failed to initialize logging")?;

    match cli.command {
        Commands::Init { .. } => unreachable!("init is handled before this point"),
        Commands::Run { agents, goal } => handle_run(agents, &goal, config).await,
        Commands::Validate { file } => handle_validate(&file, &config),
    }
}
