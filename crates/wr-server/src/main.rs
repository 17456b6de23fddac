use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use wr_server::commands::{plan, serve, show_config};
use wr_server::{Cli, Commands, Config};

fn load_config(cli: &Cli) -> Result<Config> {
    let config = Config::load_from(cli.config.as_deref()).context("failed to load configuration")?;
    config.validate().context("invalid configuration")?;
    tracing::debug!(?config, "loaded configuration");
    Ok(config)
}

fn main() -> Result<()> {
    // A missing .env file is fine; the environment may be set up elsewhere.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    // Logs go to stderr so `plan` output stays machine-readable.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();

    let config = load_config(&cli)?;

    match &cli.command {
        None | Some(Commands::Serve) => {
            let runtime = tokio::runtime::Runtime::new().context("failed to start async runtime")?;
            runtime.block_on(serve::run(config))?;
        }
        Some(Commands::Plan { file }) => {
            plan::run(file, &config, &mut std::io::stdout(), &mut std::io::stderr())?;
        }
        Some(Commands::ShowConfig) => {
            show_config::run(&config, &mut std::io::stdout())?;
        }
    }

    Ok(())
}
