use anyhow::Result;
use clap::Parser;
use tracing::debug;
use tracing_subscriber::filter::LevelFilter;

use histsync_cli::{
    cli::{Cli, Commands},
    commands, logging,
};
use histsync_config::HistsyncConfig;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = HistsyncConfig::load(cli.config.as_deref()).await?;

    // Command line wins over the config file
    let level = cli
        .requested_level()
        .or_else(|| config.logging.level.parse::<LevelFilter>().ok())
        .unwrap_or(LevelFilter::WARN);
    logging::init(level);
    debug!(%level, "logging initialized");

    match cli.command {
        Commands::Simulate(args) => commands::simulate::execute(config, args, cli.format).await?,
        Commands::Config(cmd) => commands::config::execute(config, cmd).await?,
    }

    Ok(())
}
