use anyhow::{Context, Result};
use histsync_config::{default_config_path, HistsyncConfig};
use std::path::{Path, PathBuf};

use crate::cli::ConfigCommands;

/// Execute config subcommand
pub async fn execute(config: HistsyncConfig, cmd: ConfigCommands) -> Result<()> {
    match cmd {
        ConfigCommands::Show => show(&config),
        ConfigCommands::Path => path(),
        ConfigCommands::Init { path, force } => init(path, force).await,
    }
}

/// Show the effective configuration
fn show(config: &HistsyncConfig) -> Result<()> {
    println!("{}", config.to_toml_string()?);
    Ok(())
}

fn path() -> Result<()> {
    let path = default_config_path().context("Could not determine config file path")?;
    println!("{}", path.display());
    Ok(())
}

/// Initialize a new config file
async fn init(path: Option<PathBuf>, force: bool) -> Result<()> {
    let config_path = path
        .or_else(default_config_path)
        .context("Could not determine config file path")?;

    if write_default(&config_path, force).await? {
        println!("Created config file at: {}", config_path.display());
    } else {
        println!("Config file already exists at: {}", config_path.display());
        println!("Use --force to overwrite");
    }
    Ok(())
}

/// Write the default configuration to `path`.
///
/// Returns `false` without touching the file when it exists and `force` is not set.
pub async fn write_default(path: &Path, force: bool) -> Result<bool> {
    if path.exists() && !force {
        return Ok(false);
    }
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let text = HistsyncConfig::default().to_toml_string()?;
    tokio::fs::write(path, text)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(true)
}
