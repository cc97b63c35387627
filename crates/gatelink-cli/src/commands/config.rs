//! Configuration management commands.

use std::path::{Path, PathBuf};

use clap::Args;
use gatelink_core::config::Config;
use gatelink_core::paths;
use serde_json::Value;

/// Config command arguments.
#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(clap::Subcommand)]
pub enum ConfigCommand {
    /// Show the effective configuration (secrets redacted)
    Show,

    /// Write a default configuration file
    Init {
        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,
    },

    /// Show configuration file path
    Path,

    /// Validate configuration
    Validate,
}

/// Run the config command. `path` is the `--config` override, if any.
pub async fn run(args: ConfigArgs, path: Option<&Path>) -> anyhow::Result<()> {
    match args.command {
        ConfigCommand::Show => {
            let config = Config::resolve(path)?;
            println!("{}", serde_json::to_string_pretty(&redacted(&config)?)?);
        }

        ConfigCommand::Init { force } => {
            let path = init(path, force)?;
            println!("Created config file: {}", path.display());
        }

        ConfigCommand::Path => {
            println!("{}", config_path(path)?.display());
        }

        ConfigCommand::Validate => {
            let config = Config::resolve(path)?;
            match config.validate() {
                Ok(()) => println!("Configuration is valid"),
                Err(e) => anyhow::bail!("Configuration error: {}", e),
            }
        }
    }

    Ok(())
}

fn config_path(path: Option<&Path>) -> anyhow::Result<PathBuf> {
    match path {
        Some(p) => Ok(p.to_path_buf()),
        None => Ok(paths::config_file()?),
    }
}

/// Write defaults to `path` (or the default location) unless a file exists.
pub fn init(path: Option<&Path>, force: bool) -> anyhow::Result<PathBuf> {
    let path = config_path(path)?;
    if path.exists() && !force {
        anyhow::bail!(
            "Config file already exists: {}. Use --force to overwrite.",
            path.display()
        );
    }
    Config::default().save(&path)?;
    Ok(path)
}

/// Serialize `config` with token and password masked.
pub fn redacted(config: &Config) -> anyhow::Result<Value> {
    let mut json = serde_json::to_value(config)?;
    if let Some(gateway) = json.get_mut("gateway").and_then(Value::as_object_mut) {
        for key in ["token", "password"] {
            if let Some(value) = gateway.get_mut(key) {
                if !value.is_null() {
                    *value = Value::String("[REDACTED]".to_string());
                }
            }
        }
    }
    Ok(json)
}
