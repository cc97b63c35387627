//! Gatelink command-line interface.

pub mod commands;
pub mod render;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use gatelink_client::{ClientEvent, ClientOptions, GatewayClient, WsConnector};
use gatelink_core::{Config, SecretString};
use gatelink_identity::FileIdentityStore;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::debug;

/// Gatelink - gateway protocol client
#[derive(Parser)]
#[command(name = "gatelink")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Flags accepted by every command.
#[derive(Args, Debug, Default)]
pub struct GlobalArgs {
    /// Increase logging verbosity
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to config file
    #[arg(short, long, env = "GATELINK_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Gateway URL (overrides config)
    #[arg(long, global = true)]
    pub url: Option<String>,

    /// Shared gateway token (overrides config)
    #[arg(long, global = true)]
    pub token: Option<String>,

    /// Gateway password (overrides config)
    #[arg(long, global = true)]
    pub password: Option<String>,

    /// Do not sign the handshake with the device key
    #[arg(long, global = true)]
    pub no_device_auth: bool,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Connect and stream gateway events
    Watch,

    /// Call a gateway method
    Call(commands::call::CallArgs),

    /// Inspect the device identity
    Device(commands::device::DeviceArgs),

    /// Configuration management
    Config(commands::config::ConfigArgs),

    /// Show version information
    Version,
}

/// Resolved configuration plus command-line overrides.
pub struct CliContext {
    pub config: Config,
}

impl CliContext {
    /// Load the configuration and apply flag overrides.
    pub fn from_args(args: &GlobalArgs) -> anyhow::Result<Self> {
        let mut config = Config::resolve(args.config.as_deref())?;
        if let Some(url) = &args.url {
            config.gateway.url = url.clone();
        }
        if let Some(token) = &args.token {
            config.gateway.token = SecretString::non_empty(token.as_str());
        }
        if let Some(password) = &args.password {
            config.gateway.password = SecretString::non_empty(password.as_str());
        }
        if args.no_device_auth {
            config.client.device_auth = false;
        }
        Ok(Self { config })
    }

    /// Client options for the resolved configuration.
    pub fn client_options(&self) -> ClientOptions {
        ClientOptions::from_config(&self.config)
    }

    /// Validate the configuration, build a client and start it.
    pub fn connect(&self) -> anyhow::Result<(GatewayClient, UnboundedReceiver<ClientEvent>)> {
        self.config.validate()?;

        let (client, events) =
            GatewayClient::new(self.client_options(), Arc::new(WsConnector::new()));
        let client = if self.config.client.device_auth {
            let store = FileIdentityStore::from_default_dir()?;
            debug!(dir = %store.dir().display(), "using device identity");
            client.with_identity(Arc::new(store))
        } else {
            client
        };
        client.start()?;
        Ok((client, events))
    }
}

/// Run the CLI with the given arguments.
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let Cli { global, command } = cli;
    match command {
        Commands::Watch => commands::watch::run(&CliContext::from_args(&global)?).await,
        Commands::Call(args) => commands::call::run(&CliContext::from_args(&global)?, args).await,
        Commands::Device(args) => {
            commands::device::run(&CliContext::from_args(&global)?, args).await
        }
        Commands::Config(args) => commands::config::run(args, global.config.as_deref()).await,
        Commands::Version => {
            println!("gatelink {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_parse_version() {
        let cli = Cli::try_parse_from(["gatelink", "version"]).unwrap();
        assert!(matches!(cli.command, Commands::Version));
    }

    #[test]
    fn test_parse_watch_with_globals() {
        let cli = Cli::try_parse_from([
            "gatelink",
            "watch",
            "-vv",
            "--url",
            "wss://gw.example:443",
            "--token",
            "tok",
            "--no-device-auth",
        ])
        .unwrap();
        assert!(matches!(cli.command, Commands::Watch));
        assert_eq!(cli.global.verbose, 2);
        assert_eq!(cli.global.url.as_deref(), Some("wss://gw.example:443"));
        assert_eq!(cli.global.token.as_deref(), Some("tok"));
        assert!(cli.global.no_device_auth);
    }

    #[test]
    fn test_parse_call() {
        let cli = Cli::try_parse_from([
            "gatelink",
            "call",
            "models.list",
            "--params",
            "{\"limit\": 5}",
            "--timeout",
            "10",
        ])
        .unwrap();
        match cli.command {
            Commands::Call(args) => {
                assert_eq!(args.method, "models.list");
                assert_eq!(args.params.as_deref(), Some("{\"limit\": 5}"));
                assert_eq!(args.timeout, 10);
            }
            _ => panic!("Expected Call command"),
        }
    }

    #[test]
    fn test_parse_call_defaults() {
        let cli = Cli::try_parse_from(["gatelink", "call", "health"]).unwrap();
        match cli.command {
            Commands::Call(args) => {
                assert!(args.params.is_none());
                assert_eq!(args.timeout, 30);
            }
            _ => panic!("Expected Call command"),
        }
    }

    #[test]
    fn test_parse_device_forget_token() {
        let cli = Cli::try_parse_from(["gatelink", "device", "forget-token", "--role", "node"])
            .unwrap();
        match cli.command {
            Commands::Device(args) => match args.command {
                commands::device::DeviceCommand::ForgetToken { role } => {
                    assert_eq!(role.as_deref(), Some("node"));
                }
                _ => panic!("Expected ForgetToken"),
            },
            _ => panic!("Expected Device command"),
        }
    }

    #[test]
    fn test_parse_config_init_force() {
        let cli = Cli::try_parse_from(["gatelink", "config", "init", "--force"]).unwrap();
        match cli.command {
            Commands::Config(args) => {
                assert!(matches!(
                    args.command,
                    commands::config::ConfigCommand::Init { force: true }
                ));
            }
            _ => panic!("Expected Config command"),
        }
    }

    #[test]
    fn test_context_applies_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gatelink.json5");
        std::fs::write(&path, "{ gateway: { url: 'ws://from-file:1', token: 'file-token' } }")
            .unwrap();

        let cli = Cli::try_parse_from([
            "gatelink",
            "watch",
            "--config",
            path.to_str().unwrap(),
            "--url",
            "ws://flag:2",
            "--password",
            "pw",
            "--no-device-auth",
        ])
        .unwrap();
        let ctx = CliContext::from_args(&cli.global).unwrap();
        assert_eq!(ctx.config.gateway.url, "ws://flag:2");
        assert_eq!(
            ctx.config.gateway.password.as_ref().map(|p| p.expose_secret()),
            Some("pw")
        );
        assert!(!ctx.config.client.device_auth);

        let options = ctx.client_options();
        assert_eq!(options.url, "ws://flag:2");
        assert!(!options.device_auth);
    }
}
