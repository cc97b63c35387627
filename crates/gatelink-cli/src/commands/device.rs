//! Device identity commands.

use clap::Args;
use console::style;
use gatelink_identity::{DeviceIdentityProvider, FileIdentityStore};

use crate::CliContext;

/// Device command arguments.
#[derive(Args)]
pub struct DeviceArgs {
    #[command(subcommand)]
    pub command: DeviceCommand,
}

#[derive(clap::Subcommand)]
pub enum DeviceCommand {
    /// Show the device identity and stored tokens
    Show,

    /// Forget the stored device token for a role
    ForgetToken {
        /// Role to clear (defaults to the configured role)
        #[arg(long)]
        role: Option<String>,
    },
}

/// Run the device command.
pub async fn run(ctx: &CliContext, args: DeviceArgs) -> anyhow::Result<()> {
    let store = FileIdentityStore::from_default_dir()
        .map_err(|e| anyhow::anyhow!("Failed to open identity store: {}", e))?;
    let identity = store.load_or_create().await?;

    match args.command {
        DeviceCommand::Show => {
            println!("{} {}", style("device id ").dim(), identity.device_id);
            println!("{} {}", style("public key").dim(), identity.public_key);
            println!("{} {}", style("directory ").dim(), store.dir().display());

            let tokens = store.list_tokens(&identity.device_id).await?;
            if tokens.is_empty() {
                println!("{}", style("no stored tokens").dim());
            }
            for token in tokens {
                let updated = chrono::DateTime::from_timestamp_millis(token.updated_at_ms)
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| token.updated_at_ms.to_string());
                println!(
                    "  {} [{}] updated {}",
                    style(&token.role).bold(),
                    token.scopes.join(", "),
                    updated
                );
            }
        }

        DeviceCommand::ForgetToken { role } => {
            let role = role.unwrap_or_else(|| ctx.config.client.role.clone());
            store.clear_token(&identity.device_id, &role).await?;
            println!("Cleared stored token for role '{}'.", role);
        }
    }

    Ok(())
}
