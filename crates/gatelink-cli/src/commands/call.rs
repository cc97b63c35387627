//! One-shot method call.

use std::time::Duration;

use anyhow::Context;
use clap::Args;
use gatelink_client::{ClientEvent, GatewayClient};
use serde_json::Value;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, warn};

use crate::CliContext;

/// Call command arguments.
#[derive(Args)]
pub struct CallArgs {
    /// Method name, e.g. `models.list`
    pub method: String,

    /// Request params as a JSON object
    #[arg(long)]
    pub params: Option<String>,

    /// Seconds to wait for the connection and the response
    #[arg(long, default_value_t = 30)]
    pub timeout: u64,
}

/// Run the call command.
pub async fn run(ctx: &CliContext, args: CallArgs) -> anyhow::Result<()> {
    let params = parse_params(args.params.as_deref())?;
    let (client, mut events) = ctx.connect()?;

    let outcome = tokio::time::timeout(
        Duration::from_secs(args.timeout),
        call_after_hello(&client, &mut events, &args.method, params),
    )
    .await;
    client.stop().await;

    let payload = outcome
        .map_err(|_| anyhow::anyhow!("timed out after {}s", args.timeout))??;
    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}

async fn call_after_hello(
    client: &GatewayClient,
    events: &mut UnboundedReceiver<ClientEvent>,
    method: &str,
    params: Option<Value>,
) -> anyhow::Result<Value> {
    while let Some(event) = events.recv().await {
        match event {
            ClientEvent::Hello(hello) => {
                debug!(protocol = hello.protocol, "connected");
                return client
                    .call(method, params)
                    .await
                    .with_context(|| format!("{method} failed"));
            }
            ClientEvent::Closed(info) => {
                if let Some(error) = info.visible_error() {
                    warn!("{error}");
                }
            }
            _ => {}
        }
    }
    anyhow::bail!("gateway client stopped before connecting")
}

/// Parse `--params`; it must be a JSON object when given.
pub fn parse_params(raw: Option<&str>) -> anyhow::Result<Option<Value>> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    let value: Value = serde_json::from_str(raw).context("--params is not valid JSON")?;
    if !value.is_object() {
        anyhow::bail!("--params must be a JSON object");
    }
    Ok(Some(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_params() {
        assert_eq!(parse_params(None).unwrap(), None);
        assert_eq!(
            parse_params(Some("{\"limit\": 5}")).unwrap(),
            Some(json!({"limit": 5}))
        );
        assert!(parse_params(Some("[1, 2]")).is_err());
        assert!(parse_params(Some("{nope")).is_err());
    }
}
