//! Stream gateway events until interrupted.

use gatelink_client::GatewayStatus;
use tracing::info;

use crate::render;
use crate::CliContext;

/// Run the watch command.
pub async fn run(ctx: &CliContext) -> anyhow::Result<()> {
    let (client, mut events) = ctx.connect()?;
    let mut status = GatewayStatus::new();
    status.mark_connecting();
    render::render_status(status.status);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            result = &mut ctrl_c => {
                result?;
                info!("interrupted");
                break;
            }
            event = events.recv() => match event {
                Some(event) => render::render_client_event(&mut status, &event),
                None => break,
            },
        }
    }

    client.stop().await;
    Ok(())
}
