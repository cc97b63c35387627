//! Terminal rendering utilities.
//!
//! Status lines go to stderr so stdout stays clean for payloads.

use console::style;
use gatelink_client::{ClientEvent, EventFrame, GatewayStatus, HelloOk, LinkStatus};
use serde_json::Value;

/// Longest payload preview printed for an event.
const PREVIEW_LIMIT: usize = 160;

/// Render a link status indicator.
pub fn render_status(status: LinkStatus) {
    let indicator = match status {
        LinkStatus::Connecting => style("~ connecting").yellow(),
        LinkStatus::Connected => style("* connected").green(),
        LinkStatus::Disconnected => style("x disconnected").red(),
    };
    eprintln!("{}", indicator);
}

/// Summarize a successful handshake.
pub fn render_hello(hello: &HelloOk) {
    let (methods, events) = hello
        .features
        .as_ref()
        .map(|f| (f.methods.len(), f.events.len()))
        .unwrap_or_default();
    eprintln!(
        "{} protocol {} | {} methods | {} events",
        style("hello").bold().cyan(),
        style(hello.protocol).cyan(),
        style(methods).cyan(),
        style(events).cyan(),
    );
    if let Some(role) = hello.auth.as_ref().and_then(|a| a.role.as_deref()) {
        eprintln!("  {} {}", style("role").dim(), role);
    }
    if hello.device_token().is_some() {
        eprintln!("  {}", style("device token issued").dim());
    }
}

/// Print one server event.
pub fn render_event(event: &EventFrame) {
    let seq = event
        .seq
        .map(|s| format!("#{s}"))
        .unwrap_or_else(|| "-".to_string());
    let preview = event
        .payload
        .as_ref()
        .map(preview_json)
        .unwrap_or_default();
    println!(
        "{} {} {}",
        style(seq).dim(),
        style(&event.event).bold(),
        preview
    );
}

/// Render a client event, updating `status` first.
pub fn render_client_event(status: &mut GatewayStatus, event: &ClientEvent) {
    let before = status.status;
    status.apply(event);

    match event {
        ClientEvent::Hello(hello) => render_hello(hello),
        ClientEvent::Event(frame) => render_event(frame),
        ClientEvent::Gap(_) | ClientEvent::Closed(_) => {
            if let Some(error) = &status.last_error {
                eprintln!("{} {}", style("!").red().bold(), error);
            }
        }
        ClientEvent::Reconnecting { delay } => {
            eprintln!(
                "{}",
                style(format!("reconnecting in {}ms", delay.as_millis())).dim()
            );
        }
    }

    if status.status != before {
        render_status(status.status);
    }
}

/// Compact single-line JSON, truncated on a char boundary.
pub fn preview_json(value: &Value) -> String {
    let text = value.to_string();
    if text.chars().count() <= PREVIEW_LIMIT {
        return text;
    }
    let truncated: String = text.chars().take(PREVIEW_LIMIT).collect();
    format!("{truncated}...")
}
