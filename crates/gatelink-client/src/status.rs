//! Consumer-side view of a gateway connection.
//!
//! [`GatewayStatus`] folds [`ClientEvent`]s into the state a UI or CLI shows:
//! link status, the last user-visible error, the hello snapshot and a short
//! log of recent events.

use std::collections::VecDeque;

use serde::Serialize;
use serde_json::Value;

use crate::client::ClientEvent;
use crate::protocol::HelloOk;

/// Number of events kept in [`GatewayStatus::event_log`].
pub const EVENT_LOG_LIMIT: usize = 250;

/// Link status as shown to a user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// One logged event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventLogEntry {
    pub ts_ms: i64,
    pub event: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayStatus {
    pub status: LinkStatus,
    pub last_error: Option<String>,
    #[serde(skip)]
    pub hello: Option<HelloOk>,
    pub presence: Vec<Value>,
    pub health: Option<Value>,
    /// Newest first.
    pub event_log: VecDeque<EventLogEntry>,
}

impl GatewayStatus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Call when a connection attempt begins.
    pub fn mark_connecting(&mut self) {
        self.status = LinkStatus::Connecting;
    }

    /// Fold one client event into the view.
    pub fn apply(&mut self, event: &ClientEvent) {
        match event {
            ClientEvent::Hello(hello) => self.apply_hello(hello),
            ClientEvent::Closed(info) => {
                self.status = LinkStatus::Disconnected;
                if let Some(error) = info.visible_error() {
                    self.last_error = Some(error);
                }
            }
            ClientEvent::Reconnecting { .. } => self.status = LinkStatus::Connecting,
            ClientEvent::Gap(gap) => {
                self.last_error = Some(format!("{gap}; refresh recommended"));
            }
            ClientEvent::Event(frame) => {
                self.event_log.push_front(EventLogEntry {
                    ts_ms: chrono::Utc::now().timestamp_millis(),
                    event: frame.event.clone(),
                    payload: frame.payload.clone(),
                });
                self.event_log.truncate(EVENT_LOG_LIMIT);

                if frame.event == "presence" {
                    if let Some(entries) = frame
                        .payload
                        .as_ref()
                        .and_then(|p| p.get("presence"))
                        .and_then(Value::as_array)
                    {
                        self.presence = entries.clone();
                    }
                }
            }
        }
    }

    fn apply_hello(&mut self, hello: &HelloOk) {
        if let Some(snapshot) = &hello.snapshot {
            if let Some(presence) = snapshot.get("presence").and_then(Value::as_array) {
                self.presence = presence.clone();
            }
            if let Some(health) = snapshot.get("health") {
                self.health = Some(health.clone());
            }
        }
        self.hello = Some(hello.clone());
        self.status = LinkStatus::Connected;
        self.last_error = None;
    }

    /// Forget everything.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
