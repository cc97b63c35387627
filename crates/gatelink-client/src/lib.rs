//! Gateway protocol engine for Gatelink.
//!
//! This crate provides:
//! - Request/response/event framing over a WebSocket
//! - The `connect` handshake with optional device signatures
//! - Request correlation with per-request completion
//! - Event sequence gap detection
//! - Automatic reconnect with exponential backoff
//!
//! ```no_run
//! use std::sync::Arc;
//! use gatelink_client::{ClientOptions, GatewayClient, WsConnector};
//!
//! # async fn demo() -> gatelink_client::Result<()> {
//! let options = ClientOptions::new("ws://127.0.0.1:18789").with_token("secret");
//! let (client, mut events) = GatewayClient::new(options, Arc::new(WsConnector::new()));
//! client.start()?;
//! while let Some(event) = events.recv().await {
//!     println!("{:?}", event);
//! }
//! # Ok(())
//! # }
//! ```

pub mod backoff;
pub mod client;
pub mod error;
pub mod frame;
pub mod handshake;
pub mod options;
pub mod pending;
pub mod protocol;
pub mod sequencer;
pub mod status;
pub mod transport;

pub use backoff::Backoff;
pub use client::{ClientEvent, CloseInfo, ConnectionState, GatewayClient};
pub use error::ClientError;
pub use frame::{ErrorShape, EventFrame, Frame, RequestFrame, ResponseFrame};
pub use handshake::{AuthCapability, DeviceAuthPayload, Negotiator, PayloadVersion};
pub use options::ClientOptions;
pub use pending::PendingRequest;
pub use protocol::{ConnectParams, HelloOk, PROTOCOL_VERSION};
pub use sequencer::{EventSequencer, SequenceGap};
pub use status::{GatewayStatus, LinkStatus};
pub use transport::{Connector, MemoryConnector, MemoryListener, ServerEnd, WsConnector};

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
