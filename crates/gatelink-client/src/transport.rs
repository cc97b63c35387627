//! Transport abstraction.
//!
//! The client never touches a socket directly. A [`Connector`] opens a
//! [`TransportLink`]: an outbound queue of text and close requests, and an
//! inbound stream of messages that always ends with exactly one
//! [`TransportEvent::Closed`].

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

use crate::error::ClientError;
use crate::frame::Frame;
use crate::protocol::ABNORMAL_CLOSE_CODE;

/// Close code reported when a close frame carried no status.
const NO_STATUS_CLOSE_CODE: u16 = 1005;

/// How long a WebSocket open (TCP, TLS and upgrade) may take.
pub const DEFAULT_OPEN_TIMEOUT: Duration = Duration::from_secs(10);

/// Something the client wants the transport to do.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    /// Send a text message.
    Text(String),
    /// Close the connection with a status code.
    Close { code: u16, reason: String },
}

/// Something that happened on the transport.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// A text message arrived.
    Message(String),
    /// A socket-level error; a `Closed` event follows.
    Error(String),
    /// The connection is gone. Always the last event.
    Closed { code: u16, reason: String },
}

/// One open connection.
///
/// Dropping `outbound` closes the connection normally.
#[derive(Debug)]
pub struct TransportLink {
    pub outbound: mpsc::UnboundedSender<Outbound>,
    pub inbound: mpsc::UnboundedReceiver<TransportEvent>,
}

/// Opens transports to a gateway.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a connection to `url`.
    async fn connect(&self, url: &str) -> Result<TransportLink, ClientError>;
}

/// WebSocket connector backed by `tokio-tungstenite`.
///
/// An open that does not finish within the open timeout fails like a refused
/// connection, so a black-holed host still goes through reconnect backoff.
#[derive(Debug, Clone, Copy)]
pub struct WsConnector {
    open_timeout: Duration,
}

impl WsConnector {
    pub fn new() -> Self {
        Self {
            open_timeout: DEFAULT_OPEN_TIMEOUT,
        }
    }

    pub fn with_open_timeout(mut self, open_timeout: Duration) -> Self {
        self.open_timeout = open_timeout;
        self
    }
}

impl Default for WsConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<TransportLink, ClientError> {
        let opening = tokio_tungstenite::connect_async(url);
        let (ws_stream, _response) = tokio::time::timeout(self.open_timeout, opening)
            .await
            .map_err(|_| {
                ClientError::Transport(format!(
                    "websocket open timed out after {}ms",
                    self.open_timeout.as_millis()
                ))
            })?
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        debug!(url, "websocket connected");

        let (mut ws_sink, mut ws_stream) = ws_stream.split();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Outbound>();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<TransportEvent>();

        tokio::spawn(async move {
            while let Some(out) = outbound_rx.recv().await {
                let message = match out {
                    Outbound::Text(text) => Message::Text(text),
                    Outbound::Close { code, reason } => Message::Close(Some(CloseFrame {
                        code: CloseCode::from(code),
                        reason: reason.into(),
                    })),
                };
                if let Err(e) = ws_sink.send(message).await {
                    debug!("websocket send failed: {e}");
                    return;
                }
            }
            // Sender dropped: close normally.
            let _ = ws_sink.close().await;
        });

        tokio::spawn(async move {
            let mut closed = (ABNORMAL_CLOSE_CODE, String::new());
            while let Some(message) = ws_stream.next().await {
                match message {
                    Ok(Message::Text(text)) => {
                        let _ = inbound_tx.send(TransportEvent::Message(text));
                    }
                    Ok(Message::Binary(data)) => match String::from_utf8(data) {
                        Ok(text) => {
                            let _ = inbound_tx.send(TransportEvent::Message(text));
                        }
                        Err(_) => debug!("dropping non-UTF-8 binary message"),
                    },
                    Ok(Message::Close(frame)) => {
                        closed = match frame {
                            Some(frame) => (u16::from(frame.code), frame.reason.into_owned()),
                            None => (NO_STATUS_CLOSE_CODE, String::new()),
                        };
                        break;
                    }
                    Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => {}
                    Err(e) => {
                        warn!("websocket error: {e}");
                        let _ = inbound_tx.send(TransportEvent::Error(e.to_string()));
                        break;
                    }
                }
            }
            let (code, reason) = closed;
            let _ = inbound_tx.send(TransportEvent::Closed { code, reason });
        });

        Ok(TransportLink {
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }
}

/// In-process connector.
///
/// Every successful `connect` hands the server half of the link to the paired
/// [`MemoryListener`]. Useful for tests and for embedding a gateway in the
/// same process.
#[derive(Debug, Clone)]
pub struct MemoryConnector {
    accept_tx: mpsc::UnboundedSender<ServerEnd>,
    refusing: Arc<AtomicBool>,
}

impl MemoryConnector {
    /// Create a connector and the listener that receives its connections.
    pub fn new() -> (Self, MemoryListener) {
        let (accept_tx, accept_rx) = mpsc::unbounded_channel();
        (
            Self {
                accept_tx,
                refusing: Arc::new(AtomicBool::new(false)),
            },
            MemoryListener { accept_rx },
        )
    }

    /// Make subsequent connection attempts fail.
    pub fn set_refusing(&self, refusing: bool) {
        self.refusing.store(refusing, Ordering::SeqCst);
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, url: &str) -> Result<TransportLink, ClientError> {
        if self.refusing.load(Ordering::SeqCst) {
            return Err(ClientError::Transport("connection refused".to_string()));
        }
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let server = ServerEnd {
            url: url.to_string(),
            to_client: inbound_tx,
            from_client: outbound_rx,
        };
        self.accept_tx
            .send(server)
            .map_err(|_| ClientError::Transport("listener closed".to_string()))?;
        Ok(TransportLink {
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }
}

/// Receives connections opened through a [`MemoryConnector`].
#[derive(Debug)]
pub struct MemoryListener {
    accept_rx: mpsc::UnboundedReceiver<ServerEnd>,
}

impl MemoryListener {
    /// Wait for the next connection.
    pub async fn accept(&mut self) -> Option<ServerEnd> {
        self.accept_rx.recv().await
    }

    /// Take a connection if one is already waiting.
    pub fn try_accept(&mut self) -> Option<ServerEnd> {
        self.accept_rx.try_recv().ok()
    }
}

/// Server half of an in-memory link.
#[derive(Debug)]
pub struct ServerEnd {
    url: String,
    to_client: mpsc::UnboundedSender<TransportEvent>,
    from_client: mpsc::UnboundedReceiver<Outbound>,
}

impl ServerEnd {
    /// URL the client asked for.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Deliver a raw text message to the client.
    pub fn send_text(&self, text: impl Into<String>) {
        let _ = self.to_client.send(TransportEvent::Message(text.into()));
    }

    /// Deliver a frame to the client.
    pub fn send_frame(&self, frame: &Frame) -> Result<(), ClientError> {
        self.send_text(frame.encode()?);
        Ok(())
    }

    /// Report a socket error to the client.
    pub fn send_error(&self, message: impl Into<String>) {
        let _ = self.to_client.send(TransportEvent::Error(message.into()));
    }

    /// Close the connection from the server side.
    pub fn close(&self, code: u16, reason: impl Into<String>) {
        let _ = self.to_client.send(TransportEvent::Closed {
            code,
            reason: reason.into(),
        });
    }

    /// Next thing the client sent. `None` once the client dropped the link.
    pub async fn recv(&mut self) -> Option<Outbound> {
        self.from_client.recv().await
    }

    /// Next frame the client sent, skipping undecodable text.
    ///
    /// Returns `None` on a client close or when the link is gone.
    pub async fn recv_frame(&mut self) -> Option<Frame> {
        loop {
            match self.recv().await? {
                Outbound::Text(text) => {
                    if let Ok(frame) = Frame::decode(&text) {
                        return Some(frame);
                    }
                }
                Outbound::Close { .. } => return None,
            }
        }
    }

    /// Whether the client has dropped its side of the link.
    pub fn is_client_gone(&self) -> bool {
        self.to_client.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{EventFrame, RequestFrame};

    #[tokio::test]
    async fn test_memory_link_both_directions() {
        let (connector, mut listener) = MemoryConnector::new();
        let mut link = connector.connect("memory://gw").await.unwrap();
        let mut server = listener.accept().await.unwrap();
        assert_eq!(server.url(), "memory://gw");

        let req = Frame::Request(RequestFrame {
            id: "1".into(),
            method: "ping".into(),
            params: None,
        });
        link.outbound.send(Outbound::Text(req.encode().unwrap())).unwrap();
        assert_eq!(server.recv_frame().await.unwrap(), req);

        server
            .send_frame(&Frame::Event(EventFrame::new("tick", None)))
            .unwrap();
        server.close(1000, "bye");
        assert!(matches!(
            link.inbound.recv().await,
            Some(TransportEvent::Message(_))
        ));
        assert_eq!(
            link.inbound.recv().await,
            Some(TransportEvent::Closed {
                code: 1000,
                reason: "bye".into()
            })
        );
    }

    #[tokio::test]
    async fn test_refusing_connector() {
        let (connector, _listener) = MemoryConnector::new();
        connector.set_refusing(true);
        assert!(matches!(
            connector.connect("memory://gw").await,
            Err(ClientError::Transport(_))
        ));
    }

    #[tokio::test]
    async fn test_ws_open_times_out_on_silent_server() {
        // Accepts TCP but never answers the upgrade.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _hold = tokio::spawn(async move {
            let mut sockets = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                sockets.push(socket);
            }
        });

        let connector = WsConnector::new().with_open_timeout(Duration::from_millis(100));
        let started = std::time::Instant::now();
        match connector.connect(&format!("ws://{addr}")).await {
            Err(ClientError::Transport(message)) => assert!(message.contains("timed out")),
            other => panic!("expected timeout, got {:?}", other.map(|_| ())),
        }
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_dropping_link_is_visible_to_server() {
        let (connector, mut listener) = MemoryConnector::new();
        let link = connector.connect("memory://gw").await.unwrap();
        let mut server = listener.accept().await.unwrap();
        drop(link);
        assert!(server.recv().await.is_none());
        assert!(server.is_client_gone());
    }
}
