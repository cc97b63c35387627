//! Loopback gateway fixture.
//!
//! [`LoopbackGateway`] listens on `127.0.0.1:0` and hands every accepted
//! WebSocket to the test as a [`ServerConn`], which speaks raw JSON so tests
//! assert on the exact wire shape.

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

/// Upper bound on any single wait in these tests.
pub const STEP_TIMEOUT: Duration = Duration::from_secs(5);

/// A WebSocket server on a random local port.
pub struct LoopbackGateway {
    url: String,
    connections: mpsc::UnboundedReceiver<ServerConn>,
}

impl LoopbackGateway {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let url = format!("ws://{}", listener.local_addr().expect("local addr"));
        let (tx, connections) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                if let Ok(ws) = tokio_tungstenite::accept_async(stream).await {
                    if tx.send(ServerConn { ws }).is_err() {
                        return;
                    }
                }
            }
        });
        Self { url, connections }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Wait for the next client connection.
    pub async fn accept(&mut self) -> ServerConn {
        tokio::time::timeout(STEP_TIMEOUT, self.connections.recv())
            .await
            .expect("timed out waiting for a connection")
            .expect("listener stopped")
    }
}

/// What the client did next.
#[derive(Debug)]
pub enum ClientMessage {
    Json(Value),
    Close { code: u16, reason: String },
    Gone,
}

/// Server side of one WebSocket.
pub struct ServerConn {
    ws: WebSocketStream<TcpStream>,
}

impl ServerConn {
    pub async fn send(&mut self, value: Value) {
        self.ws
            .send(Message::Text(value.to_string()))
            .await
            .expect("send");
    }

    pub async fn send_challenge(&mut self, nonce: &str) {
        self.send(json!({
            "type": "event",
            "event": "connect.challenge",
            "payload": {"nonce": nonce}
        }))
        .await;
    }

    pub async fn send_event(&mut self, event: &str, seq: u64, payload: Value) {
        self.send(json!({"type": "event", "event": event, "seq": seq, "payload": payload}))
            .await;
    }

    pub async fn respond_ok(&mut self, id: &str, payload: Value) {
        self.send(json!({"type": "res", "id": id, "ok": true, "payload": payload}))
            .await;
    }

    pub async fn respond_err(&mut self, id: &str, code: &str, message: &str) {
        self.send(json!({
            "type": "res",
            "id": id,
            "ok": false,
            "error": {"code": code, "message": message}
        }))
        .await;
    }

    pub async fn close(&mut self, code: u16, reason: &str) {
        let _ = self
            .ws
            .close(Some(CloseFrame {
                code: CloseCode::from(code),
                reason: reason.to_string().into(),
            }))
            .await;
    }

    /// Next text or close from the client, skipping control frames.
    pub async fn next(&mut self) -> ClientMessage {
        loop {
            let message = tokio::time::timeout(STEP_TIMEOUT, self.ws.next())
                .await
                .expect("timed out waiting for the client");
            match message {
                Some(Ok(Message::Text(text))) => {
                    return ClientMessage::Json(serde_json::from_str(&text).expect("client sent JSON"))
                }
                Some(Ok(Message::Close(frame))) => {
                    let (code, reason) = frame
                        .map(|f| (u16::from(f.code), f.reason.into_owned()))
                        .unwrap_or((1005, String::new()));
                    return ClientMessage::Close { code, reason };
                }
                Some(Ok(_)) => continue,
                Some(Err(_)) | None => return ClientMessage::Gone,
            }
        }
    }

    /// Next request frame from the client.
    pub async fn expect_request(&mut self) -> Value {
        match self.next().await {
            ClientMessage::Json(frame) if frame["type"] == "req" => frame,
            other => panic!("expected a request frame, got {:?}", other),
        }
    }

    /// Receive `connect` and answer it with `hello`. Returns the connect params.
    pub async fn accept_handshake(&mut self, hello: Value) -> Value {
        let req = self.expect_request().await;
        assert_eq!(req["method"], "connect");
        let id = req["id"].as_str().expect("request id").to_string();
        self.respond_ok(&id, hello).await;
        req["params"].clone()
    }
}
