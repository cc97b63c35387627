//! End-to-end tests of the gateway client against a real WebSocket server.

use std::sync::Arc;
use std::time::Duration;

use gatelink_client::{ClientError, ClientEvent, ClientOptions, GatewayClient, WsConnector};
use gatelink_core::config::ReconnectConfig;
use gatelink_core::DeviceAuthToken;
use gatelink_identity::{verify_signature, DeviceIdentityProvider, FileIdentityStore};
use gatelink_integration_tests::{ClientMessage, LoopbackGateway, STEP_TIMEOUT};
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::sync::mpsc::UnboundedReceiver;

fn fast_reconnect() -> ReconnectConfig {
    ReconnectConfig {
        base_delay_ms: 20,
        multiplier: 1.7,
        max_delay_ms: 200,
        challenge_wait_ms: 750,
    }
}

fn options(gateway: &LoopbackGateway) -> ClientOptions {
    ClientOptions::new(gateway.url())
        .with_token("shared-token")
        .with_reconnect(fast_reconnect())
}

async fn next_event(events: &mut UnboundedReceiver<ClientEvent>) -> ClientEvent {
    tokio::time::timeout(STEP_TIMEOUT, events.recv())
        .await
        .expect("timed out waiting for a client event")
        .expect("event channel closed")
}

async fn expect_hello(events: &mut UnboundedReceiver<ClientEvent>) {
    match next_event(events).await {
        ClientEvent::Hello(hello) => assert_eq!(hello.protocol, 3),
        other => panic!("expected hello, got {:?}", other),
    }
}

/// Wait for the token issued by a hello to reach the store.
async fn persisted_token(store: &FileIdentityStore, device_id: &str) -> DeviceAuthToken {
    let poll = async {
        loop {
            if let Some(token) = store.load_token(device_id, "operator").await.unwrap() {
                return token;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    };
    tokio::time::timeout(STEP_TIMEOUT, poll)
        .await
        .expect("device token was never persisted")
}

fn signed_string(params: &Value, token: &str) -> String {
    let device = &params["device"];
    let scopes: Vec<&str> = params["scopes"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s.as_str().unwrap())
        .collect();
    let mut fields = vec![
        if device.get("nonce").is_some() { "v2" } else { "v1" }.to_string(),
        device["id"].as_str().unwrap().to_string(),
        params["client"]["id"].as_str().unwrap().to_string(),
        params["client"]["mode"].as_str().unwrap().to_string(),
        params["role"].as_str().unwrap().to_string(),
        scopes.join(","),
        device["signedAt"].as_i64().unwrap().to_string(),
        token.to_string(),
    ];
    if let Some(nonce) = device.get("nonce").and_then(Value::as_str) {
        fields.push(nonce.to_string());
    }
    fields.join("|")
}

#[tokio::test]
async fn test_signed_handshake_request_and_token_reuse() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(FileIdentityStore::new(dir.path()));
    let mut gateway = LoopbackGateway::start().await;

    let (client, mut events) = GatewayClient::new(options(&gateway), Arc::new(WsConnector::new()));
    let client = client.with_identity(store.clone());
    client.start().unwrap();

    // First connection: challenge, signed connect with the shared token.
    let mut conn = gateway.accept().await;
    conn.send_challenge("nonce-abc").await;
    let params = conn
        .accept_handshake(json!({
            "type": "hello-ok",
            "protocol": 3,
            "features": {"methods": ["models.list"], "events": ["presence"]},
            "snapshot": {"presence": []},
            "auth": {"deviceToken": "issued-token", "role": "operator", "scopes": ["operator.admin"]}
        }))
        .await;
    expect_hello(&mut events).await;

    assert_eq!(params["minProtocol"], 3);
    assert_eq!(params["auth"]["token"], "shared-token");
    assert_eq!(params["device"]["nonce"], "nonce-abc");
    assert!(verify_signature(
        params["device"]["publicKey"].as_str().unwrap(),
        signed_string(&params, "shared-token").as_bytes(),
        params["device"]["signature"].as_str().unwrap(),
    ));

    let identity = store.load_or_create().await.unwrap();
    assert_eq!(params["device"]["id"], identity.device_id.as_str());
    let stored = persisted_token(&store, &identity.device_id).await;
    assert_eq!(stored.token.expose_secret(), "issued-token");

    // A correlated request.
    let call = tokio::spawn({
        let pending = client.request("models.list", Some(json!({}))).unwrap();
        async move { pending.wait().await }
    });
    let req = conn.expect_request().await;
    assert_eq!(req["method"], "models.list");
    conn.respond_ok(req["id"].as_str().unwrap(), json!({"models": [{"id": "m1"}]}))
        .await;
    let payload = call.await.unwrap().unwrap();
    assert_eq!(payload["models"][0]["id"], "m1");

    // Planned restart: no visible error, then a reconnect.
    conn.close(1012, "service restart").await;
    match next_event(&mut events).await {
        ClientEvent::Closed(info) => {
            assert_eq!(info.code, 1012);
            assert!(info.visible_error().is_none());
        }
        other => panic!("expected close, got {:?}", other),
    }
    assert!(matches!(
        next_event(&mut events).await,
        ClientEvent::Reconnecting { .. }
    ));

    // Second connection presents the stored device token instead.
    let mut conn = gateway.accept().await;
    conn.send_challenge("nonce-def").await;
    let params = conn
        .accept_handshake(json!({"type": "hello-ok", "protocol": 3}))
        .await;
    expect_hello(&mut events).await;
    assert_eq!(params["auth"]["token"], "issued-token");
    assert!(verify_signature(
        params["device"]["publicKey"].as_str().unwrap(),
        signed_string(&params, "issued-token").as_bytes(),
        params["device"]["signature"].as_str().unwrap(),
    ));

    client.stop().await;
    match conn.next().await {
        ClientMessage::Close { code, .. } => assert_eq!(code, 1000),
        other => panic!("expected close, got {:?}", other),
    }
}

#[tokio::test]
async fn test_rejected_stored_token_is_cleared() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(FileIdentityStore::new(dir.path()));
    let identity = store.load_or_create().await.unwrap();
    store
        .store_token(DeviceAuthToken::new(
            identity.device_id.as_str(),
            "operator",
            "stale-token",
            vec!["operator.admin".to_string()],
        ))
        .await
        .unwrap();

    let mut gateway = LoopbackGateway::start().await;
    let (client, mut events) = GatewayClient::new(options(&gateway), Arc::new(WsConnector::new()));
    let client = client.with_identity(store.clone());
    client.start().unwrap();

    let mut conn = gateway.accept().await;
    conn.send_challenge("n1").await;
    let req = conn.expect_request().await;
    assert_eq!(req["params"]["auth"]["token"], "stale-token");
    conn.respond_err(req["id"].as_str().unwrap(), "UNAUTHORIZED", "device token revoked")
        .await;

    match conn.next().await {
        ClientMessage::Close { code, reason } => {
            assert_eq!(code, 4008);
            assert_eq!(reason, "connect failed");
        }
        other => panic!("expected close, got {:?}", other),
    }
    match next_event(&mut events).await {
        ClientEvent::Closed(info) => assert_eq!(info.code, 4008),
        other => panic!("expected close, got {:?}", other),
    }
    assert!(store
        .load_token(&identity.device_id, "operator")
        .await
        .unwrap()
        .is_none());

    // The retry falls back to the shared token.
    let mut conn = gateway.accept().await;
    conn.send_challenge("n2").await;
    let params = conn
        .accept_handshake(json!({"type": "hello-ok", "protocol": 3}))
        .await;
    assert_eq!(params["auth"]["token"], "shared-token");
    client.stop().await;
}

#[tokio::test]
async fn test_event_gap_and_connection_loss() {
    let mut gateway = LoopbackGateway::start().await;
    let options = options(&gateway);
    let (client, mut events) = GatewayClient::new(options, Arc::new(WsConnector::new()));
    client.start().unwrap();

    let mut conn = gateway.accept().await;
    conn.send_challenge("n").await;
    let params = conn
        .accept_handshake(json!({"type": "hello-ok", "protocol": 3}))
        .await;
    assert!(params.get("device").is_none());
    expect_hello(&mut events).await;

    for seq in [1, 2, 4] {
        conn.send_event("presence", seq, json!({"presence": []})).await;
    }
    let mut order = Vec::new();
    for _ in 0..4 {
        order.push(match next_event(&mut events).await {
            ClientEvent::Event(e) => format!("event:{}", e.seq.unwrap()),
            ClientEvent::Gap(g) => format!("gap:{}->{}", g.expected, g.received),
            other => panic!("unexpected {:?}", other),
        });
    }
    assert_eq!(order, vec!["event:1", "event:2", "gap:3->4", "event:4"]);

    let first = client.request("slow.a", None).unwrap();
    let second = client.request("slow.b", None).unwrap();
    conn.expect_request().await;
    conn.expect_request().await;
    conn.close(4400, "policy").await;

    for pending in [first, second] {
        match pending.wait().await {
            Err(ClientError::ConnectionLost { code, .. }) => assert_eq!(code, 4400),
            other => panic!("expected connection loss, got {:?}", other),
        }
    }
    match next_event(&mut events).await {
        ClientEvent::Closed(info) => assert_eq!(
            info.visible_error().as_deref(),
            Some("disconnected (4400): policy")
        ),
        other => panic!("expected close, got {:?}", other),
    }

    // The cursor starts over on the next connection.
    let mut conn = gateway.accept().await;
    conn.send_challenge("n").await;
    conn.accept_handshake(json!({"type": "hello-ok", "protocol": 3}))
        .await;
    loop {
        if let ClientEvent::Hello(_) = next_event(&mut events).await {
            break;
        }
    }
    conn.send_event("tick", 7, json!({})).await;
    assert!(matches!(
        next_event(&mut events).await,
        ClientEvent::Event(e) if e.seq == Some(7)
    ));
    client.stop().await;
}

#[tokio::test]
async fn test_unreachable_gateway_keeps_retrying() {
    // Bind and drop to get a port nothing listens on.
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let options =
        ClientOptions::new(format!("ws://127.0.0.1:{port}")).with_reconnect(fast_reconnect());
    let (client, mut events) = GatewayClient::new(options, Arc::new(WsConnector::new()));
    client.start().unwrap();

    let mut delays = Vec::new();
    while delays.len() < 3 {
        match next_event(&mut events).await {
            ClientEvent::Closed(info) => assert_eq!(info.code, 1006),
            ClientEvent::Reconnecting { delay } => delays.push(delay),
            other => panic!("unexpected {:?}", other),
        }
    }
    assert_eq!(
        delays,
        vec![
            Duration::from_millis(20),
            Duration::from_millis(34),
            Duration::from_millis(57)
        ]
    );
    assert!(matches!(
        client.request("health", None),
        Err(ClientError::NotConnected)
    ));
    client.stop().await;
    assert!(matches!(client.start(), Err(ClientError::Stopped)));
}
