//! Config save/load roundtrip integration tests.
//!
//! These tests verify that configuration can be written to disk, loaded back,
//! and turned into client options.

use gatelink_client::ClientOptions;
use gatelink_core::config::Config;
use gatelink_core::SecretString;
use std::path::Path;
use tempfile::TempDir;

#[test]
fn test_config_save_and_load() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("gatelink.json5");

    let config = Config::default();
    config.save(&path).unwrap();

    let loaded = Config::load(&path).unwrap();
    assert_eq!(loaded.gateway.url, config.gateway.url);
    assert_eq!(loaded.client.scopes, config.client.scopes);
    assert_eq!(loaded.reconnect.max_delay_ms, 15000);
    assert!(loaded.validate().is_ok());
}

#[test]
fn test_config_modify_and_reload() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("gatelink.json5");

    let mut config = Config::default();
    config.gateway.url = "wss://gw.example.com".to_string();
    config.gateway.token = Some(SecretString::new("tok"));
    config.reconnect.base_delay_ms = 100;
    config.save(&path).unwrap();

    let loaded = Config::load(&path).unwrap();
    assert_eq!(loaded.gateway.url, "wss://gw.example.com");
    assert_eq!(loaded.gateway.token.unwrap().expose_secret(), "tok");
    assert_eq!(loaded.reconnect.base_delay_ms, 100);
}

#[test]
fn test_json5_file_to_client_options() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("gatelink.json5");
    std::fs::write(
        &path,
        r#"{
            // comments and trailing commas are fine
            gateway: { url: "ws://10.0.0.2:18789" },
            client: { id: "webchat-ui", mode: "webchat", scopes: ["operator.write", "operator.read"], },
            reconnect: { challengeWaitMs: 250 },
        }"#,
    )
    .unwrap();

    let config = Config::load(&path).unwrap();
    let options = ClientOptions::from_config(&config);
    assert_eq!(options.url, "ws://10.0.0.2:18789");
    assert_eq!(options.client_id, "webchat-ui");
    assert_eq!(options.mode.as_str(), "webchat");
    assert_eq!(options.scopes, vec!["operator.read", "operator.write"]);
    assert_eq!(options.challenge_wait().as_millis(), 250);
    assert_eq!(options.reconnect.base_delay_ms, 800);
}

#[test]
fn test_config_load_nonexistent() {
    let result = Config::load(Path::new("/nonexistent/gatelink.json5"));
    assert!(result.unwrap_err().is_not_found());
}

#[test]
fn test_config_parse_invalid() {
    assert!(Config::parse("not valid json").is_err());
}

#[test]
fn test_invalid_values_fail_validation() {
    let config = Config::parse(r#"{ gateway: { url: "http://x" }, reconnect: { multiplier: 0.5 } }"#)
        .unwrap();
    let err = config.validate().unwrap_err().to_string();
    assert!(err.contains("ws"));
    assert!(err.contains("multiplier"));
}
