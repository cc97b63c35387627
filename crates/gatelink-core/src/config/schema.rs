//! Configuration schema definitions.

use crate::secret::SecretString;
use crate::types::{client_ids, ClientMode, Scope, DEFAULT_ROLE};
use serde::{Deserialize, Serialize};

/// Main Gatelink configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Which gateway to talk to and how to authenticate.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// How this client describes itself during the handshake.
    #[serde(default)]
    pub client: ClientConfig,

    /// Reconnect and handshake timing.
    #[serde(default)]
    pub reconnect: ReconnectConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Gateway endpoint and shared credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// WebSocket URL (`ws://` or `wss://`).
    #[serde(default = "default_url")]
    pub url: String,

    /// Shared gateway token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<SecretString>,

    /// Gateway password.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<SecretString>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            token: None,
            password: None,
        }
    }
}

fn default_url() -> String {
    "ws://127.0.0.1:18789".to_string()
}

/// Client descriptor and requested authorization.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    /// Client identifier.
    #[serde(default = "default_client_id")]
    pub id: String,

    /// Client version string.
    #[serde(default = "default_client_version")]
    pub version: String,

    /// Platform name; defaults to the host OS.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,

    /// Client mode.
    #[serde(default)]
    pub mode: ClientMode,

    /// Stable instance identifier, if this install has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,

    /// Requested role.
    #[serde(default = "default_role")]
    pub role: String,

    /// Requested scopes.
    #[serde(default = "Scope::operator_defaults")]
    pub scopes: Vec<String>,

    /// Use the device keypair to sign the handshake.
    #[serde(default = "default_true")]
    pub device_auth: bool,

    /// User agent override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,

    /// Locale override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            id: default_client_id(),
            version: default_client_version(),
            platform: None,
            mode: ClientMode::default(),
            instance_id: None,
            role: default_role(),
            scopes: Scope::operator_defaults(),
            device_auth: true,
            user_agent: None,
            locale: None,
        }
    }
}

fn default_client_id() -> String {
    client_ids::CLI.to_string()
}

fn default_client_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn default_role() -> String {
    DEFAULT_ROLE.to_string()
}

/// Reconnect backoff and handshake timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconnectConfig {
    /// First reconnect delay, and the value a successful handshake resets to.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Growth factor applied after each consecutive failure.
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    /// Delay cap.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// How long to wait for a server challenge before handshaking without one.
    #[serde(default = "default_challenge_wait_ms")]
    pub challenge_wait_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            multiplier: default_multiplier(),
            max_delay_ms: default_max_delay_ms(),
            challenge_wait_ms: default_challenge_wait_ms(),
        }
    }
}

fn default_base_delay_ms() -> u64 {
    800
}

fn default_multiplier() -> f64 {
    1.7
}

fn default_max_delay_ms() -> u64 {
    15_000
}

fn default_challenge_wait_ms() -> u64 {
    750
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.gateway.url, "ws://127.0.0.1:18789");
        assert_eq!(config.client.id, "cli");
        assert_eq!(config.client.role, "operator");
        assert_eq!(config.client.scopes.len(), 3);
        assert!(config.client.device_auth);
        assert_eq!(config.reconnect.base_delay_ms, 800);
        assert_eq!(config.reconnect.max_delay_ms, 15_000);
        assert_eq!(config.reconnect.challenge_wait_ms, 750);
        assert!((config.reconnect.multiplier - 1.7).abs() < f64::EPSILON);
    }

    #[test]
    fn test_empty_object_uses_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.client.mode, ClientMode::Cli);
        assert!(config.gateway.token.is_none());
    }

    #[test]
    fn test_camel_case_fields() {
        let config: Config = serde_json::from_str(
            r#"{"client":{"instanceId":"abc","deviceAuth":false},"reconnect":{"baseDelayMs":100}}"#,
        )
        .unwrap();
        assert_eq!(config.client.instance_id.as_deref(), Some("abc"));
        assert!(!config.client.device_auth);
        assert_eq!(config.reconnect.base_delay_ms, 100);
        assert_eq!(config.reconnect.max_delay_ms, 15_000);
    }
}
