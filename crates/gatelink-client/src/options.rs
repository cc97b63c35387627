//! Client options.

use gatelink_core::config::{Config, ReconnectConfig};
use gatelink_core::{env, normalize_scopes, ClientMode, SecretString};
use std::time::Duration;

/// Everything the client needs to know before it connects.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Gateway WebSocket URL.
    pub url: String,
    /// Shared gateway token.
    pub token: Option<SecretString>,
    /// Gateway password.
    pub password: Option<SecretString>,
    /// Client id sent in the descriptor and signed payload.
    pub client_id: String,
    pub client_version: String,
    pub platform: String,
    pub mode: ClientMode,
    pub instance_id: Option<String>,
    /// Requested role.
    pub role: String,
    /// Requested scopes, sorted and de-duplicated.
    pub scopes: Vec<String>,
    /// Sign the handshake with the device key when an identity is available.
    pub device_auth: bool,
    pub user_agent: String,
    pub locale: String,
    /// Backoff and challenge timing.
    pub reconnect: ReconnectConfig,
}

impl ClientOptions {
    /// Options for `url` with every other setting at its default.
    pub fn new(url: impl Into<String>) -> Self {
        let mut options = Self::from_config(&Config::default());
        options.url = url.into();
        options
    }

    /// Build options from a loaded configuration.
    pub fn from_config(config: &Config) -> Self {
        let client = &config.client;
        Self {
            url: config.gateway.url.clone(),
            token: config.gateway.token.clone(),
            password: config.gateway.password.clone(),
            client_id: client.id.clone(),
            client_version: client.version.clone(),
            platform: client
                .platform
                .clone()
                .unwrap_or_else(|| std::env::consts::OS.to_string()),
            mode: client.mode,
            instance_id: client.instance_id.clone(),
            role: client.role.clone(),
            scopes: normalize_scopes(&client.scopes),
            device_auth: client.device_auth,
            user_agent: client
                .user_agent
                .clone()
                .unwrap_or_else(|| default_user_agent(&client.version)),
            locale: client.locale.clone().unwrap_or_else(env::locale),
            reconnect: config.reconnect.clone(),
        }
    }

    /// Set the shared token.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = SecretString::non_empty(token.into());
        self
    }

    /// Set the password.
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = SecretString::non_empty(password.into());
        self
    }

    /// Replace the requested scopes.
    pub fn with_scopes<S: AsRef<str>>(mut self, scopes: &[S]) -> Self {
        self.scopes = normalize_scopes(scopes);
        self
    }

    /// Replace reconnect timing.
    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// How long to wait for a challenge after the transport opens.
    pub fn challenge_wait(&self) -> Duration {
        Duration::from_millis(self.reconnect.challenge_wait_ms)
    }
}

fn default_user_agent(version: &str) -> String {
    format!(
        "gatelink/{} ({}; {})",
        version,
        std::env::consts::OS,
        std::env::consts::ARCH
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_default_config() {
        let options = ClientOptions::from_config(&Config::default());
        assert_eq!(options.url, "ws://127.0.0.1:18789");
        assert_eq!(options.role, "operator");
        assert_eq!(
            options.scopes,
            vec!["operator.admin", "operator.approvals", "operator.pairing"]
        );
        assert_eq!(options.platform, std::env::consts::OS);
        assert!(options.user_agent.starts_with("gatelink/"));
        assert_eq!(options.challenge_wait(), Duration::from_millis(750));
    }

    #[test]
    fn test_builders() {
        let options = ClientOptions::new("ws://gw:1")
            .with_token("  ")
            .with_password("pw")
            .with_scopes(&["operator.write", "operator.read", "operator.write"]);
        assert_eq!(options.url, "ws://gw:1");
        assert!(options.token.is_none());
        assert_eq!(options.password.unwrap().expose_secret(), "pw");
        assert_eq!(options.scopes, vec!["operator.read", "operator.write"]);
    }
}
