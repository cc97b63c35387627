//! Reading, writing and checking `gatelink.json5`.

use super::Config;
use crate::env;
use crate::error::ConfigError;
use crate::paths;
use crate::secret::SecretString;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use tracing::debug;

impl Config {
    /// Read and parse the file at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => ConfigError::NotFound(path.to_path_buf()),
            _ => ConfigError::Io(e),
        })?;
        debug!(path = %path.display(), bytes = content.len(), "read config");
        Self::parse(&content)
    }

    /// Effective config for a session: the file at `path` (default location
    /// when `None`), built-in defaults if that file is missing, then
    /// `GATELINK_*` overrides on top.
    pub fn resolve(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => paths::config_file()?,
        };
        let mut config = Self::load(&path).or_else(|e| {
            if e.is_not_found() {
                debug!(path = %path.display(), "no config file, using defaults");
                Ok(Self::default())
            } else {
                Err(e)
            }
        })?;
        config.apply_env();
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        json5::from_str(content).map_err(|e| ConfigError::Syntax(e.to_string()))
    }

    /// Environment wins over the file for the gateway endpoint and credentials.
    pub fn apply_env(&mut self) {
        if let Some(url) = env::get_var(env::GATEWAY_URL_VAR) {
            self.gateway.url = url;
        }
        if let Some(token) = env::get_var(env::TOKEN_VAR) {
            self.gateway.token = SecretString::non_empty(token);
        }
        if let Some(password) = env::get_var(env::PASSWORD_VAR) {
            self.gateway.password = SecretString::non_empty(password);
        }
    }

    /// Write to `path` through a sibling staging file so readers never see a
    /// partial config.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = self.to_json5()?;
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        let staged = path.with_extension("json5.partial");
        fs::write(&staged, content)?;
        fs::rename(&staged, path)?;
        debug!(path = %path.display(), "saved config");
        Ok(())
    }

    /// Plain JSON is a subset of JSON5, so the pretty JSON form is written.
    pub fn to_json5(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Validate the configuration, collecting all errors before returning.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        match url::Url::parse(&self.gateway.url) {
            Ok(url) if matches!(url.scheme(), "ws" | "wss") => {}
            Ok(url) => errors.push(format!(
                "Gateway URL must use ws:// or wss://, got '{}://'",
                url.scheme()
            )),
            Err(e) => errors.push(format!("Invalid gateway URL '{}': {}", self.gateway.url, e)),
        }

        if self.client.role.trim().is_empty() {
            errors.push("Client role cannot be empty".to_string());
        }

        if self.client.id.trim().is_empty() {
            errors.push("Client id cannot be empty".to_string());
        }

        let reconnect = &self.reconnect;
        if reconnect.base_delay_ms == 0 {
            errors.push("Reconnect base delay must be greater than 0".to_string());
        }
        if reconnect.base_delay_ms > reconnect.max_delay_ms {
            errors.push(format!(
                "Reconnect base delay ({}ms) exceeds max delay ({}ms)",
                reconnect.base_delay_ms, reconnect.max_delay_ms
            ));
        }
        if !(reconnect.multiplier >= 1.0 && reconnect.multiplier.is_finite()) {
            errors.push(format!(
                "Reconnect multiplier must be a finite number >= 1.0, got {}",
                reconnect.multiplier
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(errors))
        }
    }
}
