//! On-disk locations under `~/.gatelink`.

use crate::error::ConfigError;
use std::path::PathBuf;

const BASE_DIR: &str = ".gatelink";
const CONFIG_FILE: &str = "gatelink.json5";
const IDENTITY_DIR: &str = "identity";

pub fn base_dir() -> Result<PathBuf, ConfigError> {
    dirs::home_dir()
        .map(|home| home.join(BASE_DIR))
        .ok_or(ConfigError::NoHomeDir)
}

/// `~/.gatelink/gatelink.json5`
pub fn config_file() -> Result<PathBuf, ConfigError> {
    base_dir().map(|base| base.join(CONFIG_FILE))
}

/// Directory holding the device keypair and issued device tokens.
pub fn identity_dir() -> Result<PathBuf, ConfigError> {
    base_dir().map(|base| base.join(IDENTITY_DIR))
}
