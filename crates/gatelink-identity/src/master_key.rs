//! Master key resolution.
//!
//! A master key is optional. When `GATELINK_MASTER_KEY` holds 32 hex-encoded
//! bytes the device private key is sealed before it touches disk; otherwise
//! the key file relies on its 0600 permissions alone.

use gatelink_core::env::{self, MASTER_KEY_VAR};
use tracing::debug;
use zeroize::Zeroizing;

use crate::crypto::KEY_SIZE;
use crate::error::{IdentityError, Result};

/// Read the master key from the environment, if one is configured.
pub fn from_env() -> Result<Option<Zeroizing<Vec<u8>>>> {
    match env::get_var(MASTER_KEY_VAR) {
        Some(value) => {
            debug!("using master key from environment variable");
            parse_hex(&value).map(Some)
        }
        None => Ok(None),
    }
}

/// Decode a hex master key, checking its length.
pub fn parse_hex(value: &str) -> Result<Zeroizing<Vec<u8>>> {
    let key = Zeroizing::new(
        hex::decode(value.trim())
            .map_err(|e| IdentityError::MasterKey(format!("invalid hex in {MASTER_KEY_VAR}: {e}")))?,
    );
    if key.len() != KEY_SIZE {
        return Err(IdentityError::MasterKey(format!(
            "{MASTER_KEY_VAR} must decode to exactly {KEY_SIZE} bytes, got {}",
            key.len()
        )));
    }
    Ok(key)
}
