//! Device identity types and their on-disk forms.

use gatelink_core::DeviceAuthToken;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Public half of a device identity.
///
/// This is all the gateway client ever sees; signing goes back through the
/// provider so the private key stays where it was loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceIdentityInfo {
    /// Lowercase hex SHA-256 of the raw public key.
    pub device_id: String,

    /// Raw Ed25519 public key, base64url without padding.
    pub public_key: String,
}

/// Current version of both identity files.
pub(crate) const STORE_VERSION: u32 = 1;

/// `device.json`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StoredDevice {
    pub version: u32,
    pub device_id: String,
    pub public_key: String,
    pub private_key: StoredPrivateKey,
    pub created_at_ms: i64,
}

/// The PKCS#8 document, either as-is or sealed under the master key.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub(crate) enum StoredPrivateKey {
    /// Base64 PKCS#8.
    Plain { pkcs8: String },

    /// Base64 `nonce || ciphertext` plus hex salt.
    Sealed { ciphertext: String, salt: String },
}

/// `device-auth.json`: tokens for a single device, keyed by role.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StoredTokens {
    pub version: u32,
    pub device_id: String,
    #[serde(default)]
    pub tokens: BTreeMap<String, DeviceAuthToken>,
}

impl StoredTokens {
    pub fn empty(device_id: &str) -> Self {
        Self {
            version: STORE_VERSION,
            device_id: device_id.to_string(),
            tokens: BTreeMap::new(),
        }
    }
}
