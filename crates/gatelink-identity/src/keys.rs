//! Ed25519 device keys.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use ring::rand::SystemRandom;
use ring::signature::{self, Ed25519KeyPair, KeyPair, UnparsedPublicKey};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::error::{IdentityError, Result};
use crate::types::DeviceIdentityInfo;

/// An Ed25519 keypair together with its PKCS#8 encoding.
pub struct DeviceKey {
    pair: Ed25519KeyPair,
    pkcs8: Zeroizing<Vec<u8>>,
}

impl DeviceKey {
    /// Generate a fresh keypair.
    pub fn generate() -> Result<Self> {
        let rng = SystemRandom::new();
        let document = Ed25519KeyPair::generate_pkcs8(&rng)
            .map_err(|_| IdentityError::InvalidKey("key generation failed".to_string()))?;
        Self::from_pkcs8(document.as_ref())
    }

    /// Rebuild a keypair from a PKCS#8 v2 document.
    pub fn from_pkcs8(bytes: &[u8]) -> Result<Self> {
        let pair = Ed25519KeyPair::from_pkcs8(bytes)
            .map_err(|e| IdentityError::InvalidKey(e.to_string()))?;
        Ok(Self {
            pair,
            pkcs8: Zeroizing::new(bytes.to_vec()),
        })
    }

    /// PKCS#8 document for persistence.
    pub fn pkcs8(&self) -> &[u8] {
        &self.pkcs8
    }

    /// Raw 32-byte public key.
    pub fn public_key_raw(&self) -> &[u8] {
        self.pair.public_key().as_ref()
    }

    /// Public key, base64url without padding.
    pub fn public_key(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.public_key_raw())
    }

    /// Lowercase hex SHA-256 of the raw public key.
    pub fn device_id(&self) -> String {
        device_id_for(self.public_key_raw())
    }

    /// Public identity handed to the engine.
    pub fn info(&self) -> DeviceIdentityInfo {
        DeviceIdentityInfo {
            device_id: self.device_id(),
            public_key: self.public_key(),
        }
    }

    /// Sign `payload`, returning the signature as base64url without padding.
    pub fn sign(&self, payload: &[u8]) -> String {
        URL_SAFE_NO_PAD.encode(self.pair.sign(payload).as_ref())
    }
}

impl std::fmt::Debug for DeviceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceKey")
            .field("device_id", &self.device_id())
            .finish_non_exhaustive()
    }
}

/// Device id for a raw public key.
pub fn device_id_for(public_key_raw: &[u8]) -> String {
    hex::encode(Sha256::digest(public_key_raw))
}

/// Check a base64url signature against a base64url public key.
///
/// Returns `false` for malformed input as well as for a bad signature.
pub fn verify_signature(public_key: &str, payload: &[u8], signature_b64: &str) -> bool {
    let (Ok(key), Ok(sig)) = (
        URL_SAFE_NO_PAD.decode(public_key),
        URL_SAFE_NO_PAD.decode(signature_b64),
    ) else {
        return false;
    };
    UnparsedPublicKey::new(&signature::ED25519, key)
        .verify(payload, &sig)
        .is_ok()
}
