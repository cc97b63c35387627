//! AES-256-GCM sealing with HKDF-SHA256 key derivation.
//!
//! Used to keep the device private key encrypted on disk when a master key is
//! configured. Every seal draws a fresh salt and nonce; the nonce travels in
//! front of the ciphertext so callers only keep `(sealed, salt)`.

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use hkdf::Hkdf;
use rand::RngCore;
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::error::{IdentityError, Result};

const NONCE_SIZE: usize = 12;
const SALT_SIZE: usize = 32;

/// Length in bytes of a master key.
pub const KEY_SIZE: usize = 32;

/// Domain separation for keys derived from the master key.
const HKDF_INFO: &[u8] = b"gatelink-device-key-v1";

fn derive_key(master_key: &[u8], salt: &[u8]) -> Result<Zeroizing<[u8; KEY_SIZE]>> {
    let hk = Hkdf::<Sha256>::new(Some(salt), master_key);
    let mut okm = Zeroizing::new([0u8; KEY_SIZE]);
    hk.expand(HKDF_INFO, &mut okm[..])
        .map_err(|e| IdentityError::EncryptionFailed(format!("key derivation failed: {e}")))?;
    Ok(okm)
}

/// Seal `plaintext` under a key derived from `master_key`.
///
/// Returns `(nonce || ciphertext_with_tag, salt)`.
pub fn seal(master_key: &[u8], plaintext: &[u8]) -> Result<(Vec<u8>, Vec<u8>)> {
    let mut salt = vec![0u8; SALT_SIZE];
    rand::thread_rng().fill_bytes(&mut salt);

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);

    let key = derive_key(master_key, &salt)?;
    let cipher = Aes256Gcm::new_from_slice(&key[..])
        .map_err(|e| IdentityError::EncryptionFailed(e.to_string()))?;

    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
        .map_err(|e| IdentityError::EncryptionFailed(e.to_string()))?;

    let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    sealed.extend_from_slice(&nonce_bytes);
    sealed.extend_from_slice(&ciphertext);

    Ok((sealed, salt))
}

/// Open data produced by [`seal`].
pub fn open(master_key: &[u8], sealed: &[u8], salt: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
    if sealed.len() < NONCE_SIZE {
        return Err(IdentityError::DecryptionFailed(
            "ciphertext too short".to_string(),
        ));
    }

    let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_SIZE);

    let key = derive_key(master_key, salt)?;
    let cipher = Aes256Gcm::new_from_slice(&key[..])
        .map_err(|e| IdentityError::DecryptionFailed(e.to_string()))?;

    cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map(Zeroizing::new)
        .map_err(|e| IdentityError::DecryptionFailed(e.to_string()))
}

/// Generate a new random master key.
pub fn generate_master_key() -> Zeroizing<Vec<u8>> {
    let mut key = Zeroizing::new(vec![0u8; KEY_SIZE]);
    rand::thread_rng().fill_bytes(key.as_mut_slice());
    key
}
