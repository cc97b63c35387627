//! Failures raised by the device identity and token stores.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IdentityError {
    /// Key material on disk or in memory could not be turned into an Ed25519 pair.
    #[error("device key rejected: {0}")]
    InvalidKey(String),

    #[error("could not seal identity file: {0}")]
    EncryptionFailed(String),

    /// Wrong master key or a tampered file.
    #[error("could not open identity file: {0}")]
    DecryptionFailed(String),

    #[error("master key unavailable: {0}")]
    MasterKey(String),

    #[error("identity store: {0}")]
    Storage(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("malformed identity record: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, IdentityError>;
