//! Device identity for Gatelink.
//!
//! Each install owns a stable Ed25519 keypair. The gateway knows the device
//! by the SHA-256 of its public key and may issue per-role bearer tokens to
//! it after a signed handshake. This crate creates and persists that keypair,
//! signs handshake payloads, and caches the issued tokens.
//!
//! The private key is optionally sealed at rest with AES-256-GCM under a
//! master key supplied through `GATELINK_MASTER_KEY`.

pub mod crypto;
pub mod error;
pub mod keys;
pub mod master_key;
pub mod memory;
pub mod store;
pub mod types;

pub use error::{IdentityError, Result};
pub use keys::{verify_signature, DeviceKey};
pub use memory::MemoryIdentityStore;
pub use store::{DeviceIdentityProvider, FileIdentityStore};
pub use types::DeviceIdentityInfo;
