//! Shared building blocks for the Gatelink gateway client.
//!
//! The identity store, the WebSocket client and the `gatelink` binary all read
//! the same `gatelink.json5` ([`Config`]), name scopes and client modes with
//! the types in [`types`], and draw request ids from an [`IdGenerator`].
//! Credentials stay wrapped in [`SecretString`] until they are put on the wire.

pub mod config;
pub mod env;
pub mod error;
pub mod id;
pub mod paths;
pub mod secret;
pub mod types;

pub use config::Config;
pub use error::ConfigError;
pub use id::{IdGenerator, SequentialIds, UuidGenerator};
pub use secret::SecretString;
pub use types::*;
