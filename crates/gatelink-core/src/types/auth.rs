//! Authentication and authorization types.

use crate::secret::SecretString;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Role requested by operator clients.
pub const DEFAULT_ROLE: &str = "operator";

/// Operator scope as it appears on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Scope {
    /// Full administrative access.
    #[serde(rename = "operator.admin")]
    Admin,

    /// Execution approval access.
    #[serde(rename = "operator.approvals")]
    Approvals,

    /// Device/node pairing access.
    #[serde(rename = "operator.pairing")]
    Pairing,

    /// Read-only access.
    #[serde(rename = "operator.read")]
    Read,

    /// Write access.
    #[serde(rename = "operator.write")]
    Write,
}

impl Scope {
    /// Wire name of the scope.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "operator.admin",
            Self::Approvals => "operator.approvals",
            Self::Pairing => "operator.pairing",
            Self::Read => "operator.read",
            Self::Write => "operator.write",
        }
    }

    /// Scopes an operator client asks for when none are configured.
    pub fn operator_defaults() -> Vec<String> {
        [Self::Admin, Self::Approvals, Self::Pairing]
            .iter()
            .map(|s| s.as_str().to_string())
            .collect()
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sort and de-duplicate a scope list, dropping blank entries.
///
/// The handshake signs the comma-joined list, so both sides must agree on
/// one canonical order.
pub fn normalize_scopes<S: AsRef<str>>(scopes: &[S]) -> Vec<String> {
    let mut out: Vec<String> = scopes
        .iter()
        .map(|s| s.as_ref().trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    out.sort();
    out.dedup();
    out
}

/// Bearer credential issued by the gateway to one device for one role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceAuthToken {
    /// Device the token was issued to.
    pub device_id: String,

    /// Role the token is valid for.
    pub role: String,

    /// The bearer token itself.
    pub token: SecretString,

    /// Scopes granted alongside the token.
    #[serde(default)]
    pub scopes: Vec<String>,

    /// When the token was stored locally (unix millis).
    #[serde(default)]
    pub updated_at_ms: i64,
}

impl DeviceAuthToken {
    /// Create a token record stamped with the current time.
    pub fn new(
        device_id: impl Into<String>,
        role: impl Into<String>,
        token: impl Into<SecretString>,
        scopes: Vec<String>,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            role: role.into(),
            token: token.into(),
            scopes: normalize_scopes(&scopes),
            updated_at_ms: chrono::Utc::now().timestamp_millis(),
        }
    }
}
