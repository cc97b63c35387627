//! Handshake negotiation.
//!
//! Builds the `connect` request for one connection attempt and reacts to its
//! outcome. With a device identity the request carries a signature over a
//! `|`-joined payload; a previously issued device token is preferred over the
//! shared token. Without one it falls back to bearer credentials only.

use std::fmt;
use std::sync::Arc;

use gatelink_core::{DeviceAuthToken, SecretString};
use gatelink_identity::{DeviceIdentityInfo, DeviceIdentityProvider};
use tracing::{debug, info, warn};

use crate::error::ClientError;
use crate::options::ClientOptions;
use crate::protocol::{
    AuthBlock, ClientDescriptor, ConnectParams, DeviceBlock, HelloOk, PROTOCOL_VERSION,
};

/// Whether this client can produce device signatures.
///
/// Resolved once when the client is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthCapability {
    pub can_sign: bool,
}

/// Version tag of the signed payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadVersion {
    /// No server nonce.
    V1,
    /// Server nonce appended as the last field.
    V2,
}

impl PayloadVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::V1 => "v1",
            Self::V2 => "v2",
        }
    }
}

impl fmt::Display for PayloadVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fields covered by the device signature.
#[derive(Debug, Clone)]
pub struct DeviceAuthPayload<'a> {
    pub device_id: &'a str,
    pub client_id: &'a str,
    pub client_mode: &'a str,
    pub role: &'a str,
    pub scopes: &'a [String],
    pub signed_at_ms: i64,
    pub token: Option<&'a str>,
    pub nonce: Option<&'a str>,
}

impl DeviceAuthPayload<'_> {
    /// `V2` exactly when a non-empty nonce is present.
    pub fn version(&self) -> PayloadVersion {
        match self.nonce {
            Some(nonce) if !nonce.is_empty() => PayloadVersion::V2,
            _ => PayloadVersion::V1,
        }
    }

    /// Canonical string that gets signed.
    ///
    /// `version|deviceId|clientId|clientMode|role|scopes|signedAtMs|token[|nonce]`
    pub fn to_signable(&self) -> String {
        let version = self.version();
        let signed_at = self.signed_at_ms.to_string();
        let scopes = self.scopes.join(",");
        let mut fields = vec![
            version.as_str(),
            self.device_id,
            self.client_id,
            self.client_mode,
            self.role,
            scopes.as_str(),
            signed_at.as_str(),
            self.token.unwrap_or_default(),
        ];
        if version == PayloadVersion::V2 {
            fields.push(self.nonce.unwrap_or_default());
        }
        fields.join("|")
    }
}

/// What one handshake attempt needs to remember about its credentials.
#[derive(Debug, Clone)]
pub struct HandshakeAttempt {
    /// Device that signed the request, if any.
    pub device_id: Option<String>,
    /// Role that was requested.
    pub role: String,
    /// A stored device token was presented.
    pub used_stored_token: bool,
    /// A shared token exists to fall back to if the stored one is rejected.
    pub can_fallback: bool,
}

/// A ready-to-send `connect` request.
#[derive(Debug, Clone)]
pub struct PreparedHandshake {
    pub params: ConnectParams,
    pub attempt: HandshakeAttempt,
}

/// Builds `connect` requests and applies their outcome.
pub struct Negotiator {
    options: ClientOptions,
    identity: Option<Arc<dyn DeviceIdentityProvider>>,
    capability: AuthCapability,
}

impl Negotiator {
    pub fn new(options: ClientOptions, identity: Option<Arc<dyn DeviceIdentityProvider>>) -> Self {
        let capability = AuthCapability {
            can_sign: options.device_auth && identity.is_some(),
        };
        Self {
            options,
            identity,
            capability,
        }
    }

    pub fn capability(&self) -> AuthCapability {
        self.capability
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    fn signer(&self) -> Option<&Arc<dyn DeviceIdentityProvider>> {
        if self.capability.can_sign {
            self.identity.as_ref()
        } else {
            None
        }
    }

    /// Build the `connect` request, signing with `nonce` when one was issued.
    pub async fn prepare(&self, nonce: Option<&str>) -> PreparedHandshake {
        let options = &self.options;
        let role = options.role.clone();
        let nonce = nonce.filter(|n| !n.is_empty());

        let mut device_info: Option<DeviceIdentityInfo> = None;
        let mut stored_token: Option<SecretString> = None;

        if let Some(identity) = self.signer() {
            match identity.load_or_create().await {
                Ok(info) => {
                    stored_token = match identity.load_token(&info.device_id, &role).await {
                        Ok(token) => token.map(|t| t.token),
                        Err(e) => {
                            warn!(error = %e, "could not read stored device token");
                            None
                        }
                    };
                    device_info = Some(info);
                }
                Err(e) => {
                    warn!(error = %e, "device identity unavailable; using token-only auth");
                }
            }
        }

        let used_stored_token = stored_token.is_some();
        let can_fallback = used_stored_token && options.token.is_some();
        let auth_token = stored_token.or_else(|| options.token.clone());

        let auth = if auth_token.is_some() || options.password.is_some() {
            Some(AuthBlock {
                token: auth_token.clone(),
                password: options.password.clone(),
            })
        } else {
            None
        };

        let device = match (&device_info, self.signer()) {
            (Some(info), Some(identity)) => {
                let signed_at_ms = chrono::Utc::now().timestamp_millis();
                let payload = DeviceAuthPayload {
                    device_id: &info.device_id,
                    client_id: &options.client_id,
                    client_mode: options.mode.as_str(),
                    role: &role,
                    scopes: &options.scopes,
                    signed_at_ms,
                    token: auth_token.as_ref().map(|t| t.expose_secret()),
                    nonce,
                };
                match identity.sign(payload.to_signable().as_bytes()).await {
                    Ok(signature) => Some(DeviceBlock {
                        id: info.device_id.clone(),
                        public_key: info.public_key.clone(),
                        signature,
                        signed_at: signed_at_ms,
                        nonce: nonce.map(str::to_string),
                    }),
                    Err(e) => {
                        warn!(error = %e, "device signing failed; using token-only auth");
                        None
                    }
                }
            }
            _ => None,
        };

        debug!(
            signed = device.is_some(),
            nonce = nonce.is_some(),
            stored_token = used_stored_token,
            "prepared handshake"
        );

        let device_id = device.as_ref().map(|d| d.id.clone());
        PreparedHandshake {
            params: ConnectParams {
                min_protocol: PROTOCOL_VERSION,
                max_protocol: PROTOCOL_VERSION,
                client: ClientDescriptor {
                    id: options.client_id.clone(),
                    version: options.client_version.clone(),
                    platform: options.platform.clone(),
                    mode: options.mode,
                    instance_id: options.instance_id.clone(),
                },
                role: role.clone(),
                scopes: options.scopes.clone(),
                device,
                caps: Vec::new(),
                auth,
                user_agent: options.user_agent.clone(),
                locale: options.locale.clone(),
            },
            attempt: HandshakeAttempt {
                device_id,
                role,
                used_stored_token,
                can_fallback,
            },
        }
    }

    /// Persist a device token issued by `hello`.
    pub async fn on_hello(&self, attempt: &HandshakeAttempt, hello: &HelloOk) {
        let (Some(identity), Some(device_id), Some(token)) =
            (self.signer(), &attempt.device_id, hello.device_token())
        else {
            return;
        };
        let grant = hello.auth.clone().unwrap_or_default();
        let role = grant.role.unwrap_or_else(|| attempt.role.clone());
        let record = DeviceAuthToken::new(
            device_id.as_str(),
            role.as_str(),
            token.clone(),
            grant.scopes.unwrap_or_default(),
        );
        match identity.store_token(record).await {
            Ok(()) => info!(role = %role, "stored device token"),
            Err(e) => warn!(error = %e, "could not store device token"),
        }
    }

    /// Drop a stored token the server refused, when a shared token can take
    /// its place on the next attempt.
    pub async fn on_rejected(&self, attempt: &HandshakeAttempt, error: &ClientError) {
        if !(attempt.can_fallback && error.is_rejection()) {
            return;
        }
        let (Some(identity), Some(device_id)) = (self.signer(), &attempt.device_id) else {
            return;
        };
        match identity.clear_token(device_id, &attempt.role).await {
            Ok(()) => info!(role = %attempt.role, "cleared rejected device token"),
            Err(e) => warn!(error = %e, "could not clear device token"),
        }
    }
}
