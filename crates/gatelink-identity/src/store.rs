//! Device identity storage.
//!
//! Defines the [`DeviceIdentityProvider`] trait the gateway client consumes and
//! provides [`FileIdentityStore`], which keeps the keypair in `device.json`
//! and issued tokens in `device-auth.json` under `~/.gatelink/identity/`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::Utc;
use gatelink_core::DeviceAuthToken;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::crypto;
use crate::error::{IdentityError, Result};
use crate::keys::DeviceKey;
use crate::master_key;
use crate::types::{
    DeviceIdentityInfo, StoredDevice, StoredPrivateKey, StoredTokens, STORE_VERSION,
};

const DEVICE_FILE: &str = "device.json";
const DEVICE_AUTH_FILE: &str = "device-auth.json";

/// Source of the per-install keypair and cache for server-issued tokens.
///
/// Implementations must make `load_or_create` idempotent and serialize token
/// writes against token clears.
#[async_trait]
pub trait DeviceIdentityProvider: Send + Sync {
    /// Load the device identity, creating and persisting one on first use.
    async fn load_or_create(&self) -> Result<DeviceIdentityInfo>;

    /// Sign `payload` with the device private key (base64url, no padding).
    async fn sign(&self, payload: &[u8]) -> Result<String>;

    /// Cached token for `(device_id, role)`, if any.
    async fn load_token(&self, device_id: &str, role: &str) -> Result<Option<DeviceAuthToken>>;

    /// Store or replace the token for `(token.device_id, token.role)`.
    async fn store_token(&self, token: DeviceAuthToken) -> Result<()>;

    /// Forget the token for `(device_id, role)`. Missing tokens are not an error.
    async fn clear_token(&self, device_id: &str, role: &str) -> Result<()>;

    /// All cached tokens for `device_id`, ordered by role.
    async fn list_tokens(&self, device_id: &str) -> Result<Vec<DeviceAuthToken>>;
}

/// File-system-backed identity store.
///
/// Both files are written atomically with mode `0600` on Unix. A single async
/// mutex guards the cached key and every read-modify-write of the token file
/// within a process. Across processes the device file is created
/// link-if-absent, so every store over one directory ends up with the same
/// identity, and each write stages through its own uniquely named file.
pub struct FileIdentityStore {
    dir: PathBuf,
    master_key: Option<Zeroizing<Vec<u8>>>,
    key: Mutex<Option<DeviceKey>>,
}

impl FileIdentityStore {
    /// Create a store rooted at `dir` without at-rest encryption.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            master_key: None,
            key: Mutex::new(None),
        }
    }

    /// Seal the private key with `master_key` when it is written.
    pub fn with_master_key(mut self, master_key: Zeroizing<Vec<u8>>) -> Self {
        self.master_key = Some(master_key);
        self
    }

    /// Create a store in `~/.gatelink/identity/`, sealing the private key when
    /// `GATELINK_MASTER_KEY` is set.
    pub fn from_default_dir() -> Result<Self> {
        let dir = gatelink_core::paths::identity_dir()
            .map_err(|e| IdentityError::Storage(e.to_string()))?;
        let store = Self::new(dir);
        Ok(match master_key::from_env()? {
            Some(key) => store.with_master_key(key),
            None => store,
        })
    }

    /// Directory holding the identity files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn device_path(&self) -> PathBuf {
        self.dir.join(DEVICE_FILE)
    }

    fn auth_path(&self) -> PathBuf {
        self.dir.join(DEVICE_AUTH_FILE)
    }

    /// Make sure `slot` holds the device key, reading or creating it.
    async fn ensure_key<'a>(&self, slot: &'a mut Option<DeviceKey>) -> Result<&'a DeviceKey> {
        if slot.is_none() {
            let key = match self.read_device().await? {
                Some(key) => key,
                None => {
                    let key = DeviceKey::generate()?;
                    if self.create_device(&key).await? {
                        info!(device_id = %key.device_id(), "created device identity");
                        key
                    } else {
                        // Another store over this directory created it first.
                        debug!("device identity appeared concurrently; loading it");
                        self.read_device().await?.ok_or_else(|| {
                            IdentityError::Storage("device file vanished after create".to_string())
                        })?
                    }
                }
            };
            *slot = Some(key);
        }
        slot.as_ref()
            .ok_or_else(|| IdentityError::Storage("device key unavailable".to_string()))
    }

    async fn read_device(&self) -> Result<Option<DeviceKey>> {
        let path = self.device_path();
        let data = match tokio::fs::read_to_string(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let stored: StoredDevice = serde_json::from_str(&data).map_err(|e| {
            IdentityError::Storage(format!("malformed {}: {e}", path.display()))
        })?;

        let pkcs8 = match &stored.private_key {
            StoredPrivateKey::Plain { pkcs8 } => Zeroizing::new(
                STANDARD
                    .decode(pkcs8)
                    .map_err(|e| IdentityError::InvalidKey(format!("base64 decode failed: {e}")))?,
            ),
            StoredPrivateKey::Sealed { ciphertext, salt } => {
                let master_key = self.master_key.as_ref().ok_or_else(|| {
                    IdentityError::MasterKey(
                        "device key is sealed but no master key is configured".to_string(),
                    )
                })?;
                let sealed = STANDARD.decode(ciphertext).map_err(|e| {
                    IdentityError::DecryptionFailed(format!("base64 decode failed: {e}"))
                })?;
                let salt = hex::decode(salt).map_err(|e| {
                    IdentityError::DecryptionFailed(format!("hex decode failed: {e}"))
                })?;
                crypto::open(master_key, &sealed, &salt)?
            }
        };

        let key = DeviceKey::from_pkcs8(&pkcs8)?;
        if stored.device_id != key.device_id() || stored.public_key != key.public_key() {
            warn!(
                stored = %stored.device_id,
                actual = %key.device_id(),
                "device id does not match key; rewriting"
            );
            self.write_device(&key).await?;
        }
        debug!(device_id = %key.device_id(), "loaded device identity");
        Ok(Some(key))
    }

    async fn write_device(&self, key: &DeviceKey) -> Result<()> {
        let json = self.device_record(key)?;
        self.ensure_dir().await?;
        write_private_file(&self.device_path(), json.as_bytes()).await
    }

    /// Persist `key` only if no device file exists yet. `false` means another
    /// writer got there first and the caller should read theirs.
    async fn create_device(&self, key: &DeviceKey) -> Result<bool> {
        let json = self.device_record(key)?;
        self.ensure_dir().await?;
        create_private_file(&self.device_path(), json.as_bytes()).await
    }

    fn device_record(&self, key: &DeviceKey) -> Result<Zeroizing<String>> {
        let private_key = match &self.master_key {
            Some(master_key) => {
                let (sealed, salt) = crypto::seal(master_key, key.pkcs8())?;
                StoredPrivateKey::Sealed {
                    ciphertext: STANDARD.encode(sealed),
                    salt: hex::encode(salt),
                }
            }
            None => StoredPrivateKey::Plain {
                pkcs8: STANDARD.encode(key.pkcs8()),
            },
        };
        let stored = StoredDevice {
            version: STORE_VERSION,
            device_id: key.device_id(),
            public_key: key.public_key(),
            private_key,
            created_at_ms: Utc::now().timestamp_millis(),
        };
        Ok(Zeroizing::new(serde_json::to_string_pretty(&stored)?))
    }

    async fn read_tokens(&self) -> Result<Option<StoredTokens>> {
        let path = self.auth_path();
        let data = match tokio::fs::read_to_string(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_str::<StoredTokens>(&data) {
            Ok(stored) => Ok(Some(stored)),
            Err(e) => {
                // A cache miss only costs one signed handshake.
                warn!(path = %path.display(), "ignoring malformed token file: {e}");
                Ok(None)
            }
        }
    }

    async fn write_tokens(&self, stored: &StoredTokens) -> Result<()> {
        let json = Zeroizing::new(serde_json::to_string_pretty(stored)?);
        self.ensure_dir().await?;
        write_private_file(&self.auth_path(), json.as_bytes()).await
    }

    async fn ensure_dir(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o700);
            tokio::fs::set_permissions(&self.dir, perms).await?;
        }

        Ok(())
    }
}

/// Sibling staging path, unique per process and per write so concurrent
/// writers never share one.
fn staging_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(
        ".{name}.{}.{:016x}.tmp",
        std::process::id(),
        rand::random::<u64>()
    ))
}

/// Write `data` to a fresh staging file with mode 0600 on Unix.
async fn stage_private_file(path: &Path, data: &[u8]) -> Result<PathBuf> {
    let staged = staging_path(path);
    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    options.mode(0o600);

    let written = async {
        let mut file = options.open(&staged).await?;
        file.write_all(data).await?;
        file.sync_all().await
    }
    .await;
    if let Err(e) = written {
        let _ = tokio::fs::remove_file(&staged).await;
        return Err(e.into());
    }
    Ok(staged)
}

/// Replace `path` with `data` atomically.
async fn write_private_file(path: &Path, data: &[u8]) -> Result<()> {
    let staged = stage_private_file(path, data).await?;
    if let Err(e) = tokio::fs::rename(&staged, path).await {
        let _ = tokio::fs::remove_file(&staged).await;
        return Err(e.into());
    }
    Ok(())
}

/// Publish `data` at `path` only if nothing is there yet. Readers see either
/// no file or the complete one.
async fn create_private_file(path: &Path, data: &[u8]) -> Result<bool> {
    let staged = stage_private_file(path, data).await?;
    let linked = tokio::fs::hard_link(&staged, path).await;
    let _ = tokio::fs::remove_file(&staged).await;
    match linked {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl DeviceIdentityProvider for FileIdentityStore {
    async fn load_or_create(&self) -> Result<DeviceIdentityInfo> {
        let mut slot = self.key.lock().await;
        Ok(self.ensure_key(&mut slot).await?.info())
    }

    async fn sign(&self, payload: &[u8]) -> Result<String> {
        let mut slot = self.key.lock().await;
        Ok(self.ensure_key(&mut slot).await?.sign(payload))
    }

    async fn load_token(&self, device_id: &str, role: &str) -> Result<Option<DeviceAuthToken>> {
        let _guard = self.key.lock().await;
        Ok(self
            .read_tokens()
            .await?
            .filter(|stored| stored.device_id == device_id)
            .and_then(|mut stored| stored.tokens.remove(role)))
    }

    async fn store_token(&self, token: DeviceAuthToken) -> Result<()> {
        let _guard = self.key.lock().await;
        let mut stored = match self.read_tokens().await? {
            Some(stored) if stored.device_id == token.device_id => stored,
            _ => StoredTokens::empty(&token.device_id),
        };
        debug!(device_id = %token.device_id, role = %token.role, "storing device token");
        stored.tokens.insert(token.role.clone(), token);
        self.write_tokens(&stored).await
    }

    async fn clear_token(&self, device_id: &str, role: &str) -> Result<()> {
        let _guard = self.key.lock().await;
        let Some(mut stored) = self.read_tokens().await? else {
            return Ok(());
        };
        if stored.device_id != device_id || stored.tokens.remove(role).is_none() {
            return Ok(());
        }
        debug!(device_id, role, "cleared device token");
        self.write_tokens(&stored).await
    }

    async fn list_tokens(&self, device_id: &str) -> Result<Vec<DeviceAuthToken>> {
        let _guard = self.key.lock().await;
        Ok(self
            .read_tokens()
            .await?
            .filter(|stored| stored.device_id == device_id)
            .map(|stored| stored.tokens.into_values().collect())
            .unwrap_or_default())
    }
}
