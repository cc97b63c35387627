//! In-memory identity store.

use std::collections::BTreeMap;

use async_trait::async_trait;
use gatelink_core::DeviceAuthToken;
use tokio::sync::Mutex;

use crate::error::Result;
use crate::keys::DeviceKey;
use crate::store::DeviceIdentityProvider;
use crate::types::DeviceIdentityInfo;

#[derive(Default)]
struct State {
    key: Option<DeviceKey>,
    tokens: BTreeMap<(String, String), DeviceAuthToken>,
}

/// Identity provider that never touches disk.
///
/// The keypair is generated on first use and lives as long as the store.
#[derive(Default)]
pub struct MemoryIdentityStore {
    state: Mutex<State>,
}

impl MemoryIdentityStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store around an existing key.
    pub fn with_key(key: DeviceKey) -> Self {
        Self {
            state: Mutex::new(State {
                key: Some(key),
                tokens: BTreeMap::new(),
            }),
        }
    }
}

impl State {
    fn key(&mut self) -> Result<&DeviceKey> {
        if self.key.is_none() {
            self.key = Some(DeviceKey::generate()?);
        }
        self.key.as_ref().ok_or_else(|| {
            crate::error::IdentityError::Storage("device key unavailable".to_string())
        })
    }
}

#[async_trait]
impl DeviceIdentityProvider for MemoryIdentityStore {
    async fn load_or_create(&self) -> Result<DeviceIdentityInfo> {
        Ok(self.state.lock().await.key()?.info())
    }

    async fn sign(&self, payload: &[u8]) -> Result<String> {
        Ok(self.state.lock().await.key()?.sign(payload))
    }

    async fn load_token(&self, device_id: &str, role: &str) -> Result<Option<DeviceAuthToken>> {
        let state = self.state.lock().await;
        Ok(state
            .tokens
            .get(&(device_id.to_string(), role.to_string()))
            .cloned())
    }

    async fn store_token(&self, token: DeviceAuthToken) -> Result<()> {
        let mut state = self.state.lock().await;
        state
            .tokens
            .insert((token.device_id.clone(), token.role.clone()), token);
        Ok(())
    }

    async fn clear_token(&self, device_id: &str, role: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state
            .tokens
            .remove(&(device_id.to_string(), role.to_string()));
        Ok(())
    }

    async fn list_tokens(&self, device_id: &str) -> Result<Vec<DeviceAuthToken>> {
        let state = self.state.lock().await;
        Ok(state
            .tokens
            .iter()
            .filter(|((id, _), _)| id == device_id)
            .map(|(_, token)| token.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::verify_signature;

    #[tokio::test]
    async fn test_identity_is_stable() {
        let store = MemoryIdentityStore::new();
        let a = store.load_or_create().await.unwrap();
        let b = store.load_or_create().await.unwrap();
        assert_eq!(a, b);

        let sig = store.sign(b"hello").await.unwrap();
        assert!(verify_signature(&a.public_key, b"hello", &sig));
    }

    #[tokio::test]
    async fn test_with_key() {
        let key = DeviceKey::generate().unwrap();
        let expected = key.info();
        let store = MemoryIdentityStore::with_key(key);
        assert_eq!(store.load_or_create().await.unwrap(), expected);
    }

    #[tokio::test]
    async fn test_tokens_keyed_by_device_and_role() {
        let store = MemoryIdentityStore::new();
        store
            .store_token(DeviceAuthToken::new("dev", "operator", "a", vec![]))
            .await
            .unwrap();
        store
            .store_token(DeviceAuthToken::new("dev", "node", "b", vec![]))
            .await
            .unwrap();

        assert_eq!(store.list_tokens("dev").await.unwrap().len(), 2);
        assert!(store.load_token("other", "operator").await.unwrap().is_none());

        store.clear_token("dev", "operator").await.unwrap();
        assert!(store.load_token("dev", "operator").await.unwrap().is_none());
        assert_eq!(
            store
                .load_token("dev", "node")
                .await
                .unwrap()
                .unwrap()
                .token
                .expose_secret(),
            "b"
        );
    }
}
