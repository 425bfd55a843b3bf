//! In-memory credential storage implementation.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

use super::{CredentialKey, CredentialStore, Secret, StoreError};

/// In-memory credential store for testing and development.
///
/// This store is not persistent; data is lost when the process exits.
///
/// # Thread Safety
///
/// Uses interior mutability via `RwLock` and is safe to share across
/// threads.
pub struct MemoryStore {
    data: RwLock<HashMap<CredentialKey, Secret>>,
}

impl MemoryStore {
    /// Create a new empty memory store.
    pub fn new() -> Self {
        Self {
            data: RwLock::new(HashMap::new()),
        }
    }

    /// Create a memory store with initial data.
    pub fn with_data(data: HashMap<CredentialKey, Secret>) -> Self {
        Self {
            data: RwLock::new(data),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.data.read().len();
        f.debug_struct("MemoryStore")
            .field("keys_count", &count)
            .finish()
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn get(&self, key: CredentialKey) -> Result<Option<Secret>, StoreError> {
        Ok(self.data.read().get(&key).cloned())
    }

    async fn set(&self, key: CredentialKey, secret: &Secret) -> Result<(), StoreError> {
        self.data.write().insert(key, secret.clone());
        Ok(())
    }

    async fn delete(&self, key: CredentialKey) -> Result<(), StoreError> {
        self.data.write().remove(&key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_then_get() {
        let store = MemoryStore::new();
        let secret = Secret::new("test-value");

        store.set(CredentialKey::RefreshToken, &secret).await.unwrap();
        let retrieved = store.get(CredentialKey::RefreshToken).await.unwrap();

        assert!(retrieved.is_some());
        assert_eq!(retrieved.unwrap().expose(), "test-value");
    }

    #[tokio::test]
    async fn get_missing_returns_none() {
        let store = MemoryStore::new();
        let result = store.get(CredentialKey::OauthState).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn delete_removes_value() {
        let store = MemoryStore::new();
        let secret = Secret::new("test-value");

        store.set(CredentialKey::CodeVerifier, &secret).await.unwrap();
        store.delete(CredentialKey::CodeVerifier).await.unwrap();

        let result = store.get(CredentialKey::CodeVerifier).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let store = MemoryStore::new();
        store.delete(CredentialKey::RefreshToken).await.unwrap();
        store.delete(CredentialKey::RefreshToken).await.unwrap();
    }

    #[tokio::test]
    async fn keys_are_independent() {
        let store = MemoryStore::new();

        store
            .set(CredentialKey::RefreshToken, &Secret::new("rt"))
            .await
            .unwrap();
        store
            .set(CredentialKey::OauthState, &Secret::new("st"))
            .await
            .unwrap();

        store.delete(CredentialKey::OauthState).await.unwrap();

        assert!(store.exists(CredentialKey::RefreshToken).await.unwrap());
        assert!(!store.exists(CredentialKey::OauthState).await.unwrap());
    }
}
