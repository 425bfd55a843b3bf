//! Credential storage abstraction.
//!
//! This module provides:
//! - [`Secret`] - A wrapper for sensitive values that prevents accidental logging
//! - [`CredentialKey`] - The fixed set of persisted credential names
//! - [`CredentialStore`] - Trait for credential storage backends
//! - [`MemoryStore`] - In-memory implementation for testing
//! - [`KeyringStore`] - OS keyring implementation (with `keyring-store` feature)
//!
//! Three credentials survive across process restarts: the refresh token,
//! and (only between flow initiation and callback handling) the PKCE code
//! verifier and the anti-CSRF state. Each is stored under a fixed, stable
//! name so a restarted process finds them again.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use zeroize::Zeroize;

mod memory;
#[cfg(feature = "keyring-store")]
mod keyring;

pub use memory::MemoryStore;
#[cfg(feature = "keyring-store")]
pub use keyring::KeyringStore;

/// A secret value that prevents accidental exposure in logs.
///
/// The inner value is only accessible via [`expose()`](Secret::expose).
/// Debug and Display implementations show `[REDACTED]` instead of the
/// value, and the buffer is zeroed when dropped.
#[derive(Clone, Serialize, Deserialize)]
pub struct Secret(String);

impl Secret {
    /// Create a new secret from a string value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Expose the secret value.
    ///
    /// Use sparingly and never log the result.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl Drop for Secret {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Secret([REDACTED])")
    }
}

impl std::fmt::Display for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl PartialEq for Secret {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for Secret {}

/// The fixed set of credentials Gatelink persists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialKey {
    /// Long-lived OAuth refresh token.
    RefreshToken,

    /// PKCE code verifier, held only across the authorization redirect.
    CodeVerifier,

    /// Anti-CSRF state, held only across the authorization redirect.
    OauthState,
}

impl CredentialKey {
    /// All keys, in a stable order. Used when clearing storage.
    pub const ALL: [CredentialKey; 3] = [
        CredentialKey::RefreshToken,
        CredentialKey::CodeVerifier,
        CredentialKey::OauthState,
    ];

    /// Stable storage name for this credential.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RefreshToken => "refresh_token",
            Self::CodeVerifier => "code_verifier",
            Self::OauthState => "oauth_state",
        }
    }
}

impl std::fmt::Display for CredentialKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error type for credential store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The storage backend encountered an error.
    #[error("backend error: {message}")]
    BackendError { message: String },

    /// The keyring backend is not available.
    #[error("keyring not available: {message}")]
    KeyringUnavailable { message: String },
}

/// Abstraction over credential storage backends.
///
/// Implementations include:
/// - [`MemoryStore`] - In-memory storage for testing
/// - [`KeyringStore`] (with `keyring-store` feature) - OS keyring
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Retrieve a credential.
    ///
    /// Returns `Ok(None)` if nothing is stored under the key.
    async fn get(&self, key: CredentialKey) -> Result<Option<Secret>, StoreError>;

    /// Store a credential, overwriting any existing value.
    async fn set(&self, key: CredentialKey, secret: &Secret) -> Result<(), StoreError>;

    /// Delete a credential.
    ///
    /// Returns `Ok(())` even if nothing was stored.
    async fn delete(&self, key: CredentialKey) -> Result<(), StoreError>;

    /// Check whether a credential exists without retrieving it.
    async fn exists(&self, key: CredentialKey) -> Result<bool, StoreError> {
        Ok(self.get(key).await?.is_some())
    }

    /// Delete every persisted credential.
    async fn clear(&self) -> Result<(), StoreError> {
        for key in CredentialKey::ALL {
            self.delete(key).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for Box<dyn CredentialStore> {
    async fn get(&self, key: CredentialKey) -> Result<Option<Secret>, StoreError> {
        (**self).get(key).await
    }

    async fn set(&self, key: CredentialKey, secret: &Secret) -> Result<(), StoreError> {
        (**self).set(key, secret).await
    }

    async fn delete(&self, key: CredentialKey) -> Result<(), StoreError> {
        (**self).delete(key).await
    }
}

/// Create a credential store with automatic backend selection.
///
/// With the `keyring-store` feature enabled and `prefer_keyring` set, this
/// attempts the OS keyring and falls back to an in-memory store (with a
/// warning) when the keyring is unavailable. Otherwise it returns a
/// [`MemoryStore`], which does not persist across restarts.
pub fn create_store(prefer_keyring: bool) -> Box<dyn CredentialStore> {
    #[cfg(feature = "keyring-store")]
    if prefer_keyring {
        match KeyringStore::try_new("gatelink") {
            Ok(store) => {
                tracing::info!("Using OS keyring for credential storage");
                return Box::new(store);
            }
            Err(e) => {
                tracing::warn!(
                    "Keyring unavailable ({}), falling back to memory store. \
                     Credentials will not persist across restarts.",
                    e
                );
            }
        }
    }

    #[cfg(not(feature = "keyring-store"))]
    if prefer_keyring {
        tracing::warn!(
            "Keyring storage requested but keyring-store feature not enabled. \
             Using memory store. Credentials will not persist across restarts."
        );
    }

    tracing::debug!("Using in-memory credential storage");
    Box::new(MemoryStore::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_debug_redacted() {
        let secret = Secret::new("super-secret");
        let debug = format!("{:?}", secret);
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("REDACTED"));
    }

    #[test]
    fn secret_display_redacted() {
        let secret = Secret::new("super-secret");
        let display = format!("{}", secret);
        assert!(!display.contains("super-secret"));
        assert!(display.contains("REDACTED"));
    }

    #[test]
    fn credential_key_names_are_stable() {
        assert_eq!(CredentialKey::RefreshToken.as_str(), "refresh_token");
        assert_eq!(CredentialKey::CodeVerifier.as_str(), "code_verifier");
        assert_eq!(CredentialKey::OauthState.as_str(), "oauth_state");
    }

    #[tokio::test]
    async fn clear_removes_every_key() {
        let store = MemoryStore::new();
        for key in CredentialKey::ALL {
            store.set(key, &Secret::new("value")).await.unwrap();
        }

        store.clear().await.unwrap();

        for key in CredentialKey::ALL {
            assert!(!store.exists(key).await.unwrap());
        }
    }

    #[tokio::test]
    async fn create_store_memory_fallback() {
        let store = create_store(false);

        let secret = Secret::new("test");
        store.set(CredentialKey::RefreshToken, &secret).await.unwrap();
        let retrieved = store.get(CredentialKey::RefreshToken).await.unwrap();
        assert!(retrieved.is_some());
    }
}
