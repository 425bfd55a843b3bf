//! # Gatelink Core
//!
//! Core library for Gatelink platform authentication.
//!
//! This crate provides:
//! - PKCE primitives for the OAuth2 Authorization Code flow
//! - A credential storage abstraction with in-memory and keyring backends
//! - The client-side authentication state machine
//! - A bearer-authenticated platform API client
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use gatelink_core::{AuthFlow, MemoryStore, PlatformConfig};
//!
//! async fn login() -> Result<(), gatelink_core::AuthError> {
//!     let mut flow = AuthFlow::new(PlatformConfig::default(), MemoryStore::new());
//!     flow.init().await?;
//!     let url = flow.initiate().await?;
//!     println!("Visit: {}", url);
//!     // after the redirect lands:
//!     flow.handle_callback("code=...&state=...").await?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod config;
pub mod error;
pub mod pkce;
pub mod platform;
pub mod store;
pub mod token;

// Re-export commonly used types at crate root
pub use auth::{AuthError, AuthFlow, AuthState, CallbackQuery};

pub use config::{PlatformConfig, load_config};

pub use error::GatelinkError;

pub use platform::{
    GatewayConfig,
    ModelEmbedField,
    ModelInfo,
    PlatformClient,
    PlatformError,
};

pub use store::{
    CredentialKey,
    CredentialStore,
    MemoryStore,
    Secret,
    StoreError,
    create_store,
};

#[cfg(feature = "keyring-store")]
pub use store::KeyringStore;

pub use token::{OAuthErrorBody, TokenRejection, TokenResponse, TokenSet};
