//! Top-level error types for Gatelink.

use thiserror::Error;

use crate::auth::AuthError;
use crate::platform::PlatformError;
use crate::store::StoreError;

/// Top-level error type encompassing all core errors.
#[derive(Debug, Error)]
pub enum GatelinkError {
    /// Error from credential storage operations.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Error from the authentication flow.
    #[error("auth error: {0}")]
    Auth(#[from] AuthError),

    /// Error from the platform API.
    #[error("platform error: {0}")]
    Platform(#[from] PlatformError),

    /// Configuration error.
    #[error("configuration error: {message}")]
    Config { message: String },
}
