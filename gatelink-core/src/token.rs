//! Token endpoint wire types and error classification.

use serde::{Deserialize, Serialize};

use crate::store::Secret;

/// Successful token endpoint response body.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// Error body returned by the token endpoint on non-2xx responses.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OAuthErrorBody {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
}

impl OAuthErrorBody {
    /// Classify the provider error into the rejection classes the auth
    /// state machine distinguishes.
    pub fn rejection(&self) -> TokenRejection {
        match self.error.as_deref() {
            Some("invalid_grant") => TokenRejection::InvalidGrant,
            Some("invalid_request") => TokenRejection::InvalidRequest,
            _ => TokenRejection::Other,
        }
    }

    /// True for the two rejection classes that indicate the presented
    /// refresh token itself is unusable.
    pub fn is_invalid_token(&self) -> bool {
        matches!(
            self.rejection(),
            TokenRejection::InvalidGrant | TokenRejection::InvalidRequest
        )
    }
}

/// Rejection classes the token endpoint can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenRejection {
    /// The grant (code or refresh token) is invalid.
    InvalidGrant,
    /// The request was malformed, e.g. the refresh token is missing.
    InvalidRequest,
    /// Any other provider error.
    Other,
}

/// A complete set of tokens issued by the platform.
///
/// The access token lives in memory only; the refresh token is also
/// persisted by the auth state machine.
#[derive(Debug, Clone)]
pub struct TokenSet {
    /// Short-lived credential for API calls.
    pub access_token: Secret,

    /// Long-lived credential used to mint new access tokens.
    pub refresh_token: Option<Secret>,
}

impl TokenSet {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: Secret::new(access_token),
            refresh_token: None,
        }
    }

    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(Secret::new(refresh_token));
        self
    }
}

impl From<TokenResponse> for TokenSet {
    fn from(response: TokenResponse) -> Self {
        Self {
            access_token: Secret::new(response.access_token),
            refresh_token: response.refresh_token.map(Secret::new),
        }
    }
}
