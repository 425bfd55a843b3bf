//! OAuth2 Authorization Code flow with PKCE against the platform.
//!
//! [`AuthFlow`] is the client-side security state machine: it initiates the
//! flow (verifier + state generation, redirect URL), validates the callback
//! (anti-CSRF state comparison, single-use code exchange), exchanges the
//! code for tokens, and supports silent re-authentication via the persisted
//! refresh token.
//!
//! # Flow Overview
//!
//! 1. [`AuthFlow::initiate`] clears stored credentials, persists a fresh
//!    verifier and state, and returns the authorization URL
//! 2. The user authorizes in the browser
//! 3. The redirect query is handed to [`AuthFlow::handle_callback`]
//! 4. On state match the code is exchanged for tokens exactly once
//! 5. Later sessions call [`AuthFlow::auth_using_refresh_token`] instead

use thiserror::Error;

use crate::config::PlatformConfig;
use crate::pkce;
use crate::platform::PlatformClient;
use crate::store::{CredentialKey, CredentialStore, Secret, StoreError};
use crate::token::{OAuthErrorBody, TokenResponse, TokenSet};

/// Error type for authentication operations.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The authorization server redirected back with an error.
    #[error("provider error: {error}")]
    Provider {
        error: String,
        description: Option<String>,
    },

    /// The callback carried a state but none is stored.
    #[error("missing stored state")]
    MissingState,

    /// The callback carried a state but no code verifier is stored.
    #[error("missing stored verifier")]
    MissingVerifier,

    /// The callback state does not match the stored state.
    #[error("state mismatch")]
    StateMismatch,

    /// The token endpoint rejected the authorization code exchange.
    #[error("token exchange failed: {error}")]
    TokenExchange {
        error: String,
        description: Option<String>,
    },

    /// The refresh token was rejected as invalid by the provider.
    #[error("invalid refresh token")]
    InvalidRefreshToken,

    /// The refresh-token login failed for another reason.
    #[error("refresh token login failed: {message}")]
    RefreshFailed { message: String },

    /// No refresh token is available to authenticate with.
    #[error("no refresh token available")]
    NoRefreshToken,

    /// No access token is held; authentication has not completed.
    #[error("not authenticated")]
    NotAuthenticated,

    /// The authorization URL could not be constructed.
    #[error("invalid authorization URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Error from credential storage.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Network error talking to the token endpoint.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
}

/// Authentication states of the flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    /// No access token, no refresh token, no error.
    NotAuthenticated,

    /// A persisted refresh token exists but no access token is held yet.
    RefreshTokenPresent,

    /// The flow was initiated; waiting for the callback.
    Authenticating,

    /// An access token is held.
    Authenticated,

    /// A terminal error occurred; the user must re-initiate.
    Error,
}

/// Parsed query parameters of an authorization callback.
#[derive(Debug, Clone, Default)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

impl CallbackQuery {
    /// Parse a raw query string (`code=...&state=...`), with or without a
    /// leading `?`.
    pub fn parse(query: &str) -> Self {
        let query = query.strip_prefix('?').unwrap_or(query);
        let mut parsed = Self::default();
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            match key.as_ref() {
                "code" => parsed.code = Some(value.into_owned()),
                "state" => parsed.state = Some(value.into_owned()),
                "error" => parsed.error = Some(value.into_owned()),
                "error_description" => parsed.error_description = Some(value.into_owned()),
                _ => {}
            }
        }
        parsed
    }
}

/// A code/verifier pair waiting to be exchanged.
///
/// Created when a valid callback is detected and taken exactly once before
/// the asynchronous token request starts, so a repeated callback cannot
/// trigger a duplicate exchange.
#[derive(Debug)]
struct PendingExchange {
    code: String,
    verifier: Secret,
}

/// OAuth2 Authorization Code + PKCE state machine.
///
/// State transitions require `&mut self`; the flow is not reentrant, which
/// makes the read-then-write sequences on credential storage atomic from
/// the caller's perspective.
pub struct AuthFlow<S: CredentialStore> {
    config: PlatformConfig,
    #[cfg_attr(test, doc(hidden))]
    pub store: S,
    http: reqwest::Client,
    auto_login: bool,
    state: AuthState,
    access_token: Option<Secret>,
    refresh_token: Option<Secret>,
    error: Option<String>,
    error_description: Option<String>,
    pending: Option<PendingExchange>,
}

impl<S: CredentialStore> AuthFlow<S> {
    /// Create a new flow over the given configuration and credential store.
    pub fn new(config: PlatformConfig, store: S) -> Self {
        Self {
            config,
            store,
            http: reqwest::Client::new(),
            auto_login: false,
            state: AuthState::NotAuthenticated,
            access_token: None,
            refresh_token: None,
            error: None,
            error_description: None,
            pending: None,
        }
    }

    /// Log in automatically during [`init`](Self::init) if a refresh token
    /// is available.
    pub fn with_auto_login(mut self, auto_login: bool) -> Self {
        self.auto_login = auto_login;
        self
    }

    /// Load persisted credentials and settle the initial state.
    ///
    /// If a refresh token is stored and no access token is held, the state
    /// becomes [`AuthState::RefreshTokenPresent`]; with auto-login enabled
    /// the silent refresh runs exactly once. An auto-login failure is
    /// recorded in the error state rather than returned, matching the
    /// terminal-error contract of the flow.
    pub async fn init(&mut self) -> Result<(), AuthError> {
        self.refresh_token = self.store.get(CredentialKey::RefreshToken).await?;

        if self.refresh_token.is_some() && self.access_token.is_none() {
            self.state = AuthState::RefreshTokenPresent;

            if self.auto_login {
                if let Err(e) = self.auth_using_refresh_token().await {
                    tracing::warn!("auto-login with refresh token failed: {}", e);
                }
            }
        }

        Ok(())
    }

    /// Initiate the Authorization Code flow.
    ///
    /// Clears all transient and persisted credentials, generates a fresh
    /// verifier and state, persists both, and returns the authorization URL
    /// for the user's browser.
    pub async fn initiate(&mut self) -> Result<String, AuthError> {
        // Re-entrant initiation always resets every piece of transient state.
        self.error = None;
        self.error_description = None;
        self.pending = None;
        self.access_token = None;
        self.refresh_token = None;
        self.store.clear().await?;

        let verifier = pkce::generate_verifier();
        self.store
            .set(CredentialKey::CodeVerifier, &Secret::new(verifier.clone()))
            .await?;

        let timestamp = chrono::Utc::now().timestamp();
        let state = pkce::derive_state(
            &verifier,
            &self.config.authorize_endpoint(),
            &self.config.client_id,
            timestamp,
        );
        self.store
            .set(CredentialKey::OauthState, &Secret::new(state.clone()))
            .await?;

        let challenge = pkce::compute_challenge(&verifier);
        let url = pkce::build_authorization_url(&self.config, &challenge, &state)?;

        self.state = AuthState::Authenticating;
        tracing::debug!("initiated authorization code flow");

        Ok(url)
    }

    /// Handle the query string of an authorization callback.
    ///
    /// Runs at most once per received code/state pair: the stored state and
    /// verifier are cleared before any exchange, and the pending exchange is
    /// consumed before the token request starts.
    pub async fn handle_callback(&mut self, query: &str) -> Result<(), AuthError> {
        let callback = CallbackQuery::parse(query);

        if let Some(error) = callback.error {
            let description = callback.error_description;
            self.store.clear().await?;
            self.set_error(error.clone(), description.clone());
            return Err(AuthError::Provider { error, description });
        }

        let (Some(code), Some(state)) = (callback.code, callback.state) else {
            // Not a callback; nothing to process.
            return Ok(());
        };

        let stored_state = self.store.get(CredentialKey::OauthState).await?;
        let stored_verifier = self.store.get(CredentialKey::CodeVerifier).await?;

        // State and verifier are single-use regardless of the outcome.
        self.store.delete(CredentialKey::OauthState).await?;
        self.store.delete(CredentialKey::CodeVerifier).await?;

        let Some(stored_state) = stored_state else {
            self.set_error(
                "missing stored state",
                Some("No stored state found, please initiate the authentication flow again."),
            );
            return Err(AuthError::MissingState);
        };

        let Some(verifier) = stored_verifier else {
            self.set_error(
                "missing stored verifier",
                Some("No stored code verifier found, please initiate the authentication flow again."),
            );
            return Err(AuthError::MissingVerifier);
        };

        if state != stored_state.expose() {
            self.set_error(
                "state mismatch",
                Some("The returned state does not match the stored state."),
            );
            return Err(AuthError::StateMismatch);
        }

        self.pending = Some(PendingExchange { code, verifier });
        self.exchange_pending().await
    }

    /// Exchange the pending authorization code for tokens.
    async fn exchange_pending(&mut self) -> Result<(), AuthError> {
        // Consumed before the request starts; a re-entry finds nothing to do.
        let Some(pending) = self.pending.take() else {
            return Ok(());
        };

        let response = self
            .http
            .post(self.config.token_endpoint())
            .json(&serde_json::json!({
                "grant_type": "authorization_code",
                "client_id": self.config.client_id,
                "code": pending.code,
                "redirect_uri": self.config.redirect_uri,
                "code_verifier": pending.verifier.expose(),
            }))
            .send()
            .await?;

        if response.status().is_success() {
            let tokens: TokenResponse = response.json().await?;
            self.apply_token_set(tokens.into()).await?;
            tracing::info!("authorization code exchanged, authenticated");
            Ok(())
        } else {
            let body: OAuthErrorBody = response.json().await.unwrap_or_default();
            let error = body.error.clone().unwrap_or_else(|| "token exchange failed".to_string());
            let description = body.error_description.clone();
            self.set_error(error.clone(), description.clone());
            Err(AuthError::TokenExchange { error, description })
        }
    }

    /// Authenticate silently using the persisted refresh token.
    ///
    /// On the two distinguished rejection classes (invalid grant, invalid
    /// request) as well as on any other failure, the stored refresh token
    /// is cleared and the flow enters the error state; the failure is also
    /// returned so callers can prompt for a full re-login.
    pub async fn auth_using_refresh_token(&mut self) -> Result<(), AuthError> {
        self.error = None;
        self.error_description = None;
        self.pending = None;

        let Some(refresh_token) = self.refresh_token.clone() else {
            return Err(AuthError::NoRefreshToken);
        };

        let result = self
            .http
            .post(self.config.token_endpoint())
            .json(&serde_json::json!({
                "grant_type": "refresh_token",
                "client_id": self.config.client_id,
                "refresh_token": refresh_token.expose(),
            }))
            .send()
            .await;

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                self.clear_refresh_token().await?;
                self.set_error(
                    "refresh token login failed",
                    Some("The refresh token login failed, please log in again."),
                );
                return Err(AuthError::RefreshFailed {
                    message: e.to_string(),
                });
            }
        };

        if response.status().is_success() {
            let tokens: TokenResponse = response.json().await?;
            // A response without a rotated refresh token keeps the old one.
            let token_set = TokenSet {
                access_token: Secret::new(tokens.access_token),
                refresh_token: tokens
                    .refresh_token
                    .map(Secret::new)
                    .or(Some(refresh_token)),
            };
            self.apply_token_set(token_set).await?;
            tracing::info!("refresh token login succeeded");
            Ok(())
        } else {
            let body: OAuthErrorBody = response.json().await.unwrap_or_default();
            self.clear_refresh_token().await?;

            if body.is_invalid_token() {
                self.set_error(
                    "invalid refresh token",
                    Some("The stored refresh token is invalid, please log in again."),
                );
                Err(AuthError::InvalidRefreshToken)
            } else {
                self.set_error(
                    "refresh token login failed",
                    Some("The refresh token login failed, please log in again."),
                );
                Err(AuthError::RefreshFailed {
                    message: body.error.unwrap_or_else(|| "unknown error".to_string()),
                })
            }
        }
    }

    /// Forget all tokens and credentials and return to the initial state.
    pub async fn logout(&mut self) -> Result<(), AuthError> {
        self.access_token = None;
        self.refresh_token = None;
        self.error = None;
        self.error_description = None;
        self.pending = None;
        self.store.clear().await?;
        self.state = AuthState::NotAuthenticated;
        tracing::info!("logged out");
        Ok(())
    }

    /// Current state of the flow.
    pub fn state(&self) -> AuthState {
        self.state
    }

    /// The access token, if authenticated.
    pub fn access_token(&self) -> Option<&Secret> {
        self.access_token.as_ref()
    }

    /// The refresh token mirror of the persisted credential.
    pub fn refresh_token(&self) -> Option<&Secret> {
        self.refresh_token.as_ref()
    }

    /// Error identifier, if the flow is in the error state.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Human-readable error description, if any.
    pub fn error_description(&self) -> Option<&str> {
        self.error_description.as_deref()
    }

    /// True once an access token is held.
    pub fn is_authenticated(&self) -> bool {
        self.state == AuthState::Authenticated
    }

    /// Issue an authenticated platform API client.
    pub fn platform_client(&self) -> Result<PlatformClient, AuthError> {
        let access_token = self.access_token.clone().ok_or(AuthError::NotAuthenticated)?;
        Ok(PlatformClient::new(self.config.clone(), access_token))
    }

    /// Store a freshly issued token set: access token in memory, refresh
    /// token persisted.
    async fn apply_token_set(&mut self, tokens: TokenSet) -> Result<(), AuthError> {
        self.access_token = Some(tokens.access_token);
        match &tokens.refresh_token {
            Some(token) => {
                self.store.set(CredentialKey::RefreshToken, token).await?;
            }
            None => {
                self.store.delete(CredentialKey::RefreshToken).await?;
            }
        }
        self.refresh_token = tokens.refresh_token;
        self.state = AuthState::Authenticated;
        Ok(())
    }

    /// Remove the refresh token from memory and storage.
    async fn clear_refresh_token(&mut self) -> Result<(), AuthError> {
        self.refresh_token = None;
        self.store.delete(CredentialKey::RefreshToken).await?;
        Ok(())
    }

    fn set_error(&mut self, error: impl Into<String>, description: Option<impl Into<String>>) {
        self.error = Some(error.into());
        self.error_description = description.map(Into::into);
        self.state = AuthState::Error;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn flow() -> AuthFlow<MemoryStore> {
        AuthFlow::new(
            PlatformConfig::for_platform("https://platform.example.com"),
            MemoryStore::new(),
        )
    }

    #[test]
    fn callback_query_parses_code_and_state() {
        let query = CallbackQuery::parse("?code=abc123&state=xyz");
        assert_eq!(query.code.as_deref(), Some("abc123"));
        assert_eq!(query.state.as_deref(), Some("xyz"));
        assert!(query.error.is_none());
    }

    #[test]
    fn callback_query_parses_error() {
        let query = CallbackQuery::parse("error=access_denied&error_description=user%20cancelled");
        assert_eq!(query.error.as_deref(), Some("access_denied"));
        assert_eq!(query.error_description.as_deref(), Some("user cancelled"));
    }

    #[tokio::test]
    async fn initiate_persists_verifier_and_state() {
        let mut flow = flow();
        let url = flow.initiate().await.unwrap();

        assert_eq!(flow.state(), AuthState::Authenticating);
        assert!(url.contains("code_challenge_method=S256"));

        let verifier = flow.store.get(CredentialKey::CodeVerifier).await.unwrap().unwrap();
        let state = flow.store.get(CredentialKey::OauthState).await.unwrap().unwrap();
        assert_eq!(verifier.expose().len(), pkce::VERIFIER_LENGTH);

        // The URL carries exactly the persisted state and the challenge
        // derived from the persisted verifier.
        assert!(url.contains(&format!("state={}", state.expose())));
        assert!(url.contains(&format!(
            "code_challenge={}",
            pkce::compute_challenge(verifier.expose())
        )));
    }

    #[tokio::test]
    async fn initiate_twice_replaces_transient_state() {
        let mut flow = flow();
        flow.initiate().await.unwrap();
        let first = flow.store.get(CredentialKey::OauthState).await.unwrap().unwrap();

        flow.initiate().await.unwrap();
        let second = flow.store.get(CredentialKey::OauthState).await.unwrap().unwrap();

        assert_ne!(first.expose(), second.expose());
    }

    #[tokio::test]
    async fn callback_with_provider_error_clears_storage() {
        let mut flow = flow();
        flow.initiate().await.unwrap();

        let result = flow
            .handle_callback("error=access_denied&error_description=denied")
            .await;

        assert!(matches!(result, Err(AuthError::Provider { .. })));
        assert_eq!(flow.state(), AuthState::Error);
        assert_eq!(flow.error(), Some("access_denied"));
        assert!(!flow.store.exists(CredentialKey::CodeVerifier).await.unwrap());
        assert!(!flow.store.exists(CredentialKey::OauthState).await.unwrap());
    }

    #[tokio::test]
    async fn callback_without_stored_state_is_rejected() {
        let mut flow = flow();

        let result = flow.handle_callback("code=abc&state=xyz").await;

        assert!(matches!(result, Err(AuthError::MissingState)));
        assert_eq!(flow.state(), AuthState::Error);
        assert_eq!(flow.error(), Some("missing stored state"));
    }

    #[tokio::test]
    async fn callback_with_mismatched_state_is_rejected() {
        let mut flow = flow();
        flow.initiate().await.unwrap();

        let result = flow.handle_callback("code=abc&state=forged").await;

        assert!(matches!(result, Err(AuthError::StateMismatch)));
        assert_eq!(flow.state(), AuthState::Error);
        assert_eq!(flow.error(), Some("state mismatch"));
        // Single-use: the stored pair is gone even though validation failed.
        assert!(!flow.store.exists(CredentialKey::OauthState).await.unwrap());
        assert!(!flow.store.exists(CredentialKey::CodeVerifier).await.unwrap());
    }

    #[tokio::test]
    async fn callback_without_params_is_a_no_op() {
        let mut flow = flow();
        flow.handle_callback("").await.unwrap();
        assert_eq!(flow.state(), AuthState::NotAuthenticated);
    }

    #[tokio::test]
    async fn init_detects_persisted_refresh_token() {
        let store = MemoryStore::new();
        store
            .set(CredentialKey::RefreshToken, &Secret::new("rt-1"))
            .await
            .unwrap();

        let mut flow = AuthFlow::new(
            PlatformConfig::for_platform("https://platform.example.com"),
            store,
        );
        flow.init().await.unwrap();

        assert_eq!(flow.state(), AuthState::RefreshTokenPresent);
        assert_eq!(flow.refresh_token().unwrap().expose(), "rt-1");
    }

    #[tokio::test]
    async fn refresh_without_token_errors() {
        let mut flow = flow();
        let result = flow.auth_using_refresh_token().await;
        assert!(matches!(result, Err(AuthError::NoRefreshToken)));
    }

    #[tokio::test]
    async fn logout_clears_everything() {
        let store = MemoryStore::new();
        store
            .set(CredentialKey::RefreshToken, &Secret::new("rt-1"))
            .await
            .unwrap();

        let mut flow = AuthFlow::new(
            PlatformConfig::for_platform("https://platform.example.com"),
            store,
        );
        flow.init().await.unwrap();
        flow.logout().await.unwrap();

        assert_eq!(flow.state(), AuthState::NotAuthenticated);
        assert!(flow.refresh_token().is_none());
        assert!(!flow.store.exists(CredentialKey::RefreshToken).await.unwrap());
    }

    #[tokio::test]
    async fn platform_client_requires_access_token() {
        let flow = flow();
        assert!(matches!(
            flow.platform_client(),
            Err(AuthError::NotAuthenticated)
        ));
    }
}
