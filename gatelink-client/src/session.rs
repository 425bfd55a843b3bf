//! Lazy per-model session resolution with request collapsing.
//!
//! Any command referencing a model needs a session at that model's backend.
//! Sessions are expensive (a metadata fetch plus a ticket exchange), so the
//! resolver caches them by model id and collapses concurrent requests for
//! the same id into a single upstream resolution.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::OnceCell;

use gatelink_core::platform::{ModelEmbedField, PlatformClient, PlatformError};
use gatelink_core::store::Secret;

use crate::backend::{BackendClient, BackendError, ScopedConfig, SessionHandle};

/// Error type for session resolution.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The platform call for model metadata failed.
    #[error("platform error: {0}")]
    Platform(#[from] PlatformError),

    /// The model metadata carries no backend system.
    #[error("model {model_id} has no backend system")]
    MissingBackend { model_id: String },

    /// The model metadata carries no session ticket.
    #[error("model {model_id} has no session ticket")]
    MissingTicket { model_id: String },

    /// The model metadata carries no scoped access token.
    #[error("model {model_id} has no scoped access token")]
    MissingAccessToken { model_id: String },

    /// The ticket exchange at the model's backend failed.
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),
}

/// A resolved session: the scoped API configuration plus the session
/// handle obtained from the ticket exchange.
#[derive(Debug, Clone)]
pub struct ModelSession {
    pub config: ScopedConfig,
    pub session: SessionHandle,
}

impl ModelSession {
    /// A backend client scoped to this session's model.
    pub fn backend(&self) -> BackendClient {
        BackendClient::new(self.config.clone())
    }
}

/// Resolves and caches model sessions.
///
/// The cache maps each model id to a single-assignment cell. The
/// check-then-insert runs under a synchronous lock with no await inside,
/// so concurrent `resolve` calls for the same id always land on the same
/// cell; the cell itself serializes initialization, guaranteeing at most
/// one upstream resolution per id. A failed initialization leaves the cell
/// empty, so a later command may retry.
pub struct SessionResolver {
    platform: PlatformClient,
    cache: Mutex<HashMap<String, Arc<OnceCell<ModelSession>>>>,
}

impl SessionResolver {
    /// Create a resolver over an authenticated platform client.
    pub fn new(platform: PlatformClient) -> Self {
        Self {
            platform,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve the session for a model, creating it on first use.
    pub async fn resolve(&self, model_id: &str) -> Result<ModelSession, SessionError> {
        let cell = {
            let mut cache = self.cache.lock();
            cache.entry(model_id.to_string()).or_default().clone()
        };

        cell.get_or_try_init(|| self.create_session(model_id))
            .await
            .cloned()
    }

    /// Fetch model metadata and exchange the ticket for a session.
    async fn create_session(&self, model_id: &str) -> Result<ModelSession, SessionError> {
        tracing::debug!(model_id, "resolving model session");

        let model = self
            .platform
            .get_model(
                model_id,
                &[
                    ModelEmbedField::BackendSystem,
                    ModelEmbedField::Ticket,
                    ModelEmbedField::TokenExport,
                ],
            )
            .await?;

        let backend_system = model.backend_system.ok_or_else(|| SessionError::MissingBackend {
            model_id: model_id.to_string(),
        })?;
        let ticket = model.ticket.ok_or_else(|| SessionError::MissingTicket {
            model_id: model_id.to_string(),
        })?;
        let access_token = model
            .access_token
            .ok_or_else(|| SessionError::MissingAccessToken {
                model_id: model_id.to_string(),
            })?;

        let config = ScopedConfig {
            base_url: backend_system.model_view_url,
            access_token: Secret::new(access_token),
        };

        let session = BackendClient::new(config.clone())
            .create_session_by_ticket(&ticket.ticket)
            .await?;

        tracing::info!(model_id, session_id = %session.session_id, "model session established");

        Ok(ModelSession { config, session })
    }
}
