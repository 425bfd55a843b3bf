//! Bearer-authenticated platform REST API client.
//!
//! Issued by [`AuthFlow::platform_client`](crate::auth::AuthFlow::platform_client)
//! once an access token is held. Covers the two platform calls the gateway
//! peer depends on: model metadata (with embedded backend system and
//! session ticket) and the gateway endpoint configuration.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use crate::config::PlatformConfig;
use crate::store::Secret;

/// Error type for platform API operations.
#[derive(Debug, Error)]
pub enum PlatformError {
    /// Network error reaching the platform.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The platform rejected the request.
    #[error("platform API error ({status}): {message}")]
    Api { status: u16, message: String },
}

/// Embeddable fields of a model metadata request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelEmbedField {
    /// The backend system serving the model (view URL).
    BackendSystem,
    /// The opaque session ticket.
    Ticket,
    /// A model-scoped access token for backend calls.
    TokenExport,
}

impl ModelEmbedField {
    fn as_str(&self) -> &'static str {
        match self {
            Self::BackendSystem => "backend_system",
            Self::Ticket => "ticket",
            Self::TokenExport => "token_export",
        }
    }
}

/// Backend system metadata embedded in a model response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendSystem {
    /// Base URL of the backend serving this model.
    pub model_view_url: String,
}

/// Session ticket embedded in a model response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelTicket {
    /// Opaque ticket exchanged for a session at the model's backend.
    pub ticket: String,
}

/// Model metadata returned by the platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,

    /// Model-scoped access token for backend calls.
    #[serde(default)]
    pub access_token: Option<String>,

    #[serde(default)]
    pub backend_system: Option<BackendSystem>,

    #[serde(default)]
    pub ticket: Option<ModelTicket>,
}

/// Gateway endpoint configuration returned by the platform.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Named gateway endpoints; any single value is usable.
    #[serde(default)]
    pub endpoint: HashMap<String, String>,
}

impl GatewayConfig {
    /// Pick any advertised endpoint, if one exists.
    pub fn any_endpoint(&self) -> Option<&str> {
        self.endpoint.values().next().map(String::as_str)
    }
}

/// Authenticated client for the platform REST API.
#[derive(Debug, Clone)]
pub struct PlatformClient {
    config: PlatformConfig,
    access_token: Secret,
    http: reqwest::Client,
}

impl PlatformClient {
    /// Create a client from a configuration and an access token.
    pub fn new(config: PlatformConfig, access_token: Secret) -> Self {
        Self {
            config,
            access_token,
            http: reqwest::Client::new(),
        }
    }

    /// The access token this client authenticates with.
    pub fn access_token(&self) -> &Secret {
        &self.access_token
    }

    /// Fetch model metadata, embedding the requested fields.
    pub async fn get_model(
        &self,
        model_id: &str,
        embed: &[ModelEmbedField],
    ) -> Result<ModelInfo, PlatformError> {
        let embed_param = embed
            .iter()
            .map(|f| f.as_str())
            .collect::<Vec<_>>()
            .join(",");

        let response = self
            .http
            .get(format!("{}/models/{}", self.config.api_url(), model_id))
            .query(&[("embed", embed_param.as_str())])
            .bearer_auth(self.access_token.expose())
            .send()
            .await?;

        Self::json_or_api_error(response).await
    }

    /// Query the gateway endpoint configuration.
    pub async fn gateway_config(&self) -> Result<GatewayConfig, PlatformError> {
        let response = self
            .http
            .get(format!("{}/gateway/config", self.config.api_url()))
            .bearer_auth(self.access_token.expose())
            .send()
            .await?;

        Self::json_or_api_error(response).await
    }

    async fn json_or_api_error<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, PlatformError> {
        let status = response.status();
        if status.is_success() {
            Ok(response.json().await?)
        } else {
            let message = response.text().await.unwrap_or_default();
            Err(PlatformError::Api {
                status: status.as_u16(),
                message,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_info_deserializes_with_embedded_fields() {
        let json = r#"{
            "id": "m-1",
            "access_token": "scoped-token",
            "backend_system": {"model_view_url": "https://backend.example.com/view"},
            "ticket": {"ticket": "opaque-ticket"}
        }"#;

        let model: ModelInfo = serde_json::from_str(json).unwrap();
        assert_eq!(model.id, "m-1");
        assert_eq!(model.access_token.as_deref(), Some("scoped-token"));
        assert_eq!(
            model.backend_system.unwrap().model_view_url,
            "https://backend.example.com/view"
        );
        assert_eq!(model.ticket.unwrap().ticket, "opaque-ticket");
    }

    #[test]
    fn model_info_tolerates_missing_embeds() {
        let model: ModelInfo = serde_json::from_str(r#"{"id": "m-2"}"#).unwrap();
        assert!(model.backend_system.is_none());
        assert!(model.ticket.is_none());
    }

    #[test]
    fn gateway_config_picks_any_endpoint() {
        let config: GatewayConfig =
            serde_json::from_str(r#"{"endpoint": {"eu": "gw.example.com:443"}}"#).unwrap();
        assert_eq!(config.any_endpoint(), Some("gw.example.com:443"));

        let empty: GatewayConfig = serde_json::from_str(r#"{}"#).unwrap();
        assert!(empty.any_endpoint().is_none());
    }
}
