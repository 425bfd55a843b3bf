//! Model-backend API client.
//!
//! Each model is served by its own backend, addressed by the view URL and
//! the model-scoped access token embedded in the platform's model metadata
//! (together the [`ScopedConfig`]). The backend exchanges the session
//! ticket for a session handle and carries the file-upload and export
//! operations the command handlers use.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use gatelink_core::store::Secret;

/// Error type for model-backend operations.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Network error reaching the backend.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The backend rejected the request.
    #[error("backend API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The upload response carried no slot for the requested parameter.
    #[error("no upload slot returned for parameter {parameter_id}")]
    MissingUploadSlot { parameter_id: String },

    /// The export computation returned no result for the requested export.
    #[error("no result returned for export {export_id}")]
    MissingExportResult { export_id: String },
}

/// Scoped API configuration for one model's backend.
#[derive(Debug, Clone)]
pub struct ScopedConfig {
    /// Base URL of the backend serving the model.
    pub base_url: String,

    /// Model-scoped access token.
    pub access_token: Secret,
}

/// A session established at a model's backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionHandle {
    pub session_id: String,

    /// Parameter definitions keyed by parameter id.
    #[serde(default)]
    pub parameters: HashMap<String, ParameterDefinition>,

    /// Export definitions keyed by export id.
    #[serde(default)]
    pub exports: HashMap<String, ExportDefinition>,
}

/// Definition of a model parameter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterDefinition {
    #[serde(rename = "type")]
    pub parameter_type: String,

    /// Accepted content types for file parameters.
    #[serde(default)]
    pub format: Option<Vec<String>>,
}

/// Definition of a model export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportDefinition {
    #[serde(rename = "type")]
    pub export_type: String,
}

impl ExportDefinition {
    /// True if this export delivers a downloadable file.
    pub fn is_download(&self) -> bool {
        self.export_type.eq_ignore_ascii_case("download")
    }
}

/// Metadata for a file about to be uploaded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileUploadQuery {
    pub size: usize,
    pub filename: String,
    pub format: String,
}

/// An upload slot issued by the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileUploadSlot {
    pub id: String,
    pub href: String,
}

#[derive(Debug, Deserialize)]
struct FileUploadResponse {
    asset: FileUploadAsset,
}

#[derive(Debug, Deserialize)]
struct FileUploadAsset {
    file: HashMap<String, FileUploadSlot>,
}

/// Export computation request: parameter values plus the exports to run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportComputeRequest {
    pub parameters: HashMap<String, serde_json::Value>,
    pub exports: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ExportComputeResponse {
    #[serde(default)]
    exports: HashMap<String, ExportResult>,
}

/// Result of one export computation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportResult {
    #[serde(default)]
    pub status_collect: Option<String>,
    #[serde(default)]
    pub status_computation: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub content: Vec<ExportContent>,
}

impl ExportResult {
    /// True when both the collect and computation phases succeeded.
    pub fn is_successful(&self) -> bool {
        let ok = |status: &Option<String>| {
            status
                .as_deref()
                .is_some_and(|s| s.eq_ignore_ascii_case("success"))
        };
        ok(&self.status_collect) && ok(&self.status_computation)
    }
}

/// One downloadable content entry of a computed export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportContent {
    pub href: String,
    #[serde(default)]
    pub size: Option<u64>,
}

/// Client for one model's backend API.
#[derive(Debug, Clone)]
pub struct BackendClient {
    config: ScopedConfig,
    http: reqwest::Client,
}

impl BackendClient {
    /// Create a client from a scoped configuration.
    pub fn new(config: ScopedConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    /// Exchange the opaque session ticket for a session handle.
    pub async fn create_session_by_ticket(
        &self,
        ticket: &str,
    ) -> Result<SessionHandle, BackendError> {
        let response = self
            .http
            .post(format!(
                "{}/session/ticket/{}",
                self.config.base_url.trim_end_matches('/'),
                ticket
            ))
            .bearer_auth(self.config.access_token.expose())
            .send()
            .await?;

        Self::json_or_api_error(response).await
    }

    /// Request an upload slot for a file parameter.
    pub async fn request_file_upload(
        &self,
        session_id: &str,
        parameter_id: &str,
        query: &FileUploadQuery,
    ) -> Result<FileUploadSlot, BackendError> {
        let body = serde_json::json!({ parameter_id: query });

        let response = self
            .http
            .post(format!(
                "{}/session/{}/file/upload",
                self.config.base_url.trim_end_matches('/'),
                session_id
            ))
            .bearer_auth(self.config.access_token.expose())
            .json(&body)
            .send()
            .await?;

        let upload: FileUploadResponse = Self::json_or_api_error(response).await?;
        upload
            .asset
            .file
            .get(parameter_id)
            .cloned()
            .ok_or_else(|| BackendError::MissingUploadSlot {
                parameter_id: parameter_id.to_string(),
            })
    }

    /// Upload file bytes to a previously issued slot.
    pub async fn upload_file(
        &self,
        href: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), BackendError> {
        let response = self
            .http
            .put(href)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(BackendError::Api {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            })
        }
    }

    /// Run an export computation and return the result for the requested
    /// export id.
    pub async fn compute_export(
        &self,
        session_id: &str,
        export_id: &str,
        request: &ExportComputeRequest,
    ) -> Result<ExportResult, BackendError> {
        let response = self
            .http
            .put(format!(
                "{}/session/{}/export",
                self.config.base_url.trim_end_matches('/'),
                session_id
            ))
            .bearer_auth(self.config.access_token.expose())
            .json(request)
            .send()
            .await?;

        let mut computed: ExportComputeResponse = Self::json_or_api_error(response).await?;
        computed
            .exports
            .remove(export_id)
            .ok_or_else(|| BackendError::MissingExportResult {
                export_id: export_id.to_string(),
            })
    }

    /// Download a file with the scoped access token.
    pub async fn download(&self, href: &str) -> Result<Vec<u8>, BackendError> {
        let response = self
            .http
            .get(href)
            .bearer_auth(self.config.access_token.expose())
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(response.bytes().await?.to_vec())
        } else {
            Err(BackendError::Api {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            })
        }
    }

    async fn json_or_api_error<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, BackendError> {
        let status = response.status();
        if status.is_success() {
            Ok(response.json().await?)
        } else {
            let message = response.text().await.unwrap_or_default();
            Err(BackendError::Api {
                status: status.as_u16(),
                message,
            })
        }
    }
}
