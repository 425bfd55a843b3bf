//! Platform configuration handling.

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default platform base URL.
const DEFAULT_PLATFORM_URL: &str = "https://platform.gatelink.dev";

/// OAuth client id registered for Gatelink with the platform.
const DEFAULT_CLIENT_ID: &str = "8c1f41d2-5bc0-4e8e-9a44-1f6f3f0f2b7e";

/// Redirect URI for the loopback callback listener.
const DEFAULT_REDIRECT_URI: &str = "http://localhost:8787/callback";

/// Configuration for the platform connection and the OAuth client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformConfig {
    /// Base URL of the platform (authorization server + REST API).
    pub platform_url: String,

    /// OAuth client identifier.
    pub client_id: String,

    /// Redirect URI registered for this client.
    pub redirect_uri: String,

    /// Path to the configuration file that was loaded.
    #[serde(skip)]
    pub config_path: PathBuf,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            platform_url: DEFAULT_PLATFORM_URL.to_string(),
            client_id: DEFAULT_CLIENT_ID.to_string(),
            redirect_uri: DEFAULT_REDIRECT_URI.to_string(),
            config_path: PathBuf::new(),
        }
    }
}

impl PlatformConfig {
    /// Create a configuration pointing at a specific platform base URL,
    /// keeping the default client id and redirect URI.
    ///
    /// Mainly useful for tests pointing at a local mock server.
    pub fn for_platform(platform_url: impl Into<String>) -> Self {
        Self {
            platform_url: platform_url.into(),
            ..Self::default()
        }
    }

    /// The OAuth authorization endpoint.
    pub fn authorize_endpoint(&self) -> String {
        format!("{}/oauth/authorize", self.platform_url.trim_end_matches('/'))
    }

    /// The OAuth token endpoint.
    pub fn token_endpoint(&self) -> String {
        format!("{}/oauth/token", self.platform_url.trim_end_matches('/'))
    }

    /// Base URL for platform REST API calls.
    pub fn api_url(&self) -> String {
        format!("{}/api/v1", self.platform_url.trim_end_matches('/'))
    }
}

/// Load configuration from the default location or create defaults.
pub fn load_config() -> Result<PlatformConfig> {
    let dirs = project_dirs();
    let config_path = dirs
        .as_ref()
        .map(|d| d.config_dir().join("gatelink.toml"))
        .unwrap_or_else(|| PathBuf::from("gatelink.toml"));

    let mut config = if config_path.exists() {
        let contents = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config from {:?}", config_path))?;
        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config from {:?}", config_path))?
    } else {
        PlatformConfig::default()
    };

    config.config_path = config_path;

    Ok(config)
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("dev", "gatelink", "gatelink")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_derive_from_platform_url() {
        let config = PlatformConfig::for_platform("https://platform.example.com/");
        assert_eq!(
            config.authorize_endpoint(),
            "https://platform.example.com/oauth/authorize"
        );
        assert_eq!(
            config.token_endpoint(),
            "https://platform.example.com/oauth/token"
        );
        assert_eq!(config.api_url(), "https://platform.example.com/api/v1");
    }

    #[test]
    fn config_round_trips_through_toml() {
        let config = PlatformConfig::for_platform("https://dev.example.com");
        let serialized = toml::to_string(&config).unwrap();
        let parsed: PlatformConfig = toml::from_str(&serialized).unwrap();
        assert_eq!(parsed.platform_url, "https://dev.example.com");
        assert_eq!(parsed.client_id, config.client_id);
    }
}
