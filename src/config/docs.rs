//! Protocol documentation configuration

use serde::Deserialize;

use crate::application::DocsInfo;

use super::error::ValidationError;

/// Settings for the generated protocol document
#[derive(Debug, Clone, Deserialize)]
pub struct DocsConfig {
    /// Serve the document over HTTP
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default = "default_title")]
    pub title: String,

    #[serde(default = "default_version")]
    pub version: String,

    pub description: Option<String>,

    /// Public WebSocket base URL listed as the document's server
    pub server_url: Option<String>,
}

impl DocsConfig {
    pub fn docs_info(&self) -> DocsInfo {
        DocsInfo {
            title: self.title.clone(),
            version: self.version.clone(),
            description: self.description.clone(),
            server_url: self.server_url.clone(),
        }
    }

    /// Validate documentation configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.title.trim().is_empty() {
            return Err(ValidationError::MissingRequired("DOCS__TITLE"));
        }
        if let Some(url) = &self.server_url {
            if !url.starts_with("ws://") && !url.starts_with("wss://") {
                return Err(ValidationError::InvalidServerUrl(url.clone()));
            }
        }
        Ok(())
    }
}

impl Default for DocsConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            title: default_title(),
            version: default_version(),
            description: None,
            server_url: None,
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_title() -> String {
    "Switchboard API".to_string()
}

fn default_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}
