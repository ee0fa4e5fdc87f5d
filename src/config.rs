//! Typed configuration for a Box asset source
//!
//! The host hands each source an options mapping; [`BoxSourceOptions`] is its
//! typed form and is validated once when the source is created. Endpoint URLs
//! are process-wide and live in [`ApiEndpoints`].

use std::sync::OnceLock;

use reqwest::Url;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{BoxError, Result};

/// Box REST API base
pub const DEFAULT_API_BASE_URL: &str = "https://api.box.com/2.0";

/// Box OAuth2 authorization endpoint the user agent is redirected to
pub const DEFAULT_AUTHORIZE_URL: &str = "https://account.box.com/api/oauth2/authorize";

/// Box OAuth2 token endpoint
pub const DEFAULT_TOKEN_URL: &str = "https://api.box.com/oauth2/token";

/// Options of one configured Box asset source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoxSourceOptions {
    /// Human readable label shown by the host
    pub label: String,
    /// Id of the root folder whose subtree is exposed
    #[serde(deserialize_with = "folder_id")]
    pub folder: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    /// Token endpoint used to exchange authorization codes
    #[serde(default = "default_authentication_url")]
    pub authentication_url: String,
    /// Bypass OAuth2 and use `dev_token` for every request
    #[serde(default)]
    pub use_dev_token: bool,
    #[serde(default)]
    pub dev_token: Option<String>,
}

fn default_authentication_url() -> String {
    DEFAULT_TOKEN_URL.to_string()
}

/// Folder ids show up as numbers in most host configs
fn folder_id<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(u64),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(id) => id,
        RawId::Number(id) => id.to_string(),
    })
}

impl BoxSourceOptions {
    /// Parse options from JSON and validate them
    pub fn from_json(json: &str) -> Result<Self> {
        let options: Self = serde_json::from_str(json)?;
        options.validate()?;
        Ok(options)
    }

    /// Check that the options describe a usable source
    pub fn validate(&self) -> Result<()> {
        if self.label.trim().is_empty() {
            return Err(invalid("label must not be empty"));
        }
        if self.folder.is_empty() || !self.folder.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid(format!(
                "folder must be a numeric Box folder id, got '{}'",
                self.folder
            )));
        }

        if self.use_dev_token {
            if self.dev_token().is_none() {
                return Err(invalid("useDevToken is set but devToken is empty"));
            }
            return Ok(());
        }

        if self.client_id.is_empty() || self.client_secret.is_empty() {
            return Err(invalid("clientId and clientSecret are required"));
        }
        match Url::parse(&self.authentication_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(()),
            _ => Err(invalid(format!(
                "authenticationUrl is not an http(s) URL: '{}'",
                self.authentication_url
            ))),
        }
    }

    /// The developer token, if the dev-token override is active
    pub fn dev_token(&self) -> Option<&str> {
        if !self.use_dev_token {
            return None;
        }
        self.dev_token.as_deref().filter(|token| !token.is_empty())
    }
}

fn invalid(message: impl Into<String>) -> BoxError {
    BoxError::InvalidConfig {
        message: message.into(),
    }
}

/// Remote endpoint URLs shared by every source in the process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiEndpoints {
    pub api_base_url: String,
    pub authorize_url: String,
}

impl Default for ApiEndpoints {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            authorize_url: DEFAULT_AUTHORIZE_URL.to_string(),
        }
    }
}

static GLOBAL_ENDPOINTS: OnceLock<ApiEndpoints> = OnceLock::new();

impl ApiEndpoints {
    /// Install the process-wide endpoints. Must happen before first use.
    pub fn install(self) -> Result<()> {
        GLOBAL_ENDPOINTS
            .set(self)
            .map_err(|_| invalid("API endpoints are already installed"))
    }

    /// The process-wide endpoints, Box defaults unless installed otherwise
    pub fn global() -> &'static ApiEndpoints {
        GLOBAL_ENDPOINTS.get_or_init(ApiEndpoints::default)
    }
}
