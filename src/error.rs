use thiserror::Error;

/// Errors that can occur while talking to Box or serving assets from it
#[derive(Error, Debug)]
pub enum BoxError {
    /// No authorization code on file; the user has to (re-)grant access
    #[error(
        "You must authorize box.com access for {source_id}{}",
        .authorization_url.as_deref().map(|url| format!(": {}", url)).unwrap_or_default()
    )]
    MissingAuthorization {
        source_id: String,
        authorization_url: Option<String>,
    },

    #[error("Remote request failed{}: {message}", .status.map(|s| format!(" with status {}", s)).unwrap_or_default())]
    RemoteRequestFailed { status: Option<u16>, message: String },

    #[error("Token refresh failed: {message}")]
    TokenRefreshFailed { message: String },

    #[error("Folder {folder_id} was listed twice while building the index")]
    FolderRevisited { folder_id: String },

    #[error("Authorization state token does not match for {source_id}")]
    InvalidState { source_id: String },

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Cache error: {message}")]
    Cache { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl BoxError {
    /// True for errors the host should surface as a "please authorize" link
    pub fn is_missing_authorization(&self) -> bool {
        matches!(self, BoxError::MissingAuthorization { .. })
    }
}

impl From<reqwest::Error> for BoxError {
    fn from(err: reqwest::Error) -> Self {
        BoxError::RemoteRequestFailed {
            status: err.status().map(|s| s.as_u16()),
            message: err.to_string(),
        }
    }
}

/// Result type alias for Box operations
pub type Result<T> = std::result::Result<T, BoxError>;
