//! Authenticated client for the Box REST API
//!
//! Every call acquires an access token through [`BoxClient::ensure_access_token`]
//! and fails with `BoxError::RemoteRequestFailed` on any transport error or
//! non-2xx status. Nothing is retried.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures_util::stream::{BoxStream, StreamExt, TryStreamExt};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use tracing::{debug, error, info, instrument};

use crate::{
    auth::AuthUrlBuilder,
    config::{ApiEndpoints, BoxSourceOptions},
    error::{BoxError, Result},
    index::FolderSource,
    token::TokenStore,
    types::{EntryType, FileEntry, FolderInfo, Page},
};

/// Upper bound for every remote call
const REQUEST_TIMEOUT: Duration = Duration::from_secs(2);

/// Item fields requested from folder listings
const ITEM_FIELDS: &str = "type,id,name,size,modified_at,parent";

/// Thumbnail size box in pixels
const THUMBNAIL_MIN_SIZE: u32 = 160;
const THUMBNAIL_MAX_SIZE: u32 = 240;

/// Streamed body of a file download
pub type ContentStream = BoxStream<'static, Result<Bytes>>;

#[derive(Deserialize)]
struct ApiItem {
    #[serde(rename = "type")]
    item_type: EntryType,
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    size: Option<u64>,
    #[serde(default)]
    modified_at: Option<DateTime<Utc>>,
    #[serde(default)]
    parent: Option<ApiParent>,
}

#[derive(Deserialize)]
struct ApiParent {
    id: String,
}

#[derive(Deserialize)]
struct ApiCollection {
    #[serde(default)]
    total_count: u64,
    #[serde(default)]
    entries: Vec<ApiItem>,
}

#[derive(Deserialize)]
struct ApiFolder {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    item_collection: Option<ApiCollection>,
}

#[derive(Deserialize)]
struct TokenGrant {
    access_token: String,
    expires_in: u64,
}

impl From<ApiItem> for FileEntry {
    fn from(item: ApiItem) -> Self {
        FileEntry {
            id: item.id,
            entry_type: item.item_type,
            name: item.name,
            size: item.size.unwrap_or(0),
            modified_at: item.modified_at,
            parent_folder_id: item.parent.map(|p| p.id),
        }
    }
}

impl From<ApiCollection> for Page {
    fn from(collection: ApiCollection) -> Self {
        Page {
            entries: collection.entries.into_iter().map(FileEntry::from).collect(),
            total_count: collection.total_count,
        }
    }
}

/// Box API client bound to one configured asset source
#[derive(Clone)]
pub struct BoxClient {
    http: Client,
    source_id: String,
    options: Arc<BoxSourceOptions>,
    tokens: TokenStore,
    auth_urls: Arc<dyn AuthUrlBuilder>,
    api_base_url: String,
}

impl BoxClient {
    /// Create a client for `source_id` using the process-wide endpoints
    pub fn new(
        source_id: impl Into<String>,
        options: Arc<BoxSourceOptions>,
        tokens: TokenStore,
        auth_urls: Arc<dyn AuthUrlBuilder>,
    ) -> Self {
        let http = Client::builder()
            .user_agent(concat!("box-asset-source/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            http,
            source_id: source_id.into(),
            options,
            tokens,
            auth_urls,
            api_base_url: ApiEndpoints::global().api_base_url.clone(),
        }
    }

    /// Point the client at a different API base (useful for testing)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.api_base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    /// Id of the configured root folder
    pub fn base_folder_id(&self) -> &str {
        &self.options.folder
    }

    /// Return a usable access token, minting one from the authorization code
    /// when no live token is cached
    ///
    /// A failed code exchange is logged and yields an empty token: the request
    /// then goes out unauthenticated and fails upstream.
    #[instrument(skip(self), fields(source_id = %self.source_id))]
    pub async fn ensure_access_token(&self) -> Result<String> {
        if let Some(token) = self.tokens.access_token(&self.source_id).await {
            return Ok(token);
        }

        if let Some(token) = self.options.dev_token() {
            debug!("Using configured developer token");
            return Ok(token.to_string());
        }

        let code = self
            .tokens
            .authorization_code(&self.source_id)
            .await
            .map_err(|_| self.missing_authorization())?;

        match self.exchange_code(&code).await {
            Ok(grant) => {
                self.tokens
                    .set_access_token(&self.source_id, &grant.access_token, grant.expires_in)
                    .await;
                info!(expires_in = grant.expires_in, "Obtained new access token");
                Ok(grant.access_token)
            }
            Err(e) => {
                error!(error = %e, "Request of access token returned an error");
                Ok(String::new())
            }
        }
    }

    fn missing_authorization(&self) -> BoxError {
        BoxError::MissingAuthorization {
            source_id: self.source_id.clone(),
            authorization_url: Some(self.auth_urls.request_token_url(&self.source_id)),
        }
    }

    async fn exchange_code(&self, code: &str) -> Result<TokenGrant> {
        let refresh_failed = |e: reqwest::Error| BoxError::TokenRefreshFailed {
            message: e.to_string(),
        };

        let form = [
            ("grant_type", "authorization_code"),
            ("client_id", self.options.client_id.as_str()),
            ("client_secret", self.options.client_secret.as_str()),
            ("code", code),
        ];

        self.http
            .post(&self.options.authentication_url)
            .form(&form)
            .send()
            .await
            .and_then(Response::error_for_status)
            .map_err(refresh_failed)?
            .json::<TokenGrant>()
            .await
            .map_err(refresh_failed)
    }

    /// Send an authenticated GET and reject non-2xx responses
    async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<Response> {
        let token = self.ensure_access_token().await?;
        let url = format!("{}{}", self.api_base_url, path);

        let mut request = self.http.get(&url).bearer_auth(token);
        if !query.is_empty() {
            request = request.query(query);
        }

        let response = request.send().await?;
        match response.status() {
            status if status.is_success() => Ok(response),
            status => {
                let message = response.text().await.unwrap_or_default();
                debug!(%url, %status, "Box API returned an error");
                Err(BoxError::RemoteRequestFailed {
                    status: Some(status.as_u16()),
                    message,
                })
            }
        }
    }

    /// Search files by name or content
    #[instrument(skip(self), fields(source_id = %self.source_id))]
    pub async fn search(
        &self,
        query: &str,
        limit: u64,
        offset: u64,
        file_extensions: &[&str],
        fields: &[&str],
    ) -> Result<Page> {
        let mut params = vec![
            ("query", query.to_string()),
            ("type", "file".to_string()),
            ("limit", limit.to_string()),
            ("offset", offset.to_string()),
        ];
        if !fields.is_empty() {
            params.push(("fields", fields.join(",")));
        }
        if !file_extensions.is_empty() {
            params.push(("file_extensions", file_extensions.join(",")));
        }

        let collection: ApiCollection = self.get("/search", &params).await?.json().await?;
        Ok(collection.into())
    }

    /// One page of a folder's direct children, newest first
    #[instrument(skip(self), fields(source_id = %self.source_id))]
    pub async fn list_folder(&self, folder_id: &str, limit: u64, offset: u64) -> Result<Page> {
        let params = [
            ("limit", limit.to_string()),
            ("offset", offset.to_string()),
            ("sort", "date".to_string()),
            ("fields", ITEM_FIELDS.to_string()),
        ];

        let path = format!("/folders/{}/items", folder_id);
        let collection: ApiCollection = self.get(&path, &params).await?.json().await?;
        Ok(collection.into())
    }

    #[instrument(skip(self), fields(source_id = %self.source_id))]
    pub async fn folder_info(&self, folder_id: &str) -> Result<FolderInfo> {
        let folder: ApiFolder = self
            .get(&format!("/folders/{}", folder_id), &[])
            .await?
            .json()
            .await?;

        Ok(FolderInfo {
            id: folder.id,
            name: folder.name,
            item_count: folder.item_collection.map_or(0, |c| c.total_count),
        })
    }

    #[instrument(skip(self), fields(source_id = %self.source_id))]
    pub async fn file_info(&self, file_id: &str) -> Result<FileEntry> {
        let item: ApiItem = self
            .get(&format!("/files/{}", file_id), &[])
            .await?
            .json()
            .await?;
        Ok(item.into())
    }

    /// Stream the binary content of a file
    #[instrument(skip(self), fields(source_id = %self.source_id))]
    pub async fn file_content(&self, file_id: &str) -> Result<ContentStream> {
        let response = self.get(&format!("/files/{}/content", file_id), &[]).await?;
        Ok(response.bytes_stream().map_err(BoxError::from).boxed())
    }

    /// Download the whole content of a file
    pub async fn file_bytes(&self, file_id: &str) -> Result<Bytes> {
        let response = self.get(&format!("/files/{}/content", file_id), &[]).await?;
        Ok(response.bytes().await?)
    }

    /// Fetch a 160-240px thumbnail
    ///
    /// Returns `Ok(None)` when Box cannot provide one (upstream error, or the
    /// thumbnail is still being generated). Missing authorization still fails.
    #[instrument(skip(self), fields(source_id = %self.source_id))]
    pub async fn thumbnail(&self, file_id: &str, extension: &str) -> Result<Option<Bytes>> {
        let params = [
            ("min_height", THUMBNAIL_MIN_SIZE.to_string()),
            ("min_width", THUMBNAIL_MIN_SIZE.to_string()),
            ("max_height", THUMBNAIL_MAX_SIZE.to_string()),
            ("max_width", THUMBNAIL_MAX_SIZE.to_string()),
        ];
        let path = format!("/files/{}/thumbnail.{}", file_id, extension);

        let response = match self.get(&path, &params).await {
            Ok(response) => response,
            Err(BoxError::RemoteRequestFailed { status, message }) => {
                debug!(?status, %message, "No thumbnail available");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        if response.status() == StatusCode::ACCEPTED {
            debug!("Thumbnail is not generated yet");
            return Ok(None);
        }

        match response.bytes().await {
            Ok(data) if !data.is_empty() => Ok(Some(data)),
            Ok(_) => Ok(None),
            Err(e) => {
                debug!(error = %e, "Thumbnail download failed");
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl FolderSource for BoxClient {
    async fn list_folder(&self, folder_id: &str, limit: u64, offset: u64) -> Result<Page> {
        BoxClient::list_folder(self, folder_id, limit, offset).await
    }
}
