use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::{
    auth::{AuthUrlBuilder, AuthorizationFlow},
    cache::Cache,
    client::BoxClient,
    config::{ApiEndpoints, BoxSourceOptions},
    error::{BoxError, Result},
    index::FileIndex,
    repository::AssetProxyRepository,
    token::TokenStore,
};

/// Host record of assets that were already imported from a remote source
#[async_trait]
pub trait ImportLedger: Send + Sync {
    /// Identifier of the local asset imported from `remote_asset_id`, if any
    async fn local_asset_identifier(
        &self,
        source_id: &str,
        remote_asset_id: &str,
    ) -> Option<String>;
}

/// Ledger for hosts that do not track imports
pub struct NoImportLedger;

#[async_trait]
impl ImportLedger for NoImportLedger {
    async fn local_asset_identifier(
        &self,
        _source_id: &str,
        _remote_asset_id: &str,
    ) -> Option<String> {
        None
    }
}

/// Collaborators the host provides to every source
#[derive(Clone)]
pub struct SourceServices {
    /// Short string values with TTL: authorization codes, access tokens, states
    pub token_cache: Arc<dyn Cache>,
    /// Structured values: folder indexes, file metadata, thumbnails, previews
    pub value_cache: Arc<dyn Cache>,
    pub auth_urls: Arc<dyn AuthUrlBuilder>,
    pub import_ledger: Arc<dyn ImportLedger>,
}

/// Everything a source hands down to its repository, queries and proxies
pub(crate) struct SourceContext {
    pub(crate) identifier: String,
    pub(crate) options: Arc<BoxSourceOptions>,
    pub(crate) client: BoxClient,
    pub(crate) index: FileIndex,
    pub(crate) value_cache: Arc<dyn Cache>,
    pub(crate) import_ledger: Arc<dyn ImportLedger>,
    tokens: TokenStore,
    auth_urls: Arc<dyn AuthUrlBuilder>,
    authorize_url: String,
}

/// A read-only asset source backed by one Box folder tree
#[derive(Clone)]
pub struct BoxAssetSource {
    context: Arc<SourceContext>,
}

impl BoxAssetSource {
    /// Create a source from the host's configuration
    ///
    /// The identifier must match `^[a-z][a-z0-9-]{0,62}[a-z]$`.
    pub fn create_from_configuration(
        identifier: &str,
        options: BoxSourceOptions,
        services: SourceServices,
    ) -> Result<Self> {
        Self::create_with_endpoints(identifier, options, services, ApiEndpoints::global().clone())
    }

    /// Like [`create_from_configuration`](Self::create_from_configuration),
    /// talking to explicit endpoints instead of the process-wide ones
    pub fn create_with_endpoints(
        identifier: &str,
        options: BoxSourceOptions,
        services: SourceServices,
        endpoints: ApiEndpoints,
    ) -> Result<Self> {
        validate_identifier(identifier)?;
        options.validate()?;

        let options = Arc::new(options);
        let tokens = TokenStore::new(services.token_cache);
        let client = BoxClient::new(
            identifier,
            options.clone(),
            tokens.clone(),
            services.auth_urls.clone(),
        )
        .with_base_url(endpoints.api_base_url);

        debug!(identifier, folder = %options.folder, "Created Box asset source");

        Ok(Self {
            context: Arc::new(SourceContext {
                identifier: identifier.to_string(),
                options,
                client,
                index: FileIndex::new(services.value_cache.clone()),
                value_cache: services.value_cache,
                import_ledger: services.import_ledger,
                tokens,
                auth_urls: services.auth_urls,
                authorize_url: endpoints.authorize_url,
            }),
        })
    }

    pub fn identifier(&self) -> &str {
        &self.context.identifier
    }

    pub fn label(&self) -> &str {
        &self.context.options.label
    }

    /// Box assets can only be imported, never written back
    pub fn is_read_only(&self) -> bool {
        true
    }

    pub fn options(&self) -> &BoxSourceOptions {
        &self.context.options
    }

    pub fn asset_proxy_repository(&self) -> AssetProxyRepository {
        AssetProxyRepository::new(self.context.clone())
    }

    /// The OAuth2 handshake that authorizes this source
    pub fn authorization_flow(&self) -> AuthorizationFlow {
        AuthorizationFlow::new(
            self.context.identifier.clone(),
            self.context.options.clone(),
            self.context.tokens.clone(),
            self.context.auth_urls.clone(),
        )
        .with_authorize_url(self.context.authorize_url.clone())
    }

    /// True once the user has granted access
    pub async fn is_authorized(&self) -> bool {
        self.context.options.dev_token().is_some()
            || self.context.tokens.has_authorization(&self.context.identifier).await
    }

    /// Drop the stored authorization and access token
    pub async fn disconnect(&self) {
        self.context
            .tokens
            .forget_authorization(&self.context.identifier)
            .await;
    }

    /// Throw away the cached folder index; the next listing rebuilds it
    pub async fn refresh_index(&self) -> Result<()> {
        self.context.index.invalidate(&self.context.options.folder).await
    }

    /// The underlying API client
    pub fn client(&self) -> &BoxClient {
        &self.context.client
    }
}

fn validate_identifier(identifier: &str) -> Result<()> {
    let bytes = identifier.as_bytes();
    let valid = (2..=64).contains(&bytes.len())
        && bytes[0].is_ascii_lowercase()
        && bytes[bytes.len() - 1].is_ascii_lowercase()
        && bytes
            .iter()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || *b == b'-');

    if valid {
        Ok(())
    } else {
        Err(BoxError::InvalidConfig {
            message: format!("Invalid asset source identifier '{}'", identifier),
        })
    }
}
