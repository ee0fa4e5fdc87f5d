//! OAuth2 authorization code handshake with Box
//!
//! The host routes two requests here: one that starts the flow and redirects
//! the user agent to Box, and the callback Box redirects back to with the
//! authorization code. The code is then exchanged lazily by
//! [`BoxClient`](crate::client::BoxClient) on the next API call.

use std::sync::Arc;

use reqwest::Url;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    config::{ApiEndpoints, BoxSourceOptions},
    error::{BoxError, Result},
    token::TokenStore,
};

/// Host-side URLs of the authorization endpoints for a source
pub trait AuthUrlBuilder: Send + Sync {
    /// Absolute URL that starts the authorization flow
    fn request_token_url(&self, source_id: &str) -> String;

    /// Absolute URL Box redirects back to with the authorization code
    fn callback_url(&self, source_id: &str) -> String;
}

/// Drives the authorization code grant for one source
pub struct AuthorizationFlow {
    source_id: String,
    options: Arc<BoxSourceOptions>,
    tokens: TokenStore,
    auth_urls: Arc<dyn AuthUrlBuilder>,
    authorize_url: String,
}

impl AuthorizationFlow {
    pub fn new(
        source_id: impl Into<String>,
        options: Arc<BoxSourceOptions>,
        tokens: TokenStore,
        auth_urls: Arc<dyn AuthUrlBuilder>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            options,
            tokens,
            auth_urls,
            authorize_url: ApiEndpoints::global().authorize_url.clone(),
        }
    }

    /// Use a different Box authorization endpoint
    pub fn with_authorize_url(mut self, url: impl Into<String>) -> Self {
        self.authorize_url = url.into();
        self
    }

    /// Issue a fresh state token and build the URL to redirect the user agent to
    pub async fn request_token(&self) -> Result<Url> {
        let state = Uuid::new_v4().to_string();
        self.tokens.set_state_token(&self.source_id, &state).await;

        let mut url = Url::parse(&self.authorize_url).map_err(|e| BoxError::InvalidConfig {
            message: format!("Invalid authorize URL '{}': {}", self.authorize_url, e),
        })?;
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.options.client_id)
            .append_pair("redirect_uri", &self.auth_urls.callback_url(&self.source_id))
            .append_pair("state", &state);

        info!(source_id = %self.source_id, "Redirecting to Box for authorization");
        Ok(url)
    }

    /// Handle the callback: check the state and record the authorization code
    ///
    /// The state must match the one issued by the last [`request_token`]
    /// call and can only be used once.
    ///
    /// [`request_token`]: AuthorizationFlow::request_token
    pub async fn receive_token(&self, code: &str, state: &str) -> Result<()> {
        match self.tokens.take_state_token(&self.source_id).await {
            Some(expected) if expected == state => {}
            _ => {
                warn!(
                    source_id = %self.source_id,
                    "Rejecting authorization callback with unknown state"
                );
                return Err(BoxError::InvalidState {
                    source_id: self.source_id.clone(),
                });
            }
        }

        self.tokens.set_authorization_code(&self.source_id, code).await;
        info!(source_id = %self.source_id, "Stored Box authorization code");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use std::collections::HashMap;

    struct TestUrls;

    impl AuthUrlBuilder for TestUrls {
        fn request_token_url(&self, source_id: &str) -> String {
            format!("https://cms.example/{}/request-token", source_id)
        }

        fn callback_url(&self, source_id: &str) -> String {
            format!("https://cms.example/{}/receive-token", source_id)
        }
    }

    fn flow() -> (AuthorizationFlow, TokenStore) {
        let options = BoxSourceOptions {
            label: "Box".to_string(),
            folder: "1".to_string(),
            client_id: "client-id".to_string(),
            client_secret: "secret".to_string(),
            authentication_url: "https://api.box.com/oauth2/token".to_string(),
            use_dev_token: false,
            dev_token: None,
        };
        let tokens = TokenStore::new(Arc::new(MemoryCache::new()));
        let flow = AuthorizationFlow::new(
            "box",
            Arc::new(options),
            tokens.clone(),
            Arc::new(TestUrls),
        );
        (flow, tokens)
    }

    fn query(url: &Url) -> HashMap<String, String> {
        url.query_pairs().into_owned().collect()
    }

    #[tokio::test]
    async fn test_request_token_url() {
        let (flow, _) = flow();
        let url = flow.request_token().await.unwrap();

        assert_eq!(url.host_str(), Some("account.box.com"));
        assert_eq!(url.path(), "/api/oauth2/authorize");

        let params = query(&url);
        assert_eq!(params["response_type"], "code");
        assert_eq!(params["client_id"], "client-id");
        assert_eq!(params["redirect_uri"], "https://cms.example/box/receive-token");
        assert!(Uuid::parse_str(&params["state"]).is_ok());
    }

    #[tokio::test]
    async fn test_receive_token_with_matching_state() {
        let (flow, tokens) = flow();
        let url = flow.request_token().await.unwrap();
        let state = query(&url)["state"].clone();

        flow.receive_token("auth-code", &state).await.unwrap();
        assert_eq!(tokens.authorization_code("box").await.unwrap(), "auth-code");
    }

    #[tokio::test]
    async fn test_receive_token_rejects_forged_or_replayed_state() {
        let (flow, tokens) = flow();

        // No flow started
        assert!(matches!(
            flow.receive_token("code", "anything").await,
            Err(BoxError::InvalidState { .. })
        ));

        let url = flow.request_token().await.unwrap();
        let state = query(&url)["state"].clone();

        assert!(matches!(
            flow.receive_token("code", "forged").await,
            Err(BoxError::InvalidState { .. })
        ));
        // The failed attempt consumed the state
        assert!(matches!(
            flow.receive_token("code", &state).await,
            Err(BoxError::InvalidState { .. })
        ));
        assert!(!tokens.has_authorization("box").await);
    }

    #[tokio::test]
    async fn test_each_request_issues_a_new_state() {
        let (flow, _) = flow();
        let first = query(&flow.request_token().await.unwrap())["state"].clone();
        let second = query(&flow.request_token().await.unwrap())["state"].clone();
        assert_ne!(first, second);

        // Only the latest state is accepted
        assert!(flow.receive_token("code", &first).await.is_err());
    }
}
