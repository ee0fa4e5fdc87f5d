//! Storage for OAuth2 credentials of Box asset sources
//!
//! Keys in the token cache:
//!
//! - `<source>`: authorization code granted by the user
//! - `<source>__access_token`: short-lived access token, stored with its TTL
//! - `<source>_tempToken`: anti-forgery state of a pending authorization
//!
//! Cache failures never propagate. Reads degrade to a miss and writes are
//! logged, so callers simply derive the value again on the next request.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, error, warn};

use crate::cache::Cache;
use crate::error::{BoxError, Result};

/// Per-source credential store on top of a [`Cache`]
#[derive(Clone)]
pub struct TokenStore {
    cache: Arc<dyn Cache>,
}

impl TokenStore {
    pub fn new(cache: Arc<dyn Cache>) -> Self {
        Self { cache }
    }

    fn access_token_key(source_id: &str) -> String {
        format!("{}__access_token", source_id)
    }

    fn state_key(source_id: &str) -> String {
        format!("{}_tempToken", source_id)
    }

    async fn read(&self, key: &str) -> Option<String> {
        match self.cache.get(key).await {
            Ok(Some(raw)) => match String::from_utf8(raw.to_vec()) {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!(key, "Ignoring non UTF-8 token cache entry");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(key, error = %e, "Token cache read failed, treating as miss");
                None
            }
        }
    }

    async fn write(&self, key: &str, value: &str, ttl: Option<Duration>) {
        let value = Bytes::copy_from_slice(value.as_bytes());
        let outcome = match ttl {
            Some(ttl) => self.cache.set_with_ttl(key, value, ttl).await,
            None => self.cache.set(key, value).await,
        };
        if let Err(e) = outcome {
            error!(key, error = %e, "Could not store token in cache");
        }
    }

    async fn delete(&self, key: &str) {
        if let Err(e) = self.cache.remove(key).await {
            error!(key, error = %e, "Could not remove token from cache");
        }
    }

    /// True if the user has granted access for this source
    pub async fn has_authorization(&self, source_id: &str) -> bool {
        self.read(source_id).await.is_some()
    }

    /// The recorded authorization code
    ///
    /// Returns `BoxError::MissingAuthorization` (without a URL) if none is on
    /// file; the client fills in the URL before surfacing the error.
    pub async fn authorization_code(&self, source_id: &str) -> Result<String> {
        self.read(source_id)
            .await
            .ok_or_else(|| BoxError::MissingAuthorization {
                source_id: source_id.to_string(),
                authorization_url: None,
            })
    }

    pub async fn set_authorization_code(&self, source_id: &str, code: &str) {
        debug!(source_id, "Storing authorization code");
        self.write(source_id, code, None).await;
    }

    /// The live access token, if one is cached and not yet expired
    pub async fn access_token(&self, source_id: &str) -> Option<String> {
        self.read(&Self::access_token_key(source_id)).await
    }

    pub async fn set_access_token(&self, source_id: &str, token: &str, ttl_seconds: u64) {
        debug!(source_id, ttl_seconds, "Storing access token");
        self.write(
            &Self::access_token_key(source_id),
            token,
            Some(Duration::from_secs(ttl_seconds)),
        )
        .await;
    }

    /// Remember the state token issued for a pending authorization
    pub async fn set_state_token(&self, source_id: &str, state: &str) {
        self.write(&Self::state_key(source_id), state, None).await;
    }

    /// Return and forget the pending state token; state tokens are single-use
    pub async fn take_state_token(&self, source_id: &str) -> Option<String> {
        let key = Self::state_key(source_id);
        let state = self.read(&key).await;
        if state.is_some() {
            self.delete(&key).await;
        }
        state
    }

    /// Drop the authorization code and any live access token
    pub async fn forget_authorization(&self, source_id: &str) {
        self.delete(source_id).await;
        self.delete(&Self::access_token_key(source_id)).await;
    }
}
