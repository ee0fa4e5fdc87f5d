use std::sync::Arc;

use tracing::debug;

use crate::{
    cache::{hash_key, load_json, store_json},
    error::Result,
    proxy::AssetProxy,
    query::{AssetProxyQuery, AssetProxyQueryResult},
    source::SourceContext,
    types::FileEntry,
};

/// Entry point for looking up and listing the assets of one source
#[derive(Clone)]
pub struct AssetProxyRepository {
    context: Arc<SourceContext>,
}

impl AssetProxyRepository {
    pub(crate) fn new(context: Arc<SourceContext>) -> Self {
        Self { context }
    }

    /// Look up a single file; its metadata is cached after the first call
    pub async fn get_asset_proxy(&self, identifier: &str) -> Result<AssetProxy> {
        let cache = self.context.value_cache.as_ref();
        let key = format!("file:{}", hash_key(identifier));

        let entry = match load_json::<FileEntry>(cache, &key).await {
            Some(entry) => entry,
            None => {
                debug!(file_id = identifier, "Fetching file info");
                let entry = self.context.client.file_info(identifier).await?;
                store_json(cache, &key, &entry).await;
                entry
            }
        };
        Ok(AssetProxy::new(entry, self.context.clone()))
    }

    /// A fresh query over the whole source
    pub fn query(&self) -> AssetProxyQuery {
        AssetProxyQuery::new(self.context.clone())
    }

    pub fn find_all(&self) -> AssetProxyQueryResult {
        self.query().execute()
    }

    pub fn find_by_search_term(&self, search_term: &str) -> AssetProxyQueryResult {
        let mut query = self.query();
        query.set_search_term(search_term);
        query.execute()
    }

    /// Number of direct children of the root folder, as reported by Box
    pub async fn count_all(&self) -> Result<u64> {
        let page = self
            .context
            .client
            .list_folder(&self.context.options.folder, 1, 0)
            .await?;
        Ok(page.total_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::source::test_support::{file, seeded_source};

    #[tokio::test]
    async fn test_get_asset_proxy_uses_cached_file_info() {
        let cache = Arc::new(MemoryCache::new());
        let key = format!("file:{}", hash_key("55"));
        store_json(cache.as_ref(), &key, &file("55", "cached.gif")).await;
        let source = seeded_source(cache, &[]).await;

        let proxy = source
            .asset_proxy_repository()
            .get_asset_proxy("55")
            .await
            .unwrap();
        assert_eq!(proxy.identifier(), "55");
        assert_eq!(proxy.filename(), "cached.gif");
    }

    #[tokio::test]
    async fn test_uncached_lookup_reports_remote_failure() {
        let source = seeded_source(Arc::new(MemoryCache::new()), &[]).await;

        let result = source.asset_proxy_repository().get_asset_proxy("56").await;
        assert!(matches!(
            result,
            Err(crate::error::BoxError::RemoteRequestFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_find_by_search_term_sets_term() {
        let source = seeded_source(Arc::new(MemoryCache::new()), &[]).await;
        let repository = source.asset_proxy_repository();

        let result = repository.find_by_search_term("logo");
        assert_eq!(result.query().search_term(), Some("logo"));
        assert_eq!(repository.find_all().query().search_term(), None);
    }
}
