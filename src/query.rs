//! Paginated and searchable views over a Box asset source
//!
//! Without a search term a query slices the cached folder index. With one, it
//! runs a live Box search and never consults the index.

use std::sync::Arc;

use tokio::sync::OnceCell;

use crate::{error::Result, proxy::AssetProxy, source::SourceContext, types::FileEntry};

/// Page size when the host does not set one
pub const DEFAULT_LIMIT: usize = 20;

#[derive(Clone)]
pub struct AssetProxyQuery {
    context: Arc<SourceContext>,
    limit: usize,
    offset: usize,
    search_term: Option<String>,
}

impl AssetProxyQuery {
    pub(crate) fn new(context: Arc<SourceContext>) -> Self {
        Self {
            context,
            limit: DEFAULT_LIMIT,
            offset: 0,
            search_term: None,
        }
    }

    pub fn set_limit(&mut self, limit: usize) {
        self.limit = limit;
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn set_offset(&mut self, offset: usize) {
        self.offset = offset;
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    /// An empty term means no search
    pub fn set_search_term(&mut self, term: impl Into<String>) {
        let term = term.into();
        self.search_term = if term.is_empty() { None } else { Some(term) };
    }

    pub fn search_term(&self) -> Option<&str> {
        self.search_term.as_deref()
    }

    /// Lazily evaluated result; nothing is fetched until it is read
    pub fn execute(&self) -> AssetProxyQueryResult {
        AssetProxyQueryResult::new(self.clone())
    }

    async fn full_index(&self) -> Result<Vec<FileEntry>> {
        let context = &self.context;
        context
            .index
            .all_files(&context.client, &context.options.folder)
            .await
    }

    /// The entries of the current page
    pub async fn array_result(&self) -> Result<Vec<AssetProxy>> {
        if self.limit == 0 {
            return Ok(Vec::new());
        }

        let entries = match &self.search_term {
            None => self
                .full_index()
                .await?
                .into_iter()
                .skip(self.offset)
                .take(self.limit)
                .collect(),
            Some(term) => {
                self.context
                    .client
                    .search(term, self.limit as u64, self.offset as u64, &[], &[])
                    .await?
                    .entries
            }
        };

        Ok(entries
            .into_iter()
            .map(|entry| AssetProxy::new(entry, self.context.clone()))
            .collect())
    }

    /// Number of matching assets across all pages
    pub async fn count(&self) -> Result<u64> {
        match &self.search_term {
            None => Ok(self.full_index().await?.len() as u64),
            Some(term) => Ok(self
                .context
                .client
                .search(term, 1, 0, &[], &[])
                .await?
                .total_count),
        }
    }
}

/// Result of [`AssetProxyQuery::execute`]
///
/// Fetches its page once, on first access. Execute the query again (see
/// [`query`](Self::query)) to get fresh results.
pub struct AssetProxyQueryResult {
    query: AssetProxyQuery,
    proxies: OnceCell<Vec<AssetProxy>>,
}

impl AssetProxyQueryResult {
    fn new(query: AssetProxyQuery) -> Self {
        Self {
            query,
            proxies: OnceCell::new(),
        }
    }

    async fn proxies(&self) -> Result<&[AssetProxy]> {
        self.proxies
            .get_or_try_init(|| self.query.array_result())
            .await
            .map(Vec::as_slice)
    }

    /// A copy of the query that produced this result
    pub fn query(&self) -> AssetProxyQuery {
        self.query.clone()
    }

    pub async fn first(&self) -> Result<Option<AssetProxy>> {
        Ok(self.proxies().await?.first().cloned())
    }

    pub async fn get(&self, position: usize) -> Result<Option<AssetProxy>> {
        Ok(self.proxies().await?.get(position).cloned())
    }

    pub async fn to_vec(&self) -> Result<Vec<AssetProxy>> {
        Ok(self.proxies().await?.to_vec())
    }

    pub async fn iter(&self) -> Result<std::slice::Iter<'_, AssetProxy>> {
        Ok(self.proxies().await?.iter())
    }

    /// Size of the fetched page, or the query's total if nothing was fetched yet
    pub async fn count(&self) -> Result<u64> {
        match self.proxies.get() {
            Some(proxies) => Ok(proxies.len() as u64),
            None => self.query.count().await,
        }
    }
}
