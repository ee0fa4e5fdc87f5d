//! Flat, cached index of every file below a root folder
//!
//! Box only lists one folder level at a time. [`FileIndex`] expands the tree
//! by repeatedly replacing the first folder in its working list with that
//! folder's complete listing, appended at the end, until no folder is left.
//! The finished list is cached under a key derived from the root folder id
//! and served as-is until the entry is invalidated.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};

use crate::{
    cache::{hash_key, load_json, store_json, Cache},
    error::{BoxError, Result},
    types::{FileEntry, Page},
};

/// Number of entries requested per listing call
pub const BATCH_SIZE: u64 = 100;

/// Anything that can list one page of a folder's direct children
#[async_trait]
pub trait FolderSource: Send + Sync {
    async fn list_folder(&self, folder_id: &str, limit: u64, offset: u64) -> Result<Page>;
}

/// Builds and caches the flattened listing of a folder tree
pub struct FileIndex {
    cache: Arc<dyn Cache>,
    batch_size: u64,
}

impl FileIndex {
    pub fn new(cache: Arc<dyn Cache>) -> Self {
        Self {
            cache,
            batch_size: BATCH_SIZE,
        }
    }

    /// Cache key of the index for `root_folder_id`
    pub fn cache_key(root_folder_id: &str) -> String {
        format!("index:{}", hash_key(root_folder_id))
    }

    /// All files below `root_folder_id`, from the cache or freshly built
    #[instrument(skip(self, source))]
    pub async fn all_files(
        &self,
        source: &dyn FolderSource,
        root_folder_id: &str,
    ) -> Result<Vec<FileEntry>> {
        let key = Self::cache_key(root_folder_id);
        if let Some(files) = load_json::<Vec<FileEntry>>(self.cache.as_ref(), &key).await {
            debug!(count = files.len(), "Serving folder index from cache");
            return Ok(files);
        }

        let files = self.build(source, root_folder_id).await?;
        store_json(self.cache.as_ref(), &key, &files).await;
        Ok(files)
    }

    /// Drop the cached index so the next lookup rebuilds it
    pub async fn invalidate(&self, root_folder_id: &str) -> Result<()> {
        self.cache.remove(&Self::cache_key(root_folder_id)).await
    }

    /// Expand the whole tree below `root_folder_id` into a flat file list
    pub async fn build(
        &self,
        source: &dyn FolderSource,
        root_folder_id: &str,
    ) -> Result<Vec<FileEntry>> {
        let mut expanded = HashSet::from([root_folder_id.to_string()]);
        let mut items = self.folder_items(source, root_folder_id).await?;

        // Entries before `cursor` are never folders, so the search resumes there
        let mut cursor = 0;
        while let Some(found) = items[cursor..].iter().position(FileEntry::is_folder) {
            cursor += found;
            let folder = items.remove(cursor);
            if !expanded.insert(folder.id.clone()) {
                return Err(BoxError::FolderRevisited {
                    folder_id: folder.id,
                });
            }
            let children = self.folder_items(source, &folder.id).await?;
            items.extend(children);
        }

        items.retain(FileEntry::is_file);
        info!(
            root_folder_id,
            folders = expanded.len(),
            files = items.len(),
            "Built folder index"
        );
        Ok(items)
    }

    /// Every direct child of a folder, across all pages
    ///
    /// Paging stops at the reported total or at the first empty page,
    /// whichever comes first.
    async fn folder_items(
        &self,
        source: &dyn FolderSource,
        folder_id: &str,
    ) -> Result<Vec<FileEntry>> {
        let total = source.list_folder(folder_id, 1, 0).await?.total_count;

        let mut items = Vec::new();
        let mut offset = 0;
        while offset < total {
            let page = source.list_folder(folder_id, self.batch_size, offset).await?;
            if page.entries.is_empty() {
                warn!(
                    folder_id,
                    offset,
                    total,
                    "Folder listing ended before its reported total"
                );
                break;
            }
            items.extend(page.entries);
            offset = offset.saturating_add(self.batch_size);
        }
        debug!(folder_id, total, "Listed folder");
        Ok(items)
    }
}
