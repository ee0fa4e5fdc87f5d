use std::path::Path;
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::{
    cache::{hash_key, load_bytes, store_bytes},
    client::ContentStream,
    error::Result,
    source::SourceContext,
    types::FileEntry,
};

/// Extensions Box can render previews and thumbnails for
const PREVIEW_TYPES: &[&str] = &["png", "jpg", "jpeg", "svg", "gif"];

/// A Box file presented to the host as an importable asset
#[derive(Clone)]
pub struct AssetProxy {
    entry: FileEntry,
    context: Arc<SourceContext>,
}

impl std::fmt::Debug for AssetProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssetProxy")
            .field("source", &self.context.identifier)
            .field("entry", &self.entry)
            .finish()
    }
}

impl AssetProxy {
    pub(crate) fn new(entry: FileEntry, context: Arc<SourceContext>) -> Self {
        Self { entry, context }
    }

    /// Identifier of the asset source this proxy belongs to
    pub fn asset_source_identifier(&self) -> &str {
        &self.context.identifier
    }

    /// The Box file id
    pub fn identifier(&self) -> &str {
        &self.entry.id
    }

    pub fn label(&self) -> &str {
        &self.entry.name
    }

    pub fn filename(&self) -> &str {
        &self.entry.name
    }

    pub fn last_modified(&self) -> Option<DateTime<Utc>> {
        self.entry.modified_at
    }

    pub fn file_size(&self) -> u64 {
        self.entry.size
    }

    /// Extension of the filename, without the dot; empty if there is none
    pub fn file_extension(&self) -> &str {
        Path::new(&self.entry.name)
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("")
    }

    pub fn media_type(&self) -> String {
        mime_guess::from_path(&self.entry.name)
            .first_or_octet_stream()
            .to_string()
    }

    /// Box does not report image dimensions
    pub fn width_in_pixels(&self) -> Option<u32> {
        None
    }

    pub fn height_in_pixels(&self) -> Option<u32> {
        None
    }

    pub fn entry(&self) -> &FileEntry {
        &self.entry
    }

    fn has_preview(&self) -> bool {
        let extension = self.file_extension().to_ascii_lowercase();
        PREVIEW_TYPES.contains(&extension.as_str())
    }

    fn data_uri(&self, data: &[u8]) -> String {
        format!("data:{};base64,{}", self.media_type(), STANDARD.encode(data))
    }

    /// Small inline thumbnail as a `data:` URI
    ///
    /// `None` for file types without previews or when Box has no thumbnail.
    pub async fn thumbnail_uri(&self) -> Result<Option<String>> {
        if !self.has_preview() {
            return Ok(None);
        }

        let cache = self.context.value_cache.as_ref();
        let key = format!("thumb:{}", hash_key(&self.entry.id));
        if let Some(data) = load_bytes(cache, &key).await {
            return Ok(Some(self.data_uri(&data)));
        }

        let data = match self
            .context
            .client
            .thumbnail(&self.entry.id, self.file_extension())
            .await?
        {
            Some(data) => data,
            None => return Ok(None),
        };
        store_bytes(cache, &key, data.clone()).await;
        Ok(Some(self.data_uri(&data)))
    }

    /// Full-size preview as a `data:` URI, for previewable file types
    pub async fn preview_uri(&self) -> Result<Option<String>> {
        if !self.has_preview() {
            return Ok(None);
        }

        let cache = self.context.value_cache.as_ref();
        let key = format!("preview:{}", hash_key(&self.entry.id));
        let data: Bytes = match load_bytes(cache, &key).await {
            Some(data) => data,
            None => {
                debug!(file_id = %self.entry.id, "Downloading preview");
                let data = self.context.client.file_bytes(&self.entry.id).await?;
                store_bytes(cache, &key, data.clone()).await;
                data
            }
        };
        Ok(Some(self.data_uri(&data)))
    }

    /// The original file content, for importing into the host
    pub async fn import_stream(&self) -> Result<ContentStream> {
        self.context.client.file_content(&self.entry.id).await
    }

    /// Identifier of the local asset this file was imported as, if any
    pub async fn local_asset_identifier(&self) -> Option<String> {
        self.context
            .import_ledger
            .local_asset_identifier(&self.context.identifier, &self.entry.id)
            .await
    }

    pub async fn is_imported(&self) -> bool {
        self.local_asset_identifier().await.is_some()
    }
}
