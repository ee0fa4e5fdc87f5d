use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A file, folder or web link as listed by Box
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Box item id
    pub id: String,
    /// Kind of item
    pub entry_type: EntryType,
    /// File or folder name, including the extension for files
    pub name: String,
    /// Size in bytes; zero when the listing did not report it
    pub size: u64,
    /// Last modification time, when reported
    pub modified_at: Option<DateTime<Utc>>,
    /// Id of the containing folder, when reported
    pub parent_folder_id: Option<String>,
}

impl FileEntry {
    pub fn is_folder(&self) -> bool {
        self.entry_type == EntryType::Folder
    }

    pub fn is_file(&self) -> bool {
        self.entry_type == EntryType::File
    }
}

/// Type of Box item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    File,
    Folder,
    WebLink,
}

/// One page of a folder listing or a search
#[derive(Debug, Clone, Default)]
pub struct Page {
    /// Entries on this page
    pub entries: Vec<FileEntry>,
    /// Total number of entries across all pages, as reported by Box
    pub total_count: u64,
}

/// Summary of a folder from `GET /folders/{id}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderInfo {
    pub id: String,
    pub name: String,
    /// Number of direct children
    pub item_count: u64,
}
