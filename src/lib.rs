pub mod auth;
pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod index;
pub mod proxy;
pub mod query;
pub mod repository;
pub mod source;
pub mod token;
pub mod types;

pub use auth::{AuthUrlBuilder, AuthorizationFlow};
pub use cache::{Cache, DiskCache, MemoryCache, NoCache};
pub use client::{BoxClient, ContentStream};
pub use config::{ApiEndpoints, BoxSourceOptions};
pub use error::{BoxError, Result};
pub use index::{FileIndex, FolderSource};
pub use proxy::AssetProxy;
pub use query::{AssetProxyQuery, AssetProxyQueryResult};
pub use repository::AssetProxyRepository;
pub use source::{BoxAssetSource, ImportLedger, NoImportLedger, SourceServices};
pub use token::TokenStore;
pub use types::{EntryType, FileEntry, FolderInfo, Page};
