// Blobshelf - Azure Blob Storage document client
// Shared Key signed gateway, folder projection of the flat namespace and a lazy tree view

pub mod config;
pub mod credential_store;
pub mod namespace;
pub mod providers;
pub mod retry;
pub mod tree_view;

pub use config::{Settings, StorageConfig};
pub use credential_store::{ConnectionString, Credential};
pub use namespace::{FolderListing, FolderNode, NamespaceProjection};
pub use providers::{AzureBlobGateway, ObjectRecord, ObjectStore, StorageError};
pub use retry::{with_retry, RetryPolicy};
pub use tree_view::{FolderLoader, LazyTreeController, StoreFolderLoader};
