//! Storage Providers Module
//!
//! This module provides the signed gateway to the remote blob store and the
//! pieces it is built from.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │             ObjectStore Trait               │
//! │        put, get, delete, list(prefix)       │
//! └─────────────────────────────────────────────┘
//!                      │
//!             ┌────────▼─────────┐
//!             │ AzureBlobGateway │── BlobListParser (XML)
//!             └────────┬─────────┘
//!        canonicalize ─┤─ sign
//!             ┌────────▼─────────┐
//!             │  HttpTransport   │  reqwest / in-memory
//!             └──────────────────┘
//! ```

pub mod types;
pub mod canonical;
pub mod signer;
pub mod blob_list;
pub mod transport;
pub mod azure;

pub use types::*;
pub use azure::AzureBlobGateway;
pub use blob_list::{BlobListParser, BlobListing, XmlBlobListParser};
pub use canonical::{canonicalize, CanonicalString, RequestMethod, SignableRequest};
pub use signer::sign;
pub use transport::{HttpTransport, ReqwestTransport, WireRequest, WireResponse};

use async_trait::async_trait;

/// Unified object store trait
///
/// Every call is a single independent request against the remote store.
/// Implementations never retry and never cache content.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Upload (or overwrite) an object
    async fn put(&self, name: &str, content: Vec<u8>, content_type: &str) -> Result<ObjectRecord, StorageError>;

    /// Download an object with its metadata
    async fn get(&self, name: &str) -> Result<RetrievedObject, StorageError>;

    /// Delete an object
    async fn delete(&self, name: &str) -> Result<(), StorageError>;

    /// List objects, optionally restricted to names starting with `prefix`
    async fn list(&self, prefix: Option<&str>) -> Result<Vec<ObjectRecord>, StorageError>;
}
