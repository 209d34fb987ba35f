//! Shared types for the blob storage gateway
//!
//! This module contains the normalized records returned by the gateway,
//! the container bootstrap types and the error taxonomy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Content type used when neither the caller nor the service provides one
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Maximum length of an error message shown to the user
const MAX_ERROR_MESSAGE_LEN: usize = 200;

/// One remote object, as reported by the service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRecord {
    /// Full object name, may contain "/"
    pub name: String,
    /// Size in bytes
    pub size_bytes: u64,
    /// MIME type stored with the object
    pub content_type: String,
    /// Last modification time
    pub last_modified: Option<DateTime<Utc>>,
    /// Opaque version token assigned by the store
    pub etag: Option<String>,
    /// Absolute URL of the object
    pub url: String,
}

impl ObjectRecord {
    /// Last path segment of the object name
    pub fn file_name(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }
}

/// An object downloaded with its content
#[derive(Debug, Clone)]
pub struct RetrievedObject {
    pub record: ObjectRecord,
    pub content: Vec<u8>,
    /// User metadata (`x-ms-meta-*` headers, prefix stripped)
    pub metadata: BTreeMap<String, String>,
}

/// Outcome of the container bootstrap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerStatus {
    /// Container was already there
    Existing,
    /// Container was missing and has been created
    Created,
}

/// Anonymous read access level applied when the container is created
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PublicAccess {
    /// Anonymous read for blobs only
    Blob,
    /// Anonymous read for blobs and container listing
    Container,
}

impl PublicAccess {
    pub fn as_str(&self) -> &'static str {
        match self {
            PublicAccess::Blob => "blob",
            PublicAccess::Container => "container",
        }
    }
}

impl fmt::Display for PublicAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PublicAccess {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "blob" => Ok(PublicAccess::Blob),
            "container" => Ok(PublicAccess::Container),
            other => Err(StorageError::Configuration(format!(
                "Unknown public access level '{}' (expected 'blob' or 'container')",
                other
            ))),
        }
    }
}

/// Storage error type
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Invalid credential: {0}")]
    Credential(String),

    #[error("Authentication failed (HTTP {status}): {}", sanitize_api_error(.body))]
    Authentication { status: u16, body: String },

    #[error("Invalid object name: {0}")]
    InvalidName(String),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Storage request failed (HTTP {status}): {}", sanitize_api_error(.body))]
    Service { status: u16, body: String },

    #[error("Network error: {0}")]
    TransientNetwork(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    /// Map a non-success HTTP status to the error taxonomy
    pub fn from_status(status: u16, body: String, name: &str) -> Self {
        match status {
            404 => StorageError::NotFound(name.to_string()),
            401 | 403 => StorageError::Authentication { status, body },
            _ => StorageError::Service { status, body },
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
    }

    /// Check if a caller may reasonably retry the operation
    pub fn is_retryable(&self) -> bool {
        match self {
            StorageError::TransientNetwork(_) => true,
            StorageError::Service { status, .. } => is_retryable_status(*status),
            _ => false,
        }
    }

    /// HTTP status carried by the error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            StorageError::Authentication { status, .. } | StorageError::Service { status, .. } => Some(*status),
            StorageError::NotFound(_) => Some(404),
            _ => None,
        }
    }

    /// Raw response body kept for diagnostics
    pub fn raw_body(&self) -> Option<&str> {
        match self {
            StorageError::Authentication { body, .. } | StorageError::Service { body, .. } => Some(body),
            _ => None,
        }
    }
}

/// Determine if a status code is retryable
pub(crate) fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

/// Reduce a service error body to a short, single-line message.
/// Azure error bodies are XML with a `<Message>` element; anything else is truncated.
pub fn sanitize_api_error(body: &str) -> String {
    let message = match (body.find("<Message>"), body.find("</Message>")) {
        (Some(start), Some(end)) if end > start => &body[start + "<Message>".len()..end],
        _ => body,
    };
    let single_line = message.split_whitespace().collect::<Vec<_>>().join(" ");
    if single_line.chars().count() > MAX_ERROR_MESSAGE_LEN {
        let truncated: String = single_line.chars().take(MAX_ERROR_MESSAGE_LEN).collect();
        format!("{}...", truncated)
    } else {
        single_line
    }
}
