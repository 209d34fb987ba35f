//! Azure Blob Storage gateway
//!
//! Implements ObjectStore for one container using the Blob REST API and
//! Shared Key authentication.
//!
//! ## Behaviour notes
//! - Construction performs no I/O; call `initialize()` once at startup to
//!   probe the container and create it when missing.
//! - Listing issues a single request. A truncated enumeration is logged, not followed.
//! - No retries here. Callers decide (see `retry::with_retry`).

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use http::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE, ETAG, LAST_MODIFIED};
use http::StatusCode;
use tracing::{debug, info, warn};
use url::Url;

use super::blob_list::{parse_http_date, BlobListParser, XmlBlobListParser};
use super::canonical::{canonicalize, RequestMethod, SignableRequest};
use super::signer::sign;
use super::transport::{HttpTransport, ReqwestTransport, WireRequest, WireResponse};
use super::{
    ContainerStatus, ObjectRecord, ObjectStore, PublicAccess, RetrievedObject, StorageError,
    DEFAULT_CONTENT_TYPE,
};
use crate::config::StorageConfig;
use crate::credential_store::Credential;

/// Azure API version
pub const API_VERSION: &str = "2021-12-02";

/// User metadata response header prefix
const META_HEADER_PREFIX: &str = "x-ms-meta-";

fn invalid_header(e: impl std::fmt::Display) -> StorageError {
    StorageError::Parse(format!("Invalid header value: {}", e))
}

/// Percent-encode each segment of a blob name, keeping "/" separators
fn encode_blob_name(name: &str) -> String {
    name.trim_start_matches('/')
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

fn encode_query(query: &[(String, String)]) -> String {
    query.iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

fn validate_name(name: &str) -> Result<(), StorageError> {
    if name.trim_matches('/').is_empty() {
        return Err(StorageError::InvalidName("Object name must not be empty".to_string()));
    }
    // URL normalization would drop these segments after signing
    if name.split('/').any(|segment| segment == "." || segment == "..") {
        return Err(StorageError::InvalidName(format!("Object name '{}' contains a '.' or '..' segment", name)));
    }
    Ok(())
}

/// Azure Blob Storage gateway
pub struct AzureBlobGateway<T: HttpTransport = ReqwestTransport> {
    credential: Credential,
    endpoint: Url,
    container: String,
    public_access: Option<PublicAccess>,
    transport: T,
    parser: Box<dyn BlobListParser>,
}

impl AzureBlobGateway<ReqwestTransport> {
    /// Build a gateway with the reqwest transport from loaded configuration
    pub fn from_config(config: &StorageConfig) -> Result<Self, StorageError> {
        let connection = config.connection();
        let transport = ReqwestTransport::new(config.request_timeout());
        Ok(Self::new(
            connection.credential().clone(),
            connection.blob_endpoint()?,
            config.container(),
            transport,
        )
        .with_public_access(config.public_access()))
    }
}

impl<T: HttpTransport> AzureBlobGateway<T> {
    pub fn new(credential: Credential, endpoint: Url, container: impl Into<String>, transport: T) -> Self {
        Self {
            credential,
            endpoint,
            container: container.into(),
            public_access: None,
            transport,
            parser: Box::new(XmlBlobListParser),
        }
    }

    /// Substitute the enumeration parser
    pub fn with_parser(mut self, parser: impl BlobListParser + 'static) -> Self {
        self.parser = Box::new(parser);
        self
    }

    /// Access level requested when `initialize()` has to create the container
    pub fn with_public_access(mut self, access: Option<PublicAccess>) -> Self {
        self.public_access = access;
        self
    }

    pub fn container(&self) -> &str {
        &self.container
    }

    pub fn account_name(&self) -> &str {
        self.credential.account_name()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// URL path of the container, including any path-style endpoint prefix
    fn container_path(&self) -> String {
        format!(
            "{}/{}",
            self.endpoint.path().trim_end_matches('/'),
            urlencoding::encode(&self.container)
        )
    }

    fn blob_path(&self, name: &str) -> String {
        format!("{}/{}", self.container_path(), encode_blob_name(name))
    }

    /// Absolute URL of an object
    pub fn object_url(&self, name: &str) -> String {
        let mut url = self.endpoint.clone();
        url.set_path(&self.blob_path(name));
        url.set_query(None);
        url.to_string()
    }

    /// Stamp, sign and send one request.
    async fn execute(
        &self,
        method: RequestMethod,
        resource_path: String,
        query: &[(&str, &str)],
        mut headers: HeaderMap,
        body: Option<Vec<u8>>,
    ) -> Result<WireResponse, StorageError> {
        let now = Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string();
        headers.insert("x-ms-date", HeaderValue::from_str(&now).map_err(invalid_header)?);
        headers.insert("x-ms-version", HeaderValue::from_static(API_VERSION));

        let signable = SignableRequest {
            method,
            resource_path,
            query: query.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            headers,
            body_length: body.as_ref().map(|b| b.len() as u64).unwrap_or(0),
        };
        let authorization = sign(&canonicalize(self.credential.account_name(), &signable), &self.credential)?;

        let SignableRequest { resource_path, query, mut headers, .. } = signable;
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&authorization).map_err(invalid_header)?);

        let mut url = self.endpoint.clone();
        url.set_path(&resource_path);
        if query.is_empty() {
            url.set_query(None);
        } else {
            url.set_query(Some(&encode_query(&query)));
        }

        debug!("{} {}", method, resource_path);
        let resp = self.transport.send(WireRequest {
            method: method.into(),
            url,
            headers,
            body,
        }).await?;
        debug!("{} {} -> HTTP {}", method, resource_path, resp.status.as_u16());

        Ok(resp)
    }

    /// Probe the container and create it when the probe reports 404.
    /// Any other failure is returned and should abort startup.
    pub async fn initialize(&self) -> Result<ContainerStatus, StorageError> {
        let path = self.container_path();
        let query = [("restype", "container")];

        let probe = self.execute(RequestMethod::Head, path.clone(), &query, HeaderMap::new(), None).await?;
        if probe.status.is_success() {
            info!("Container '{}' exists on account '{}'", self.container, self.account_name());
            return Ok(ContainerStatus::Existing);
        }
        if probe.status != StatusCode::NOT_FOUND {
            return Err(StorageError::from_status(probe.status.as_u16(), probe.body_text(), &self.container));
        }

        info!("Container '{}' not found, creating it", self.container);
        let mut headers = HeaderMap::new();
        if let Some(access) = self.public_access {
            headers.insert("x-ms-blob-public-access", HeaderValue::from_static(access.as_str()));
        }
        // Bodiless PUT still needs an explicit Content-Length
        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("0"));

        let created = self.execute(RequestMethod::Put, path, &query, headers, None).await?;
        if !created.status.is_success() {
            return Err(StorageError::from_status(created.status.as_u16(), created.body_text(), &self.container));
        }

        info!("Created container '{}'", self.container);
        Ok(ContainerStatus::Created)
    }
}

#[async_trait]
impl<T: HttpTransport> ObjectStore for AzureBlobGateway<T> {
    async fn put(&self, name: &str, content: Vec<u8>, content_type: &str) -> Result<ObjectRecord, StorageError> {
        validate_name(name)?;
        let size = content.len() as u64;
        let content_type = if content_type.trim().is_empty() { DEFAULT_CONTENT_TYPE } else { content_type };

        let mut headers = HeaderMap::new();
        headers.insert("x-ms-blob-type", HeaderValue::from_static("BlockBlob"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_str(content_type).map_err(invalid_header)?);
        headers.insert(CONTENT_LENGTH, HeaderValue::from(size));

        let resp = self.execute(RequestMethod::Put, self.blob_path(name), &[], headers, Some(content)).await?;
        if !resp.status.is_success() {
            return Err(StorageError::from_status(resp.status.as_u16(), resp.body_text(), name));
        }

        info!("Uploaded '{}' ({} bytes)", name, size);
        Ok(ObjectRecord {
            name: name.to_string(),
            size_bytes: size,
            content_type: content_type.to_string(),
            last_modified: resp.header_str(LAST_MODIFIED.as_str()).and_then(parse_http_date),
            etag: resp.header_str(ETAG.as_str()).map(str::to_string),
            url: self.object_url(name),
        })
    }

    async fn get(&self, name: &str) -> Result<RetrievedObject, StorageError> {
        validate_name(name)?;
        let resp = self.execute(RequestMethod::Get, self.blob_path(name), &[], HeaderMap::new(), None).await?;
        if !resp.status.is_success() {
            return Err(StorageError::from_status(resp.status.as_u16(), resp.body_text(), name));
        }

        let metadata: BTreeMap<String, String> = resp.headers.iter()
            .filter_map(|(key, value)| {
                let key = key.as_str().strip_prefix(META_HEADER_PREFIX)?;
                Some((key.to_string(), value.to_str().ok()?.to_string()))
            })
            .collect();

        let size_bytes = resp.header_str(CONTENT_LENGTH.as_str())
            .and_then(|s| s.parse().ok())
            .unwrap_or(resp.body.len() as u64);

        let record = ObjectRecord {
            name: name.to_string(),
            size_bytes,
            content_type: resp.header_str(CONTENT_TYPE.as_str()).unwrap_or(DEFAULT_CONTENT_TYPE).to_string(),
            last_modified: resp.header_str(LAST_MODIFIED.as_str()).and_then(parse_http_date),
            etag: resp.header_str(ETAG.as_str()).map(str::to_string),
            url: self.object_url(name),
        };

        Ok(RetrievedObject { record, content: resp.body, metadata })
    }

    async fn delete(&self, name: &str) -> Result<(), StorageError> {
        validate_name(name)?;
        let resp = self.execute(RequestMethod::Delete, self.blob_path(name), &[], HeaderMap::new(), None).await?;
        if !resp.status.is_success() {
            return Err(StorageError::from_status(resp.status.as_u16(), resp.body_text(), name));
        }

        info!("Deleted '{}'", name);
        Ok(())
    }

    async fn list(&self, prefix: Option<&str>) -> Result<Vec<ObjectRecord>, StorageError> {
        let mut query = vec![("restype", "container"), ("comp", "list")];
        if let Some(p) = prefix.filter(|p| !p.is_empty()) {
            query.push(("prefix", p));
        }

        let resp = self.execute(RequestMethod::Get, self.container_path(), &query, HeaderMap::new(), None).await?;
        if !resp.status.is_success() {
            return Err(StorageError::from_status(resp.status.as_u16(), resp.body_text(), &self.container));
        }

        let listing = self.parser.parse(&resp.body_text())?;
        if listing.next_marker.is_some() {
            warn!(
                "Listing of '{}' was truncated by the service after {} records",
                self.container,
                listing.records.len()
            );
        }

        Ok(listing.records.into_iter()
            .map(|mut record| {
                record.url = self.object_url(&record.name);
                record
            })
            .collect())
    }
}
