//! HTTP transport seam
//!
//! The gateway builds fully signed [`WireRequest`]s and hands them to an
//! [`HttpTransport`]. Production uses [`ReqwestTransport`]; tests use an
//! in-memory blob service that verifies every signature.

use std::time::Duration;

use async_trait::async_trait;
use http::{HeaderMap, Method, StatusCode};
use url::Url;

use super::StorageError;

/// Default request timeout
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// A signed request ready to go on the wire
#[derive(Debug, Clone)]
pub struct WireRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
}

/// A fully buffered response
#[derive(Debug, Clone)]
pub struct WireResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl WireResponse {
    pub fn header_str(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Executes one request/response round trip. No retries.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: WireRequest) -> Result<WireResponse, StorageError>;
}

/// `reqwest`-backed transport with a bounded request timeout
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self { client }
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: WireRequest) -> Result<WireResponse, StorageError> {
        let mut builder = self.client
            .request(request.method, request.url)
            .headers(request.headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let resp = builder.send().await
            .map_err(|e| StorageError::TransientNetwork(e.to_string()))?;

        let status = resp.status();
        let headers = resp.headers().clone();
        let body = resp.bytes().await
            .map_err(|e| StorageError::TransientNetwork(format!("Failed to read response body: {}", e)))?
            .to_vec();

        Ok(WireResponse { status, headers, body })
    }
}
