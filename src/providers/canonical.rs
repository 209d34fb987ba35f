//! Shared Key canonical request builder
//!
//! Produces the string-to-sign for the Blob service Shared Key scheme:
//!
//! ```text
//! VERB\n
//! Content-Encoding\n
//! Content-Language\n
//! Content-Length\n      (empty when the body is empty)
//! Content-MD5\n
//! Content-Type\n
//! Date\n
//! If-Modified-Since\n
//! If-Match\n
//! If-None-Match\n
//! If-Unmodified-Since\n
//! Range\n
//! CanonicalizedHeaders\n
//! CanonicalizedResource
//! ```

use std::borrow::Cow;
use std::fmt;

use http::header::{
    HeaderMap, HeaderName, CONTENT_ENCODING, CONTENT_LANGUAGE, CONTENT_TYPE, DATE,
    IF_MATCH, IF_MODIFIED_SINCE, IF_NONE_MATCH, IF_UNMODIFIED_SINCE, RANGE,
};

/// Vendor header prefix covered by the canonicalized headers block
pub const VENDOR_HEADER_PREFIX: &str = "x-ms-";

/// Content-MD5 has no constant in the `http` crate
const CONTENT_MD5: &str = "content-md5";

/// HTTP verbs used by the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestMethod {
    Get,
    Put,
    Delete,
    Head,
}

impl RequestMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestMethod::Get => "GET",
            RequestMethod::Put => "PUT",
            RequestMethod::Delete => "DELETE",
            RequestMethod::Head => "HEAD",
        }
    }
}

impl From<RequestMethod> for http::Method {
    fn from(method: RequestMethod) -> Self {
        match method {
            RequestMethod::Get => http::Method::GET,
            RequestMethod::Put => http::Method::PUT,
            RequestMethod::Delete => http::Method::DELETE,
            RequestMethod::Head => http::Method::HEAD,
        }
    }
}

impl fmt::Display for RequestMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request metadata covered by the signature. Built fresh for every call.
#[derive(Debug, Clone)]
pub struct SignableRequest {
    pub method: RequestMethod,
    /// URL path as sent on the wire (already percent-encoded)
    pub resource_path: String,
    /// Decoded query parameters
    pub query: Vec<(String, String)>,
    pub headers: HeaderMap,
    pub body_length: u64,
}

/// The string-to-sign. Contents are never printed by `Debug`.
#[derive(Clone, PartialEq, Eq)]
pub struct CanonicalString(String);

impl CanonicalString {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for CanonicalString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CanonicalString({} bytes)", self.0.len())
    }
}

/// Build the canonicalized resource: `/{account}{path}` plus one
/// `\n{key}:{value}` line per query parameter, sorted by lowercased key.
pub fn canonical_resource(account_name: &str, resource_path: &str, query: &[(String, String)]) -> String {
    let mut resource = format!("/{}{}", account_name, resource_path);

    let mut params: Vec<(String, &str)> = query
        .iter()
        .map(|(k, v)| (k.to_lowercase(), v.as_str()))
        .collect();
    params.sort();

    for (key, value) in params {
        resource.push('\n');
        resource.push_str(&key);
        resource.push(':');
        resource.push_str(value);
    }
    resource
}

/// Build canonicalized headers string from a HeaderMap.
/// Collects all `x-ms-*` headers, sorts them alphabetically,
/// and joins them as `headername:value` lines without a trailing newline.
pub fn canonical_headers(headers: &HeaderMap) -> String {
    let mut vendor_headers: Vec<(String, String)> = headers
        .iter()
        .filter_map(|(name, value)| {
            let name_lower = name.as_str().to_lowercase();
            if !name_lower.starts_with(VENDOR_HEADER_PREFIX) {
                return None;
            }
            let value = String::from_utf8_lossy(value.as_bytes()).trim().to_string();
            Some((name_lower, value))
        })
        .collect();
    vendor_headers.sort();

    vendor_headers
        .iter()
        .map(|(k, v)| format!("{}:{}", k, v))
        .collect::<Vec<_>>()
        .join("\n")
}

fn header_field<'a>(headers: &'a HeaderMap, name: &HeaderName) -> Cow<'a, str> {
    headers
        .get(name)
        .map(|v| String::from_utf8_lossy(v.as_bytes()))
        .unwrap_or_default()
}

/// Produce the string-to-sign for a request.
pub fn canonicalize(account_name: &str, request: &SignableRequest) -> CanonicalString {
    let headers = &request.headers;
    let content_md5 = HeaderName::from_static(CONTENT_MD5);
    let body_length = if request.body_length > 0 {
        request.body_length.to_string()
    } else {
        String::new()
    };

    let fields: [Cow<'_, str>; 12] = [
        Cow::Borrowed(request.method.as_str()),
        header_field(headers, &CONTENT_ENCODING),
        header_field(headers, &CONTENT_LANGUAGE),
        Cow::Borrowed(body_length.as_str()),
        header_field(headers, &content_md5),
        header_field(headers, &CONTENT_TYPE),
        header_field(headers, &DATE),
        header_field(headers, &IF_MODIFIED_SINCE),
        header_field(headers, &IF_MATCH),
        header_field(headers, &IF_NONE_MATCH),
        header_field(headers, &IF_UNMODIFIED_SINCE),
        header_field(headers, &RANGE),
    ];

    let mut out = fields.join("\n");
    out.push('\n');
    out.push_str(&canonical_headers(headers));
    out.push('\n');
    out.push_str(&canonical_resource(account_name, &request.resource_path, &request.query));

    CanonicalString(out)
}
