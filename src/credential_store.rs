// Blobshelf Credential Store
// Parses the storage connection string into an immutable account credential.
// The account key stays inside a SecretString and is only decoded while signing.

use std::str::FromStr;

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use secrecy::{ExposeSecret, SecretSlice, SecretString};
use url::Url;

use crate::providers::StorageError;

const DEFAULT_PROTOCOL: &str = "https";
const DEFAULT_ENDPOINT_SUFFIX: &str = "core.windows.net";

/// Storage account identity and shared key
#[derive(Debug, Clone)]
pub struct Credential {
    account_name: String,
    account_key: SecretString,
}

impl Credential {
    pub fn new(account_name: impl Into<String>, account_key: impl Into<String>) -> Self {
        Self {
            account_name: account_name.into(),
            account_key: SecretString::from(account_key.into()),
        }
    }

    pub fn account_name(&self) -> &str {
        &self.account_name
    }

    pub fn account_key(&self) -> &SecretString {
        &self.account_key
    }

    /// Decode the base64 account key into raw HMAC key bytes.
    pub fn decode_key(&self) -> Result<SecretSlice<u8>, StorageError> {
        let bytes = BASE64
            .decode(self.account_key.expose_secret().trim())
            .map_err(|e| StorageError::Credential(format!("Account key is not valid base64: {}", e)))?;
        if bytes.is_empty() {
            return Err(StorageError::Credential("Account key is empty".to_string()));
        }
        Ok(SecretSlice::from(bytes))
    }
}

/// Parsed `Key=Value;Key=Value` storage connection string
#[derive(Debug, Clone)]
pub struct ConnectionString {
    credential: Credential,
    protocol: String,
    endpoint_suffix: String,
    blob_endpoint: Option<String>,
}

impl ConnectionString {
    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    pub fn account_name(&self) -> &str {
        self.credential.account_name()
    }

    /// Get the blob service endpoint URL
    pub fn blob_endpoint(&self) -> Result<Url, StorageError> {
        let raw = match self.blob_endpoint {
            Some(ref ep) => {
                // Ensure custom endpoint has a scheme
                if ep.starts_with("http://") || ep.starts_with("https://") {
                    ep.clone()
                } else {
                    format!("{}://{}", self.protocol, ep)
                }
            }
            None => format!(
                "{}://{}.blob.{}",
                self.protocol, self.credential.account_name, self.endpoint_suffix
            ),
        };
        Url::parse(&raw)
            .map_err(|e| StorageError::Configuration(format!("Invalid blob endpoint '{}': {}", raw, e)))
    }
}

impl FromStr for ConnectionString {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut account_name = None;
        let mut account_key = None;
        let mut protocol = None;
        let mut endpoint_suffix = None;
        let mut blob_endpoint = None;

        for part in s.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            // Keys may be padded with '=', so split on the first one only
            let Some((key, value)) = part.split_once('=') else {
                return Err(StorageError::Configuration(format!(
                    "Malformed connection string segment without '=': '{}'",
                    part.chars().take(32).collect::<String>()
                )));
            };
            let value = value.trim().to_string();
            match key.trim() {
                "AccountName" => account_name = Some(value),
                "AccountKey" => account_key = Some(value),
                "DefaultEndpointsProtocol" => protocol = Some(value),
                "EndpointSuffix" => endpoint_suffix = Some(value),
                "BlobEndpoint" => blob_endpoint = Some(value.trim_end_matches('/').to_string()),
                _ => {}
            }
        }

        let account_name = account_name
            .filter(|v| !v.is_empty())
            .ok_or_else(|| StorageError::Configuration("Could not extract AccountName from connection string".to_string()))?;
        let account_key = account_key
            .filter(|v| !v.is_empty())
            .ok_or_else(|| StorageError::Configuration("Could not extract AccountKey from connection string".to_string()))?;

        Ok(Self {
            credential: Credential::new(account_name, account_key),
            protocol: protocol.unwrap_or_else(|| DEFAULT_PROTOCOL.to_string()),
            endpoint_suffix: endpoint_suffix.unwrap_or_else(|| DEFAULT_ENDPOINT_SUFFIX.to_string()),
            blob_endpoint,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "c2VjcmV0LWtleS1ieXRlcy1mb3ItdGVzdGluZw==";

    #[test]
    fn test_parse_standard_connection_string() {
        let cs: ConnectionString = format!(
            "DefaultEndpointsProtocol=https;AccountName=acme;AccountKey={};EndpointSuffix=core.windows.net",
            KEY
        )
        .parse()
        .unwrap();

        assert_eq!(cs.account_name(), "acme");
        assert_eq!(cs.credential().account_key().expose_secret(), KEY);
        assert_eq!(cs.blob_endpoint().unwrap().as_str(), "https://acme.blob.core.windows.net/");
    }

    #[test]
    fn test_parse_emulator_endpoint() {
        let cs: ConnectionString = format!(
            "DefaultEndpointsProtocol=http;AccountName=devstoreaccount1;AccountKey={};BlobEndpoint=http://127.0.0.1:10000/devstoreaccount1/;",
            KEY
        )
        .parse()
        .unwrap();

        let endpoint = cs.blob_endpoint().unwrap();
        assert_eq!(endpoint.scheme(), "http");
        assert_eq!(endpoint.path(), "/devstoreaccount1");
    }

    #[test]
    fn test_missing_fields_are_configuration_errors() {
        let err = "AccountName=acme".parse::<ConnectionString>().unwrap_err();
        assert!(matches!(err, StorageError::Configuration(ref m) if m.contains("AccountKey")));

        let err = format!("AccountKey={}", KEY).parse::<ConnectionString>().unwrap_err();
        assert!(matches!(err, StorageError::Configuration(ref m) if m.contains("AccountName")));

        assert!("garbage".parse::<ConnectionString>().is_err());
    }

    #[test]
    fn test_debug_redacts_key() {
        let credential = Credential::new("acme", KEY);
        let printed = format!("{:?}", credential);
        assert!(printed.contains("acme"));
        assert!(!printed.contains(KEY));
    }

    #[test]
    fn test_decode_key() {
        let credential = Credential::new("acme", KEY);
        let key = credential.decode_key().unwrap();
        assert_eq!(key.expose_secret(), b"secret-key-bytes-for-testing");

        let bad = Credential::new("acme", "not base64 !!");
        assert!(matches!(bad.decode_key(), Err(StorageError::Credential(_))));
    }
}
