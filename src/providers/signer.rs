//! Shared Key request signer

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use hmac::{Hmac, Mac};
use secrecy::ExposeSecret;
use sha2::Sha256;

use super::canonical::CanonicalString;
use super::StorageError;
use crate::credential_store::Credential;

type HmacSha256 = Hmac<Sha256>;

/// Authorization scheme name
pub const SHARED_KEY_SCHEME: &str = "SharedKey";

/// Compute the `Authorization` header value for a canonical string.
pub fn sign(canonical: &CanonicalString, credential: &Credential) -> Result<String, StorageError> {
    let key = credential.decode_key()?;

    let mut mac = HmacSha256::new_from_slice(key.expose_secret())
        .map_err(|e| StorageError::Credential(format!("HMAC error: {}", e)))?;
    mac.update(canonical.as_str().as_bytes());
    let signature = BASE64.encode(mac.finalize().into_bytes());

    Ok(format!("{} {}:{}", SHARED_KEY_SCHEME, credential.account_name(), signature))
}
