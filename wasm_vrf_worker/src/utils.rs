use crate::errors::{SerializationError, VrfWorkerError};
use base64ct::{Base64UrlUnpadded, Encoding};
use getrandom::getrandom;

// === BASE64 UTILITIES ===

/// Base64 URL encode bytes (unpadded)
pub fn base64_url_encode(bytes: &[u8]) -> String {
    Base64UrlUnpadded::encode_string(bytes)
}

/// Base64 URL decode string (unpadded)
pub fn base64_url_decode(s: &str) -> Result<Vec<u8>, VrfWorkerError> {
    Base64UrlUnpadded::decode_vec(s).map_err(|e| {
        VrfWorkerError::Serialization(SerializationError::Base64Error(e.to_string()))
    })
}

/// Generate a random 32-byte salt and return it as base64url.
/// Used as wrap_key_salt for WrapKeySeed → KEK derivation when the caller
/// does not supply one.
pub fn generate_wrap_key_salt_b64u() -> Result<String, VrfWorkerError> {
    let mut bytes = [0u8; 32];
    getrandom(&mut bytes).map_err(|e| {
        VrfWorkerError::InvalidMessageFormat(format!("Failed to generate wrapKeySalt: {}", e))
    })?;
    Ok(base64_url_encode(&bytes))
}

pub fn parse_block_height(block_height: &str) -> Result<u64, VrfWorkerError> {
    block_height.parse().map_err(|_| {
        VrfWorkerError::invalid_format(&format!("Invalid block height: {}", block_height))
    })
}
