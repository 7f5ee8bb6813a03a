use base64ct::{Base64, Base64UrlUnpadded, Encoding};

// === ENCODING HELPERS ===

/// Base64 URL encode bytes (unpadded)
pub fn base64_url_encode(bytes: &[u8]) -> String {
    Base64UrlUnpadded::encode_string(bytes)
}

/// Base64 URL decode string (unpadded)
pub fn base64_url_decode(s: &str) -> Result<Vec<u8>, String> {
    Base64UrlUnpadded::decode_vec(s).map_err(|e| format!("Base64 decode error: {}", e))
}

/// Standard (padded) base64 encode, used for NEAR RPC args
pub fn base64_standard_encode(bytes: &[u8]) -> String {
    Base64::encode_string(bytes)
}

/// Standard (padded) base64 decode
pub fn base64_standard_decode(s: &str) -> Result<Vec<u8>, String> {
    Base64::decode_vec(s).map_err(|e| format!("Base64 decode error: {}", e))
}
