// === CONFIGURATION CONSTANTS ===
// Configuration values for the WASM signer worker

/// Change this constant and recompile to adjust logging verbosity
/// Available levels: Error, Warn, Info, Debug, Trace
pub const CURRENT_LOG_LEVEL: log::Level = log::Level::Info;

// === CRYPTOGRAPHIC CONSTANTS ===

/// ChaCha20Poly1305 nonce size in bytes (96 bits)
pub const CHACHA20_NONCE_SIZE: usize = 12;

/// ChaCha20 key size in bytes (256 bits)
pub const CHACHA20_KEY_SIZE: usize = 32;

/// Ed25519 private key seed size in bytes
pub const ED25519_PRIVATE_KEY_SIZE: usize = 32;

/// HKDF info prefix for NEAR signing key derivation from PRF output.
/// The full info string is "<prefix><account_id>/<device_number>".
pub const NEAR_KEY_HKDF_INFO_PREFIX: &str = "w3a/near/v1/";

/// Constant used for HKDF info when deriving the KEK from WrapKeySeed
pub const NEAR_KEK_INFO: &[u8] = b"near-kek";

/// Maximum signing session age in milliseconds (5 minutes). The host
/// terminates the reserved worker at the same deadline to zeroize.
pub const SESSION_MAX_DURATION_MS: f64 = 5.0 * 60.0 * 1000.0;

/// How long a signer handler waits for WrapKeySeed delivery on the session
/// port before giving up (ms)
pub const WRAP_KEY_SEED_TIMEOUT_MS: u32 = 2000;

/// NEP-413 signable message discriminant (2^31 + 413)
pub const NEP413_SIGNABLE_TAG: u32 = (1u32 << 31) + 413;

/// NEP-366 delegate action discriminant (2^30 + 366)
pub const DELEGATE_ACTION_SIGNABLE_TAG: u32 = (1u32 << 30) + 366;

/// Gas attached to the link-device registration call
pub const LINK_DEVICE_REGISTRATION_GAS: u64 = 30_000_000_000_000;

// === ERROR MESSAGES ===

/// Error message for invalid key size
pub const ERROR_INVALID_KEY_SIZE: &str = "Invalid key size for ChaCha20Poly1305";

// === UTILITY FUNCTIONS ===

/// HKDF info string binding a NEAR key to one account and device slot
pub fn near_key_hkdf_info(account_id: &str, device_number: u8) -> String {
    format!("{}{}/{}", NEAR_KEY_HKDF_INFO_PREFIX, account_id, device_number)
}

/// Current time in milliseconds since the epoch.
#[cfg(target_arch = "wasm32")]
pub fn now_ms() -> f64 {
    js_sys::Date::now()
}

#[cfg(not(target_arch = "wasm32"))]
pub fn now_ms() -> f64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as f64)
        .unwrap_or(0.0)
}
