/// Configuration constants for the VRF worker
///
/// This module centralizes configuration to ensure consistency
/// and make updates easier.

// === LOGGING CONFIGURATION ===

/// Log level for the VRF worker
/// Change this constant and recompile to adjust logging verbosity
/// Available levels: Error, Warn, Info, Debug, Trace
pub const CURRENT_LOG_LEVEL: log::Level = log::Level::Info;

// === CRYPTOGRAPHIC CONSTANTS ===

/// Domain separator for VRF challenge generation
/// Ensures VRF challenges cannot be replayed across different contexts
pub const VRF_CHALLENGE_DOMAIN: &[u8] = b"w3a/vrf/challenge/v1";

/// HKDF info prefix for deterministic VRF seed derivation from PRF output.
/// The full info string is this prefix followed by the account id.
pub const VRF_KEYPAIR_HKDF_INFO_PREFIX: &str = "w3a/vrf/v1/";

/// HKDF info string for ChaCha20 key derivation from PRF output
pub const HKDF_CHACHA20_KEY_INFO: &[u8] = b"vrf-chacha20-key";

/// Constant used for HKDF info when deriving K_pass_auth from PRF.first
pub const VRF_WRAP_PASS_INFO: &[u8] = b"vrf-wrap-pass";

/// Constant used for HKDF info when deriving WrapKeySeed
pub const NEAR_WRAP_SEED_INFO: &[u8] = b"near-wrap-seed";

// === ENCRYPTION PARAMETERS ===

/// ChaCha20Poly1305 key size in bytes (256 bits)
pub const CHACHA20_KEY_SIZE: usize = 32;

/// ChaCha20Poly1305 nonce/IV size in bytes (96 bits)
pub const CHACHA20_NONCE_SIZE: usize = 12;

/// VRF seed size in bytes for deterministic generation (256 bits)
pub const VRF_SEED_SIZE: usize = 32;

/// HKDF info string for deriving the AEAD key from the Shamir 3-pass KEK (K)
/// Namespaced context string to avoid collisions across schemes/usages
pub const SHAMIR_AEAD_HKDF_INFO: &[u8] = b"w3a-shamir3pass-kek-to-aead-key-v1";

// === SHAMIR 3-PASS CONFIGURATION ===

/// The fixed safe prime p for Z/pZ* arithmetic: the 2048-bit MODP group from
/// RFC 3526 §3. Both client and relay compile this in; `/shamir/key-info`
/// responses must agree with it or the engine refuses to run.
pub const SHAMIR_P_HEX: &str = "\
FFFFFFFFFFFFFFFFC90FDAA22168C234C4C6628B80DC1CD129024E088A67CC74\
020BBEA63B139B22514A08798E3404DDEF9519B3CD3A431B302B0A6DF25F1437\
4FE1356D6D51C245E485B576625E7EC6F44C42E9A637ED6B0BFF5CB6F406B7ED\
EE386BFB5A899FA5AE9F24117C4B1FE649286651ECE45B3DC2007CB8A163BF05\
98DA48361C55D39A69163FA8FD24CF5F83655D23DCA3AD961C62F356208552BB\
9ED529077096966D670C354E4ABC9804F1746C08CA18217C32905E462E36CE3B\
E39E772C180E86039B2783A2EC07A28FB5C55DF06F4C52C9DE2BCBF695581718\
3995497CEA956AE515D2261898FA051015728E5A8AACAA68FFFFFFFFFFFFFFFF";

/// Generator for the Shamir group
pub const SHAMIR_G: u32 = 2;

/// Minimum prime size in bits accepted for a configured Shamir prime
pub const SHAMIR_MIN_PRIME_BITS: usize = 2048;

/// Maximum number of rejection sampling attempts for random exponent generation
pub const SHAMIR_REJECTION_SAMPLING_MAX_ATTEMPTS: u32 = 32;

/// Extra bytes to generate during rejection sampling to reduce modular bias
pub const SHAMIR_RANDOM_BYTES_OVERHEAD: usize = 64;

// === VRF SESSION DEFAULTS ===

/// Default VRF session TTL (ms) for reusing a WebAuthn-derived WrapKeySeed.
/// Session enforcement is VRF-owned; signer workers remain one-shot.
pub const VRF_SESSION_DEFAULT_TTL_MS: f64 = 5.0 * 60.0 * 1000.0;

/// Default maximum number of WrapKeySeed dispenses per VRF session.
pub const VRF_SESSION_DEFAULT_MAX_USES: u32 = 5;

/// Number of characters to show when displaying truncated keys/hashes in logs
pub const DISPLAY_TRUNCATE_LENGTH: usize = 20;

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
