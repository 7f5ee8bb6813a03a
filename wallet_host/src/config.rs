// === CONFIGURATION CONSTANTS ===
// Tunables for the wallet host: router protocol, nonce freshness, worker
// pool sizing, and confirmation defaults.

/// Change this constant and recompile to adjust logging verbosity
pub const CURRENT_LOG_LEVEL: log::Level = log::Level::Info;

// === ROUTER / WIRE PROTOCOL ===

/// Protocol version embedded in the READY handshake
pub const WALLET_PROTOCOL_VERSION: u32 = 2;

/// Default per-request timeout (ms) when the caller supplies none
pub const DEFAULT_REQUEST_TIMEOUT_MS: f64 = 60_000.0;

// === NONCE MANAGER FRESHNESS ===

/// Reserved nonce / access-key info considered fresh for this long (ms)
pub const NONCE_TTL_MS: f64 = 5_000.0;

/// Block hash/height considered fresh for this long (ms)
pub const BLOCK_TTL_MS: f64 = 20_000.0;

/// Context older than this logs a staleness warning (ms)
pub const STALE_WARNING_MS: f64 = 30_000.0;

/// Minimum spacing between background prefetches (ms)
pub const PREFETCH_DEBOUNCE_MS: f64 = 400.0;

// === SIGNER SESSIONS ===

/// Number of signer workers kept in the pool
pub const SIGNER_POOL_CAPACITY: usize = 3;

/// Signing sessions time out after this long (ms); termination always
/// terminates the reserved worker so its memory is reclaimed wholesale.
pub const SIGNING_SESSION_TIMEOUT_MS: f64 = 5.0 * 60.0 * 1000.0;

// === CONFIRMATION ===

/// Default auto-proceed delay when a config asks for autoProceed without one
pub const DEFAULT_AUTO_PROCEED_DELAY_MS: u32 = 2000;

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
