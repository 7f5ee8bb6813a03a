use serde::{Deserialize, Serialize};

// === SHAMIR 3-PASS RELAY HTTP TYPES ===
// Only blinded KEK forms transit the network; the KEK itself, the VRF
// keypair, and PRF output never appear in these bodies.

/// POST apply-server-lock request: the client-locked KEK
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ShamirApplyServerLockHTTPRequest {
    pub kek_c_b64u: String,
}

/// POST apply-server-lock response: double-locked KEK + the relay's keyId
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ShamirApplyServerLockHTTPResponse {
    pub kek_cs_b64u: String,
    #[serde(rename = "keyId")]
    pub key_id: String,
}

/// POST remove-server-lock request: the one-time-locked stored KEK plus the
/// keyId of the exponent that originally locked it
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ShamirRemoveServerLockHTTPRequest {
    pub kek_st_b64u: String,
    #[serde(rename = "keyId")]
    pub key_id: String,
}

/// POST remove-server-lock response: KEK with only the one-time lock left
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ShamirRemoveServerLockHTTPResponse {
    pub kek_t_b64u: String,
}

/// GET /shamir/key-info response
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ShamirKeyInfoResponse {
    #[serde(rename = "currentKeyId")]
    pub current_key_id: String,
    pub p_b64u: String,
    #[serde(rename = "graceKeyIds", default)]
    pub grace_key_ids: Vec<String>,
}
