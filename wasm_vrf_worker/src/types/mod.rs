use serde::{Deserialize, Serialize};
use wasm_bindgen::prelude::*;

pub mod http;
pub mod worker_messages;

pub use worker_messages::*;

// === TYPE DEFINITIONS ===

#[derive(Serialize, Deserialize)]
pub struct VRFKeypairData {
    /// Bincode-serialized ECVRFKeyPair (private and public halves)
    pub keypair_bytes: Vec<u8>,
    /// Base64url-encoded public key for convenience
    pub public_key_base64: String,
}

/// PRF-wrapped VRF keypair: AEAD ciphertext plus the fresh nonce used to
/// produce it. Algorithm is ChaCha20-Poly1305 with an HKDF-SHA256 key.
#[wasm_bindgen]
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct EncryptedVRFKeypair {
    #[wasm_bindgen(getter_with_clone, js_name = "encryptedVrfDataB64u")]
    #[serde(rename = "encryptedVrfDataB64u")]
    pub encrypted_vrf_data_b64u: String,
    #[wasm_bindgen(getter_with_clone, js_name = "chacha20NonceB64u")]
    #[serde(rename = "chacha20NonceB64u")]
    pub chacha20_nonce_b64u: String,
}

/// Relay-locked VRF keypair blob: AEAD ciphertext under a random KEK, the
/// server-locked KEK, and the keyId of the relay exponent that locked it.
#[wasm_bindgen]
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ServerEncryptedVrfKeypair {
    #[wasm_bindgen(getter_with_clone, js_name = "ciphertextVrfB64u")]
    #[serde(rename = "ciphertextVrfB64u")]
    pub ciphertext_vrf_b64u: String,
    #[wasm_bindgen(getter_with_clone, js_name = "kek_s_b64u")]
    #[serde(rename = "kek_s_b64u")]
    pub kek_s_b64u: String,
    #[wasm_bindgen(getter_with_clone, js_name = "vrfPublicKey")]
    #[serde(rename = "vrfPublicKey")]
    pub vrf_public_key: String,
    #[wasm_bindgen(getter_with_clone, js_name = "serverKeyId")]
    #[serde(rename = "serverKeyId")]
    pub server_key_id: String,
}

#[wasm_bindgen]
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct VRFInputData {
    #[wasm_bindgen(getter_with_clone, js_name = "userId")]
    #[serde(rename = "userId")]
    pub user_id: String,
    #[wasm_bindgen(getter_with_clone, js_name = "rpId")]
    #[serde(rename = "rpId")]
    pub rp_id: String,
    #[wasm_bindgen(getter_with_clone, js_name = "blockHeight")]
    #[serde(rename = "blockHeight")]
    pub block_height: String,
    #[wasm_bindgen(getter_with_clone, js_name = "blockHash")]
    #[serde(rename = "blockHash")]
    pub block_hash: String,
}

/// A chain-anchored VRF challenge: the hashed input, the ECVRF output and
/// proof, and the context it was derived from. Doubles as the WebAuthn
/// challenge for stateless authentication.
#[wasm_bindgen]
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct VRFChallengeData {
    #[wasm_bindgen(getter_with_clone, js_name = "vrfInput")]
    #[serde(rename = "vrfInput")]
    pub vrf_input: String,
    #[wasm_bindgen(getter_with_clone, js_name = "vrfOutput")]
    #[serde(rename = "vrfOutput")]
    pub vrf_output: String,
    #[wasm_bindgen(getter_with_clone, js_name = "vrfProof")]
    #[serde(rename = "vrfProof")]
    pub vrf_proof: String,
    #[wasm_bindgen(getter_with_clone, js_name = "vrfPublicKey")]
    #[serde(rename = "vrfPublicKey")]
    pub vrf_public_key: String,
    #[wasm_bindgen(getter_with_clone, js_name = "userId")]
    #[serde(rename = "userId")]
    pub user_id: String,
    #[wasm_bindgen(getter_with_clone, js_name = "rpId")]
    #[serde(rename = "rpId")]
    pub rp_id: String,
    #[wasm_bindgen(getter_with_clone, js_name = "blockHeight")]
    #[serde(rename = "blockHeight")]
    pub block_height: String,
    #[wasm_bindgen(getter_with_clone, js_name = "blockHash")]
    #[serde(rename = "blockHash")]
    pub block_hash: String,
}

impl VRFChallengeData {
    pub fn to_js_value(&self) -> JsValue {
        serde_wasm_bindgen::to_value(self).unwrap_or(JsValue::UNDEFINED)
    }
}

#[derive(Serialize, Deserialize)]
pub struct GenerateVrfKeypairBootstrapResponse {
    pub vrf_public_key: String,
    pub vrf_challenge_data: Option<VRFChallengeData>,
}

#[derive(Serialize, Deserialize)]
pub struct EncryptedVrfKeypairResponse {
    pub vrf_public_key: String,
    pub encrypted_vrf_keypair: EncryptedVRFKeypair,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct VrfStatusResponse {
    pub active: bool,
    pub account_id: Option<String>,
    pub session_duration_ms: f64,
}
