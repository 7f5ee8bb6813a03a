use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::rc::Rc;
use wasm_bindgen::prelude::*;

use crate::config::CHACHA20_KEY_SIZE;
use crate::manager::VRFKeyManager;
use crate::types::{EncryptedVRFKeypair, VrfWorkerResponse};
use crate::utils::base64_url_decode;

#[wasm_bindgen]
#[derive(Serialize, Deserialize, Clone)]
pub struct UnlockVrfKeypairRequest {
    #[wasm_bindgen(getter_with_clone, js_name = "accountId")]
    #[serde(rename = "accountId")]
    pub account_id: String,
    #[wasm_bindgen(getter_with_clone, js_name = "encryptedVrfKeypair")]
    #[serde(rename = "encryptedVrfKeypair")]
    pub encrypted_vrf_keypair: EncryptedVRFKeypair,
    /// PRF output from the authentication credential, base64url
    #[wasm_bindgen(getter_with_clone, js_name = "prfOutput")]
    #[serde(rename = "prfOutput")]
    pub prf_output: String,
}

/// Handle UNLOCK_VRF_KEYPAIR
///
/// Derives the KDF key from the credential's PRF output, decrypts the stored
/// VRF keypair, and installs it as the in-memory session for the account.
pub fn handle_unlock_vrf_keypair(
    manager: Rc<RefCell<VRFKeyManager>>,
    message_id: Option<String>,
    payload: UnlockVrfKeypairRequest,
) -> VrfWorkerResponse {
    if payload.account_id.is_empty() {
        return VrfWorkerResponse::fail(message_id, "Missing account ID");
    }

    let prf_key = match base64_url_decode(&payload.prf_output) {
        Ok(bytes) if bytes.len() == CHACHA20_KEY_SIZE => bytes,
        Ok(bytes) => {
            return VrfWorkerResponse::fail(
                message_id,
                format!("Invalid PRF output length: expected 32 bytes, got {}", bytes.len()),
            )
        }
        Err(e) => return VrfWorkerResponse::fail(message_id, e.to_string()),
    };

    let result = manager.borrow_mut().unlock_vrf_keypair(
        payload.account_id,
        payload.encrypted_vrf_keypair,
        prf_key,
    );

    match result {
        Ok(()) => VrfWorkerResponse::success(
            message_id,
            Some(serde_json::json!({ "status": "unlocked" })),
        ),
        Err(e) => VrfWorkerResponse::fail(message_id, e.to_string()),
    }
}
