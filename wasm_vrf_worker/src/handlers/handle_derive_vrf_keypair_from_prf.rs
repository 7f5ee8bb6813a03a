use log::{debug, error, warn};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::rc::Rc;
use wasm_bindgen::prelude::*;

use crate::config::CHACHA20_KEY_SIZE;
use crate::handlers::handle_shamir3pass_client::perform_shamir3pass_client_encrypt_current_vrf_keypair;
use crate::manager::VRFKeyManager;
use crate::types::{
    EncryptedVRFKeypair, ServerEncryptedVrfKeypair, VRFChallengeData, VRFInputData,
    VrfWorkerResponse,
};
use crate::utils::base64_url_decode;

#[wasm_bindgen]
#[derive(Serialize, Deserialize, Clone)]
pub struct DeriveVrfKeypairFromPrfRequest {
    #[wasm_bindgen(getter_with_clone, js_name = "prfOutput")]
    #[serde(rename = "prfOutput")]
    pub prf_output: String,
    #[wasm_bindgen(getter_with_clone, js_name = "accountId")]
    #[serde(rename = "accountId")]
    pub account_id: String,
    #[wasm_bindgen(getter_with_clone, js_name = "saveInMemory")]
    #[serde(default = "default_true", rename = "saveInMemory")]
    pub save_in_memory: bool,
    #[wasm_bindgen(getter_with_clone, js_name = "vrfInputData")]
    #[serde(default, rename = "vrfInputData")]
    pub vrf_input_data: Option<VRFInputData>,
}

fn default_true() -> bool {
    true
}

#[wasm_bindgen]
#[derive(Serialize, Deserialize, Clone)]
pub struct DeterministicVrfKeypairResponse {
    #[wasm_bindgen(getter_with_clone, js_name = "vrfPublicKey")]
    #[serde(rename = "vrfPublicKey")]
    pub vrf_public_key: String,
    #[wasm_bindgen(getter_with_clone, js_name = "vrfChallengeData")]
    #[serde(rename = "vrfChallengeData")]
    pub vrf_challenge_data: Option<VRFChallengeData>,
    #[wasm_bindgen(getter_with_clone, js_name = "encryptedVrfKeypair")]
    #[serde(rename = "encryptedVrfKeypair")]
    pub encrypted_vrf_keypair: Option<EncryptedVRFKeypair>,
    #[wasm_bindgen(getter_with_clone, js_name = "serverEncryptedVrfKeypair")]
    #[serde(rename = "serverEncryptedVrfKeypair")]
    pub server_encrypted_vrf_keypair: Option<ServerEncryptedVrfKeypair>,
    pub success: bool,
}

/// Handle DERIVE_VRF_KEYPAIR_FROM_PRF
///
/// Derives a deterministic VRF keypair from PRF output, optionally installing
/// it as the active session. When a relay is configured, the keypair also
/// goes through the Shamir 3-pass client wrap for server-assisted unlock.
pub async fn handle_derive_vrf_keypair_from_prf(
    manager: Rc<RefCell<VRFKeyManager>>,
    message_id: Option<String>,
    payload: DeriveVrfKeypairFromPrfRequest,
) -> VrfWorkerResponse {
    let prf_output = match base64_url_decode(&payload.prf_output) {
        Ok(bytes) if !bytes.is_empty() => bytes,
        _ => return VrfWorkerResponse::fail(message_id, "Missing or invalid PRF output"),
    };
    if prf_output.len() != CHACHA20_KEY_SIZE {
        return VrfWorkerResponse::fail(message_id, "Invalid PRF output length: expected 32 bytes");
    }
    if payload.account_id.is_empty() {
        return VrfWorkerResponse::fail(message_id, "Missing account ID");
    }

    let (derived, vrf_keypair) = {
        let manager_ref = manager.borrow();
        match manager_ref.derive_vrf_keypair_from_prf(
            prf_output,
            payload.account_id.clone(),
            payload.vrf_input_data.clone(),
        ) {
            Ok((result, keypair)) => (result, keypair),
            Err(e) => {
                error!("VRF keypair derivation failed: {}", e);
                return VrfWorkerResponse::fail(message_id, e.to_string());
            }
        }
    };

    if payload.save_in_memory {
        manager
            .borrow_mut()
            .store_vrf_keypair_in_memory(vrf_keypair, payload.account_id.clone());
    }

    let relay_url = manager.borrow().relay_server_url.clone();
    let apply_lock_route = manager.borrow().apply_lock_route.clone();

    let server_encrypted_vrf_keypair = match (relay_url, apply_lock_route) {
        (Some(relay_url), Some(apply_lock_route)) => {
            match perform_shamir3pass_client_encrypt_current_vrf_keypair(
                manager.clone(),
                relay_url,
                apply_lock_route,
            )
            .await
            {
                Ok(server_blob) => Some(server_blob),
                Err(e) => {
                    warn!("VRF keypair server encryption failed: {} (proceeding)", e);
                    None
                }
            }
        }
        _ => {
            // Optional feature; do not fail core derivation
            debug!("Shamir relay config not present; skipping serverEncryptedVrfKeypair");
            None
        }
    };

    let response_data = DeterministicVrfKeypairResponse {
        vrf_public_key: derived.vrf_public_key,
        vrf_challenge_data: derived.vrf_challenge_data,
        encrypted_vrf_keypair: Some(derived.encrypted_vrf_keypair),
        server_encrypted_vrf_keypair,
        success: true,
    };

    VrfWorkerResponse::success_from(message_id, Some(response_data))
}
