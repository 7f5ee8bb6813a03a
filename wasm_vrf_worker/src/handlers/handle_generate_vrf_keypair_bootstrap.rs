use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::rc::Rc;
use wasm_bindgen::prelude::*;

use crate::manager::VRFKeyManager;
use crate::types::{VRFInputData, VrfWorkerResponse};

#[wasm_bindgen]
#[derive(Serialize, Deserialize, Clone)]
pub struct GenerateVrfKeypairBootstrapRequest {
    #[wasm_bindgen(getter_with_clone, js_name = "accountId")]
    #[serde(rename = "accountId")]
    pub account_id: String,
    #[wasm_bindgen(getter_with_clone, js_name = "vrfInputData")]
    #[serde(default, rename = "vrfInputData")]
    pub vrf_input_data: Option<VRFInputData>,
}

/// Handle GENERATE_VRF_KEYPAIR_BOOTSTRAP
///
/// Generates a random VRF keypair kept unencrypted in worker memory until the
/// registration ceremony yields PRF output, optionally producing a challenge
/// with it so the authenticator has something to sign during registration.
pub fn handle_generate_vrf_keypair_bootstrap(
    manager: Rc<RefCell<VRFKeyManager>>,
    message_id: Option<String>,
    payload: GenerateVrfKeypairBootstrapRequest,
) -> VrfWorkerResponse {
    if payload.account_id.is_empty() {
        return VrfWorkerResponse::fail(message_id, "Missing account ID");
    }

    let result = manager
        .borrow_mut()
        .generate_vrf_keypair_bootstrap(payload.account_id, payload.vrf_input_data);

    match result {
        Ok(response) => VrfWorkerResponse::success_from(message_id, Some(response)),
        Err(e) => VrfWorkerResponse::fail(message_id, e.to_string()),
    }
}
