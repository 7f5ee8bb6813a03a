use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::rc::Rc;
use wasm_bindgen::prelude::*;

use crate::manager::VRFKeyManager;
use crate::types::{VRFInputData, VrfWorkerResponse};

#[wasm_bindgen]
#[derive(Serialize, Deserialize, Clone)]
pub struct GenerateVrfChallengeRequest {
    #[wasm_bindgen(getter_with_clone, js_name = "vrfInputData")]
    #[serde(rename = "vrfInputData")]
    pub vrf_input_data: VRFInputData,
}

/// Handle GENERATE_VRF_CHALLENGE
///
/// Requires an active session for the account named in the input data.
/// Pure worker-side operation; no user activation involved.
pub fn handle_generate_vrf_challenge(
    manager: Rc<RefCell<VRFKeyManager>>,
    message_id: Option<String>,
    payload: GenerateVrfChallengeRequest,
) -> VrfWorkerResponse {
    match manager.borrow().generate_vrf_challenge(payload.vrf_input_data) {
        Ok(challenge) => VrfWorkerResponse::success_from(message_id, Some(challenge)),
        Err(e) => VrfWorkerResponse::fail(message_id, e.to_string()),
    }
}
