use log::info;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::rc::Rc;
use wasm_bindgen::prelude::*;

use crate::manager::VRFKeyManager;
use crate::shamir3pass::Shamir3Pass;
use crate::types::VrfWorkerResponse;

#[wasm_bindgen]
#[derive(Serialize, Deserialize, Clone)]
pub struct Shamir3PassConfigPRequest {
    #[wasm_bindgen(getter_with_clone, js_name = "p_b64u")]
    #[serde(rename = "p_b64u")]
    pub p_b64u: String,
}

#[wasm_bindgen]
#[derive(Serialize, Deserialize, Clone)]
pub struct Shamir3PassConfigServerUrlsRequest {
    #[wasm_bindgen(getter_with_clone, js_name = "relayServerUrl")]
    #[serde(rename = "relayServerUrl")]
    pub relay_server_url: String,
    #[wasm_bindgen(getter_with_clone, js_name = "applyLockRoute")]
    #[serde(rename = "applyLockRoute")]
    pub apply_lock_route: String,
    #[wasm_bindgen(getter_with_clone, js_name = "removeLockRoute")]
    #[serde(rename = "removeLockRoute")]
    pub remove_lock_route: String,
    #[wasm_bindgen(getter_with_clone, js_name = "keyInfoRoute")]
    #[serde(default, rename = "keyInfoRoute")]
    pub key_info_route: Option<String>,
}

/// Handle SHAMIR3PASS_CONFIG_P
///
/// Accepts a caller-provided group prime only when it matches the compiled-in
/// safe prime; anything else is refused outright.
pub fn handle_shamir3pass_config_p(
    manager: Rc<RefCell<VRFKeyManager>>,
    message_id: Option<String>,
    payload: Shamir3PassConfigPRequest,
) -> VrfWorkerResponse {
    match Shamir3Pass::new(&payload.p_b64u) {
        Ok(shamir) => {
            manager.borrow_mut().shamir3pass = shamir;
            VrfWorkerResponse::success(message_id, Some(serde_json::json!({ "configured": true })))
        }
        Err(e) => VrfWorkerResponse::fail(
            message_id,
            crate::errors::VrfWorkerError::from(e).to_string(),
        ),
    }
}

/// Handle SHAMIR3PASS_CONFIG_SERVER_URLS
pub fn handle_shamir3pass_config_server_urls(
    manager: Rc<RefCell<VRFKeyManager>>,
    message_id: Option<String>,
    payload: Shamir3PassConfigServerUrlsRequest,
) -> VrfWorkerResponse {
    info!("Configuring Shamir relay: {}", payload.relay_server_url);
    let mut mgr = manager.borrow_mut();
    mgr.relay_server_url = Some(payload.relay_server_url);
    mgr.apply_lock_route = Some(payload.apply_lock_route);
    mgr.remove_lock_route = Some(payload.remove_lock_route);
    mgr.key_info_route = payload.key_info_route;
    VrfWorkerResponse::success(message_id, Some(serde_json::json!({ "configured": true })))
}
