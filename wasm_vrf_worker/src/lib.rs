use log::debug;
use serde_json::Value;
use std::cell::RefCell;
use std::rc::Rc;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsValue;
#[cfg(target_arch = "wasm32")]
use wasm_bindgen::JsCast;
#[cfg(target_arch = "wasm32")]
use web_sys::MessagePort;

mod config;
mod errors;
mod fetch;
mod handlers;
mod http;
mod manager;
mod rpc_calls;
mod shamir3pass;
mod types;
mod utils;

#[cfg(test)]
mod tests;

// Re-export important types and functions
pub use config::*;
pub use errors::*;
pub use manager::*;
pub use shamir3pass::*;
pub use utils::*;

pub use rpc_calls::{
    ContractVerificationResult, VrfData, WebAuthnAuthenticationCredential,
    WebAuthnAuthenticationResponse,
};

pub use types::{
    EncryptedVRFKeypair, ServerEncryptedVrfKeypair, VRFChallengeData, VRFInputData,
    VRFKeypairData, VrfStatusResponse, VrfWorkerMessage, VrfWorkerResponse, WorkerRequestType,
};

// Request types from their respective handler files
pub use handlers::handle_derive_vrf_keypair_from_prf::DeriveVrfKeypairFromPrfRequest;
pub use handlers::handle_derive_wrap_key_seed_and_session::DeriveWrapKeySeedAndSessionRequest;
pub use handlers::handle_generate_vrf_challenge::GenerateVrfChallengeRequest;
pub use handlers::handle_generate_vrf_keypair_bootstrap::GenerateVrfKeypairBootstrapRequest;
pub use handlers::handle_shamir3pass_client::{
    Shamir3PassClientDecryptVrfKeypairRequest, Shamir3PassClientEncryptCurrentVrfKeypairRequest,
};
pub use handlers::handle_shamir3pass_config::{
    Shamir3PassConfigPRequest, Shamir3PassConfigServerUrlsRequest,
};
pub use handlers::handle_shamir3pass_server::{
    Shamir3PassApplyServerLockRequest, Shamir3PassGenerateServerKeypairRequest,
    Shamir3PassRemoveServerLockRequest,
};
pub use handlers::handle_unlock_vrf_keypair::UnlockVrfKeypairRequest;

// Import JSON functions for message serialization
#[wasm_bindgen]
extern "C" {
    #[wasm_bindgen(js_namespace = JSON)]
    fn stringify(obj: &JsValue) -> JsValue;
    #[wasm_bindgen(js_namespace = JSON)]
    fn parse(text: &str) -> JsValue;
}

// Set up panic hook for better error messages
#[wasm_bindgen(start)]
pub fn main() {
    console_error_panic_hook::set_once();
    wasm_logger::init(wasm_logger::Config::new(config::CURRENT_LOG_LEVEL));
    debug!("VRF worker starting up");
}

// === GLOBAL STATE ===

thread_local! {
    static VRF_MANAGER: Rc<RefCell<VRFKeyManager>> =
        Rc::new(RefCell::new(VRFKeyManager::new(None, None, None, None, None)));
}

#[cfg(target_arch = "wasm32")]
thread_local! {
    // SessionId -> MessagePort for delivering WrapKeySeed directly to the
    // reserved signer worker
    static WRAP_KEY_SEED_PORTS: RefCell<std::collections::HashMap<String, MessagePort>> =
        RefCell::new(std::collections::HashMap::new());
}

/// Attach a MessagePort for a signing session so the VRF worker can send
/// WrapKeySeed directly to the signer worker over the dedicated channel.
#[wasm_bindgen]
pub fn attach_wrap_key_seed_port(session_id: String, port_val: JsValue) {
    #[cfg(target_arch = "wasm32")]
    {
        if let Ok(port) = port_val.dyn_into::<MessagePort>() {
            WRAP_KEY_SEED_PORTS.with(|map| {
                map.borrow_mut().insert(session_id, port);
            });
        }
    }

    #[cfg(not(target_arch = "wasm32"))]
    {
        let _ = session_id;
        let _ = port_val;
    }
}

// Helper module for WrapKeySeed and PRF.second delivery from handlers
#[cfg(target_arch = "wasm32")]
pub mod wrap_key_seed_port {
    use super::*;

    pub fn send_wrap_key_seed_to_signer(
        session_id: &str,
        wrap_key_seed_b64u: &str,
        wrap_key_salt_b64u: &str,
        prf_first_b64u: Option<&str>,
    ) {
        WRAP_KEY_SEED_PORTS.with(|map| {
            let mut map = map.borrow_mut();
            if let Some(port) = map.get(session_id) {
                let obj = js_sys::Object::new();
                let _ = js_sys::Reflect::set(&obj, &JsValue::from_str("ok"), &JsValue::TRUE);
                let _ = js_sys::Reflect::set(
                    &obj,
                    &JsValue::from_str("wrap_key_seed"),
                    &JsValue::from_str(wrap_key_seed_b64u),
                );
                let _ = js_sys::Reflect::set(
                    &obj,
                    &JsValue::from_str("wrapKeySalt"),
                    &JsValue::from_str(wrap_key_salt_b64u),
                );
                if let Some(prf_first) = prf_first_b64u {
                    let _ = js_sys::Reflect::set(
                        &obj,
                        &JsValue::from_str("prfFirst"),
                        &JsValue::from_str(prf_first),
                    );
                }
                let _ = port.post_message(&obj);
                // One-shot delivery: close and drop our end
                port.close();
                map.remove(session_id);
            }
        });
    }
}

// === WASM EXPORTS ===

#[wasm_bindgen]
pub async fn handle_message(message: JsValue) -> Result<JsValue, JsValue> {
    let message_str = stringify(&message)
        .as_string()
        .ok_or_else(|| JsValue::from_str("Failed to stringify message"))?;

    let raw_value: Value = serde_json::from_str(&message_str)
        .map_err(|e| JsValue::from_str(&format!("Failed to parse message: {}", e)))?;

    if let Some(key) = find_forbidden_near_secret(&raw_value) {
        return Err(JsValue::from_str(&format!(
            "Forbidden secret field in VRF payload: {}",
            key
        )));
    }

    let message: VrfWorkerMessage = serde_json::from_value(raw_value)
        .map_err(|e| JsValue::from_str(&format!("Failed to parse message: {}", e)))?;

    debug!("Received message: {}", message.msg_type);
    let request_type = WorkerRequestType::try_from(message.msg_type.as_str())
        .map_err(|e| JsValue::from_str(&e.to_string()))?;

    let manager_rc = VRF_MANAGER.with(|m| m.clone());

    let response = match request_type {
        WorkerRequestType::Ping => handlers::handle_ping(message.id),
        WorkerRequestType::GenerateVrfKeypairBootstrap => {
            handlers::handle_generate_vrf_keypair_bootstrap(
                manager_rc.clone(),
                message.id.clone(),
                message.parse_payload(request_type).map_err(js_err)?,
            )
        }
        WorkerRequestType::UnlockVrfKeypair => handlers::handle_unlock_vrf_keypair(
            manager_rc.clone(),
            message.id.clone(),
            message.parse_payload(request_type).map_err(js_err)?,
        ),
        WorkerRequestType::CheckVrfStatus => {
            handlers::handle_check_vrf_status(manager_rc.clone(), message.id.clone())
        }
        WorkerRequestType::ClearVrfSession => {
            handlers::handle_clear_vrf_session(manager_rc.clone(), message.id.clone())
        }
        WorkerRequestType::GenerateVrfChallenge => handlers::handle_generate_vrf_challenge(
            manager_rc.clone(),
            message.id.clone(),
            message.parse_payload(request_type).map_err(js_err)?,
        ),
        WorkerRequestType::DeriveVrfKeypairFromPrf => {
            handlers::handle_derive_vrf_keypair_from_prf(
                manager_rc.clone(),
                message.id.clone(),
                message.parse_payload(request_type).map_err(js_err)?,
            )
            .await
        }
        WorkerRequestType::Shamir3PassClientEncryptCurrentVrfKeypair => {
            handlers::handle_shamir3pass_client_encrypt_current_vrf_keypair(
                manager_rc.clone(),
                message.id.clone(),
                message.parse_payload(request_type).map_err(js_err)?,
            )
            .await
        }
        WorkerRequestType::Shamir3PassClientDecryptVrfKeypair => {
            handlers::handle_shamir3pass_client_decrypt_vrf_keypair(
                manager_rc.clone(),
                message.id.clone(),
                message.parse_payload(request_type).map_err(js_err)?,
            )
            .await
        }
        // Server-side helpers used by the relay to lock/unlock the KEK
        WorkerRequestType::Shamir3PassGenerateServerKeypair => {
            handlers::handle_shamir3pass_generate_server_keypair(
                manager_rc.clone(),
                message.id.clone(),
                message.parse_payload(request_type).map_err(js_err)?,
            )
        }
        WorkerRequestType::Shamir3PassApplyServerLock => {
            handlers::handle_shamir3pass_apply_server_lock_kek(
                manager_rc.clone(),
                message.id.clone(),
                message.parse_payload(request_type).map_err(js_err)?,
            )
        }
        WorkerRequestType::Shamir3PassRemoveServerLock => {
            handlers::handle_shamir3pass_remove_server_lock_kek(
                manager_rc.clone(),
                message.id.clone(),
                message.parse_payload(request_type).map_err(js_err)?,
            )
        }
        WorkerRequestType::Shamir3PassConfigP => handlers::handle_shamir3pass_config_p(
            manager_rc.clone(),
            message.id.clone(),
            message.parse_payload(request_type).map_err(js_err)?,
        ),
        WorkerRequestType::Shamir3PassConfigServerUrls => {
            handlers::handle_shamir3pass_config_server_urls(
                manager_rc.clone(),
                message.id.clone(),
                message.parse_payload(request_type).map_err(js_err)?,
            )
        }
        WorkerRequestType::DeriveWrapKeySeedAndSession => {
            handlers::handle_derive_wrap_key_seed_and_session(
                manager_rc.clone(),
                message.id.clone(),
                message
                    .parse_payload::<DeriveWrapKeySeedAndSessionRequest>(request_type)
                    .map_err(js_err)?,
            )
            .await
        }
    };

    let response_json = serde_json::to_string(&response)
        .map_err(|e| JsValue::from_str(&format!("Failed to serialize response: {}", e)))?;

    Ok(parse(&response_json))
}

fn js_err(e: VrfWorkerError) -> JsValue {
    JsValue::from_str(&e.to_string())
}

/// Structural scan for NEAR secret fields that must never enter the VRF
/// worker. The signer owns NEAR key material; the VRF worker never sees it.
fn find_forbidden_near_secret(value: &Value) -> Option<String> {
    const FORBIDDEN_KEYS: [&str; 3] = ["near_sk", "nearPrivateKey", "near_private_key"];
    match value {
        Value::Object(map) => {
            for (k, v) in map {
                if FORBIDDEN_KEYS.contains(&k.as_str()) {
                    return Some(k.clone());
                }
                if let Some(inner) = find_forbidden_near_secret(v) {
                    return Some(inner);
                }
            }
            None
        }
        Value::Array(arr) => {
            for v in arr {
                if let Some(inner) = find_forbidden_near_secret(v) {
                    return Some(inner);
                }
            }
            None
        }
        _ => None,
    }
}
