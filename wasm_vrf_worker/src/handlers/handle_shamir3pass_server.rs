//! Server-side Shamir 3-pass helpers.
//!
//! These back the relay's apply-server-lock / remove-server-lock routes: the
//! relay process keeps its exponents and passes them in per call. They never
//! run in the browser worker but live here so client and server share one
//! group implementation (and so the 3-pass integration tests can drive both
//! halves natively).

use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::rc::Rc;
use wasm_bindgen::prelude::*;

use crate::errors::{ShamirError, VrfWorkerError};
use crate::manager::VRFKeyManager;
use crate::shamir3pass::{decode_biguint_b64u, encode_biguint_b64u, server_key_id};
use crate::types::VrfWorkerResponse;

#[wasm_bindgen]
#[derive(Serialize, Deserialize, Clone)]
pub struct Shamir3PassGenerateServerKeypairRequest {
    // No fields: samples a fresh (e_s, d_s) pair over the compiled-in group
}

#[derive(Serialize, Deserialize, Clone)]
pub struct Shamir3PassServerKeypairResult {
    pub e_s_b64u: String,
    pub d_s_b64u: String,
    #[serde(rename = "keyId")]
    pub key_id: String,
}

#[wasm_bindgen]
#[derive(Serialize, Deserialize, Clone)]
pub struct Shamir3PassApplyServerLockRequest {
    #[wasm_bindgen(getter_with_clone, js_name = "kek_c_b64u")]
    #[serde(rename = "kek_c_b64u")]
    pub kek_c_b64u: String,
    #[wasm_bindgen(getter_with_clone, js_name = "e_s_b64u")]
    #[serde(rename = "e_s_b64u")]
    pub e_s_b64u: String,
}

#[derive(Serialize, Deserialize, Clone)]
pub struct Shamir3PassRemoveServerLockRequest {
    #[serde(rename = "kek_st_b64u")]
    pub kek_st_b64u: String,
    /// keyId presented by the client (must match an active or grace key)
    #[serde(rename = "keyId")]
    pub key_id: String,
    /// The relay's key table: active key first, grace keys after.
    /// Grace keys may only be used for removal, which is all this route does.
    pub keys: Vec<ServerKeyEntry>,
}

#[derive(Serialize, Deserialize, Clone)]
pub struct ServerKeyEntry {
    #[serde(rename = "keyId")]
    pub key_id: String,
    #[serde(rename = "d_s_b64u")]
    pub d_s_b64u: String,
}

/// Sample a fresh server keypair (e_s, d_s) and its keyId.
pub fn handle_shamir3pass_generate_server_keypair(
    manager: Rc<RefCell<VRFKeyManager>>,
    message_id: Option<String>,
    _payload: Shamir3PassGenerateServerKeypairRequest,
) -> VrfWorkerResponse {
    let shamir3pass = manager.borrow().shamir3pass().clone();
    let lock = match shamir3pass.generate_lock_keys() {
        Ok(k) => k,
        Err(e) => return VrfWorkerResponse::fail(message_id, VrfWorkerError::from(e).to_string()),
    };

    let e_s_b64u = encode_biguint_b64u(&lock.e);
    let key_id = server_key_id(&e_s_b64u);

    VrfWorkerResponse::success_from(
        message_id,
        Some(Shamir3PassServerKeypairResult {
            e_s_b64u,
            d_s_b64u: encode_biguint_b64u(&lock.d),
            key_id,
        }),
    )
}

/// Apply the server lock: kek_cs = kek_c^{e_s} mod p. Returns the keyId of
/// the exponent used so clients can persist it alongside the blob.
pub fn handle_shamir3pass_apply_server_lock_kek(
    manager: Rc<RefCell<VRFKeyManager>>,
    message_id: Option<String>,
    payload: Shamir3PassApplyServerLockRequest,
) -> VrfWorkerResponse {
    let kek_c = match decode_biguint_b64u(&payload.kek_c_b64u) {
        Ok(v) => v,
        Err(_) => return VrfWorkerResponse::fail(message_id, "invalid kek_c_b64u"),
    };
    let e_s = match decode_biguint_b64u(&payload.e_s_b64u) {
        Ok(v) => v,
        Err(_) => return VrfWorkerResponse::fail(message_id, "invalid e_s_b64u"),
    };

    let shamir3pass = manager.borrow().shamir3pass().clone();
    let kek_cs = shamir3pass.add_lock(&kek_c, &e_s);

    VrfWorkerResponse::success(
        message_id,
        Some(serde_json::json!({
            "kek_cs_b64u": encode_biguint_b64u(&kek_cs),
            "keyId": server_key_id(&payload.e_s_b64u),
        })),
    )
}

/// Remove the server lock: kek_t = kek_st^{d_s} mod p, selecting the
/// exponent by the client-presented keyId. Unknown keyIds fail.
pub fn handle_shamir3pass_remove_server_lock_kek(
    manager: Rc<RefCell<VRFKeyManager>>,
    message_id: Option<String>,
    payload: Shamir3PassRemoveServerLockRequest,
) -> VrfWorkerResponse {
    let kek_st = match decode_biguint_b64u(&payload.kek_st_b64u) {
        Ok(v) => v,
        Err(_) => return VrfWorkerResponse::fail(message_id, "invalid kek_st_b64u"),
    };

    let entry = payload
        .keys
        .iter()
        .find(|entry| entry.key_id == payload.key_id);
    let Some(entry) = entry else {
        return VrfWorkerResponse::fail(
            message_id,
            VrfWorkerError::Shamir(ShamirError::UnknownKeyId(payload.key_id)).to_string(),
        );
    };

    let d_s = match decode_biguint_b64u(&entry.d_s_b64u) {
        Ok(v) => v,
        Err(_) => return VrfWorkerResponse::fail(message_id, "invalid d_s_b64u"),
    };

    let shamir3pass = manager.borrow().shamir3pass().clone();
    let kek_t = shamir3pass.remove_lock(&kek_st, &d_s);

    VrfWorkerResponse::success(
        message_id,
        Some(serde_json::json!({
            "kek_t_b64u": encode_biguint_b64u(&kek_t),
        })),
    )
}
