use log::{debug, error, warn};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::rc::Rc;
use wasm_bindgen::prelude::*;

use crate::http::{
    get_shamir_key_info, join_relay_url, post_apply_server_lock, post_remove_server_lock,
};
use crate::errors::{ShamirError, VrfWorkerError};
use crate::manager::VRFKeyManager;
use crate::shamir3pass::{decode_biguint_b64u, encode_biguint_b64u, Shamir3Pass};
use crate::types::{ServerEncryptedVrfKeypair, VRFKeypairData, VrfWorkerResponse};
use crate::utils::{base64_url_decode, base64_url_encode};

#[wasm_bindgen]
#[derive(Serialize, Deserialize, Clone)]
pub struct Shamir3PassClientEncryptCurrentVrfKeypairRequest {
    // No fields: operates on the keypair currently held in worker memory
}

#[wasm_bindgen]
#[derive(Serialize, Deserialize, Clone)]
pub struct Shamir3PassClientDecryptVrfKeypairRequest {
    #[wasm_bindgen(getter_with_clone, js_name = "accountId")]
    #[serde(rename = "accountId")]
    pub account_id: String,
    #[wasm_bindgen(getter_with_clone, js_name = "kek_s_b64u")]
    #[serde(rename = "kek_s_b64u")]
    pub kek_s_b64u: String,
    #[wasm_bindgen(getter_with_clone, js_name = "ciphertextVrfB64u")]
    #[serde(rename = "ciphertextVrfB64u")]
    pub ciphertext_vrf_b64u: String,
    #[wasm_bindgen(getter_with_clone, js_name = "keyId")]
    #[serde(rename = "keyId")]
    pub key_id: String,
}

/// Result of the silent-login unlock: the session is active, and when the
/// relay rotated its key, a re-encrypted blob the caller must persist.
#[derive(Serialize, Deserialize, Clone)]
pub struct Shamir3PassDecryptVrfKeypairResult {
    pub status: String,
    #[serde(rename = "refreshedVrfKeypair")]
    pub refreshed_vrf_keypair: Option<ServerEncryptedVrfKeypair>,
}

// === Shamir 3-pass client-side handlers ===

/// Wrap the in-memory VRF keypair for relay-assisted unlock. Performed during
/// registration right after PRF derivation; also reachable on demand for
/// re-wraps.
pub async fn handle_shamir3pass_client_encrypt_current_vrf_keypair(
    manager: Rc<RefCell<VRFKeyManager>>,
    message_id: Option<String>,
    _payload: Shamir3PassClientEncryptCurrentVrfKeypairRequest,
) -> VrfWorkerResponse {
    let relay_url = match manager.borrow().relay_server_url.clone() {
        Some(url) => url,
        None => return VrfWorkerResponse::fail(message_id, "relay server URL is not configured"),
    };
    let apply_lock_route = match manager.borrow().apply_lock_route.clone() {
        Some(route) => route,
        None => return VrfWorkerResponse::fail(message_id, "apply-server-lock route is not configured"),
    };

    match perform_shamir3pass_client_encrypt_current_vrf_keypair(
        manager.clone(),
        relay_url,
        apply_lock_route,
    )
    .await
    {
        Ok(blob) => VrfWorkerResponse::success_from(message_id, Some(blob)),
        Err(e) => {
            error!("VRF keypair server encryption failed: {}", e);
            VrfWorkerResponse::fail(message_id, e.to_string())
        }
    }
}

/// Registration wrap:
/// 1. sample KEK, AEAD-encrypt the in-memory keypair → ciphertextVrf
/// 2. kek_c = KEK^{e_c}; POST to apply-server-lock
/// 3. kek_s = kek_cs^{d_c}; persist { ciphertextVrf, kek_s, serverKeyId }
pub async fn perform_shamir3pass_client_encrypt_current_vrf_keypair(
    manager: Rc<RefCell<VRFKeyManager>>,
    relay_url: String,
    apply_lock_route: String,
) -> Result<ServerEncryptedVrfKeypair, VrfWorkerError> {
    if relay_url.is_empty() {
        return Err(VrfWorkerError::missing_field("relay_url"));
    }
    if apply_lock_route.is_empty() {
        return Err(VrfWorkerError::missing_field("apply_lock_route"));
    }

    // Serialize the VRFKeypairData currently in memory; error if none
    let (keypair_data_bytes, vrf_pub_b64) = {
        let mgr = manager.borrow();
        if !mgr.session_active() {
            return Err(VrfWorkerError::SessionInactive);
        }
        let kp = mgr.vrf_keypair.as_ref().unwrap().inner();
        let keypair_bytes = bincode::serialize(kp)?;
        let pub_bytes = bincode::serialize(&kp.pk)?;
        let pub_b64 = base64_url_encode(&pub_bytes);
        let keypair_data = VRFKeypairData {
            keypair_bytes,
            public_key_base64: pub_b64.clone(),
        };
        (bincode::serialize(&keypair_data)?, pub_b64)
    };

    let shamir3pass = manager.borrow().shamir3pass().clone();

    // Random KEK wraps the keypair bytes
    let (ciphertext_vrf, kek) = shamir3pass
        .encrypt_with_random_kek(&keypair_data_bytes)
        .map_err(VrfWorkerError::Shamir)?;

    // One-time client lock keys (e_c, d_c)
    let client_lock = shamir3pass
        .generate_lock_keys()
        .map_err(VrfWorkerError::Shamir)?;

    let kek_c = shamir3pass.add_lock(&kek, &client_lock.e);
    let kek_c_b64u = encode_biguint_b64u(&kek_c);

    let url = join_relay_url(&relay_url, &apply_lock_route);
    let apply_resp = post_apply_server_lock(&url, &kek_c_b64u).await?;

    let kek_cs = decode_biguint_b64u(&apply_resp.kek_cs_b64u)
        .map_err(|_| VrfWorkerError::invalid_format("invalid kek_cs_b64u"))?;

    // Remove the one-time lock; the relay's lock remains
    let kek_s = shamir3pass.remove_lock(&kek_cs, &client_lock.d);

    Ok(ServerEncryptedVrfKeypair {
        ciphertext_vrf_b64u: base64_url_encode(&ciphertext_vrf),
        kek_s_b64u: encode_biguint_b64u(&kek_s),
        vrf_public_key: vrf_pub_b64,
        server_key_id: apply_resp.key_id,
    })
}

/// Login unlock (silent, no authenticator prompt):
/// 1. kek_st = kek_s^{e_t}; POST to remove-server-lock with the stored keyId
/// 2. KEK = kek_t^{d_t}; AEAD-decrypt the keypair and install the session
/// 3. consult /shamir/key-info and proactively re-encrypt when the relay
///    rotated its key
pub async fn handle_shamir3pass_client_decrypt_vrf_keypair(
    manager: Rc<RefCell<VRFKeyManager>>,
    message_id: Option<String>,
    payload: Shamir3PassClientDecryptVrfKeypairRequest,
) -> VrfWorkerResponse {
    let relay_url = match manager.borrow().relay_server_url.clone() {
        Some(url) => url,
        None => return VrfWorkerResponse::fail(message_id, "relay server URL is not configured"),
    };
    let remove_route = match manager.borrow().remove_lock_route.clone() {
        Some(route) => route,
        None => return VrfWorkerResponse::fail(message_id, "remove-server-lock route is not configured"),
    };

    if payload.account_id.is_empty()
        || payload.kek_s_b64u.is_empty()
        || payload.ciphertext_vrf_b64u.is_empty()
        || payload.key_id.is_empty()
    {
        return VrfWorkerResponse::fail(message_id, "missing required fields");
    }

    let kek_s = match decode_biguint_b64u(&payload.kek_s_b64u) {
        Ok(v) => v,
        Err(_) => return VrfWorkerResponse::fail(message_id, "invalid kek_s_b64u"),
    };
    let ciphertext_vrf = match base64_url_decode(&payload.ciphertext_vrf_b64u) {
        Ok(v) => v,
        Err(e) => {
            return VrfWorkerResponse::fail(message_id, format!("invalid ciphertextVrfB64u: {}", e))
        }
    };

    let shamir3pass = manager.borrow().shamir3pass().clone();

    // Fresh one-time lock keys (e_t, d_t)
    let client_lock = match shamir3pass.generate_lock_keys() {
        Ok(k) => k,
        Err(e) => return VrfWorkerResponse::fail(message_id, VrfWorkerError::from(e).to_string()),
    };

    let kek_st = shamir3pass.add_lock(&kek_s, &client_lock.e);
    let kek_st_b64u = encode_biguint_b64u(&kek_st);

    let url = join_relay_url(&relay_url, &remove_route);
    let kek_t_b64u =
        match post_remove_server_lock(&url, &kek_st_b64u, payload.key_id.clone()).await {
            Ok(v) => v.kek_t_b64u,
            Err(e) => return VrfWorkerResponse::fail(message_id, e.to_string()),
        };
    let kek_t = match decode_biguint_b64u(&kek_t_b64u) {
        Ok(v) => v,
        Err(_) => return VrfWorkerResponse::fail(message_id, "invalid kek_t_b64u"),
    };

    // Remove the one-time lock to recover the KEK
    let kek = shamir3pass.remove_lock(&kek_t, &client_lock.d);

    let vrf_keypair_bytes = match shamir3pass.decrypt_with_kek_key(&ciphertext_vrf, &kek) {
        Ok(v) => v,
        Err(e) => {
            return VrfWorkerResponse::fail(
                message_id,
                VrfWorkerError::from(e).to_string(),
            )
        }
    };

    let keypair_payload: VRFKeypairData = match bincode::deserialize(&vrf_keypair_bytes) {
        Ok(v) => v,
        Err(e) => {
            return VrfWorkerResponse::fail(
                message_id,
                format!("deserialize VRFKeypairData failed: {}", e),
            )
        }
    };

    if let Err(e) = manager
        .borrow_mut()
        .load_plaintext_vrf_keypair(payload.account_id, keypair_payload)
    {
        return VrfWorkerResponse::fail(message_id, e.to_string());
    }

    // Proactive refresh: runs after the unlock observed the stored keyId and
    // before any further persistence updates.
    let refreshed = match maybe_proactive_shamir_refresh(manager.clone(), &payload.key_id).await {
        Ok(blob) => blob,
        Err(e) => {
            // A failed refresh does not undo a successful unlock, except when
            // the relay's group prime disagrees with ours: that is fatal.
            if matches!(e, VrfWorkerError::Shamir(ShamirError::PrimeMismatch)) {
                let _ = manager.borrow_mut().clear_session();
                return VrfWorkerResponse::fail(message_id, e.to_string());
            }
            warn!("Proactive Shamir refresh failed: {} (session stays active)", e);
            None
        }
    };

    VrfWorkerResponse::success_from(
        message_id,
        Some(Shamir3PassDecryptVrfKeypairResult {
            status: "unlocked".to_string(),
            refreshed_vrf_keypair: refreshed,
        }),
    )
}

/// Consult /shamir/key-info; when the relay rotated to a new key and a VRF
/// session is live, re-encrypt the in-memory keypair under the current key
/// and hand the new blob back for persistence. Returns None when the stored
/// key is still current or no key-info route is configured.
pub async fn maybe_proactive_shamir_refresh(
    manager: Rc<RefCell<VRFKeyManager>>,
    stored_key_id: &str,
) -> Result<Option<ServerEncryptedVrfKeypair>, VrfWorkerError> {
    let (relay_url, key_info_route, apply_lock_route) = {
        let mgr = manager.borrow();
        (
            mgr.relay_server_url.clone(),
            mgr.key_info_route.clone(),
            mgr.apply_lock_route.clone(),
        )
    };
    let (Some(relay_url), Some(key_info_route), Some(apply_lock_route)) =
        (relay_url, key_info_route, apply_lock_route)
    else {
        return Ok(None);
    };

    let url = join_relay_url(&relay_url, &key_info_route);
    let key_info = get_shamir_key_info(&url).await?;

    // The relay must be using the same group we compiled in; refuse otherwise.
    if !Shamir3Pass::matches_compiled_prime(&key_info.p_b64u) {
        return Err(VrfWorkerError::Shamir(ShamirError::PrimeMismatch));
    }

    if key_info.current_key_id == stored_key_id {
        debug!("Stored serverKeyId is current; no refresh needed");
        return Ok(None);
    }
    if !manager.borrow().session_active() {
        return Ok(None);
    }

    debug!(
        "Relay rotated Shamir key ({} -> {}); re-encrypting VRF keypair",
        stored_key_id, key_info.current_key_id
    );
    let blob = perform_shamir3pass_client_encrypt_current_vrf_keypair(
        manager,
        relay_url,
        apply_lock_route,
    )
    .await?;

    Ok(Some(blob))
}
