use hkdf::Hkdf;
use log::debug;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::cell::RefCell;
use std::rc::Rc;

use crate::config::{
    now_ms, NEAR_WRAP_SEED_INFO, VRF_SESSION_DEFAULT_MAX_USES, VRF_SESSION_DEFAULT_TTL_MS,
    VRF_WRAP_PASS_INFO,
};
use crate::errors::HkdfError;
use crate::manager::{VRFKeyManager, VrfSessionData};
use crate::rpc_calls::{
    verify_authentication_response_rpc_call, VrfData, WebAuthnAuthenticationCredential,
};
use crate::types::{VRFChallengeData, VrfWorkerResponse};
use crate::utils::{base64_url_decode, generate_wrap_key_salt_b64u};

#[derive(Debug, Serialize, Deserialize)]
pub struct DeriveWrapKeySeedAndSessionRequest {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    /// PRF.first from the authentication ceremony, base64url
    #[serde(rename = "prfFirstB64u")]
    pub prf_first_b64u: String,
    /// Existing wrapKeySalt for an existing vault entry; empty for new vaults
    #[serde(rename = "wrapKeySalt")]
    pub wrap_key_salt_b64u: String,
    /// When set, PRF.first is also forwarded to the signer over the session
    /// port so registration/link/recovery flows can derive the NEAR keypair.
    /// Plain signing sessions leave this unset; the signer then only ever
    /// sees the derived WrapKeySeed.
    #[serde(default, rename = "forwardPrfFirst")]
    pub forward_prf_first: bool,
    /// Optional contract ID for verify_authentication_response gating
    #[serde(rename = "contractId")]
    pub contract_id: Option<String>,
    /// Optional NEAR RPC URL for verify_authentication_response gating
    #[serde(rename = "nearRpcUrl")]
    pub near_rpc_url: Option<String>,
    /// Optional VRF challenge used to build VrfData for contract verification
    #[serde(rename = "vrfChallenge")]
    pub vrf_challenge: Option<VRFChallengeData>,
    /// Optional WebAuthn authentication credential for contract verification.
    /// PRF extension results are intentionally absent from this struct, so
    /// PRF outputs present in the source object are never sent on the wire.
    #[serde(rename = "credential")]
    pub credential: Option<WebAuthnAuthenticationCredential>,
}

/// Handle DERIVE_WRAP_KEY_SEED_AND_SESSION
///
/// Derives the WrapKeySeed for a signing session and delivers it to the
/// reserved signer worker over the session's MessagePort. Only session
/// metadata is returned to the main thread; the seed stays inside workers.
pub async fn handle_derive_wrap_key_seed_and_session(
    manager: Rc<RefCell<VRFKeyManager>>,
    message_id: Option<String>,
    request: DeriveWrapKeySeedAndSessionRequest,
) -> VrfWorkerResponse {
    debug!(
        "derive_wrap_key_seed_and_session for session {}",
        request.session_id
    );

    // When verification context is provided, gate WrapKeySeed derivation on a
    // successful verify_authentication_response so only contract-verified
    // sessions receive material.
    if let (Some(contract_id), Some(rpc_url), Some(vrf_challenge), Some(credential)) = (
        request.contract_id.as_ref(),
        request.near_rpc_url.as_ref(),
        request.vrf_challenge.as_ref(),
        request.credential.as_ref(),
    ) {
        let vrf_data = match VrfData::try_from(vrf_challenge) {
            Ok(data) => data,
            Err(e) => {
                return VrfWorkerResponse::fail(
                    message_id,
                    format!("Failed to convert VRF challenge for verification: {}", e),
                )
            }
        };

        match verify_authentication_response_rpc_call(
            contract_id,
            rpc_url,
            vrf_data,
            credential.clone(),
        )
        .await
        {
            Ok(result) => {
                if !result.success || !result.verified {
                    let err_msg = result
                        .error
                        .unwrap_or_else(|| "Contract verification failed".to_string());
                    return VrfWorkerResponse::fail(message_id, err_msg);
                }
            }
            Err(e) => {
                return VrfWorkerResponse::fail(
                    message_id,
                    format!("verify_authentication_response RPC failed: {}", e),
                );
            }
        }
    }

    // Honor a caller-provided wrapKeySalt (existing vault entry); generate a
    // fresh one inside the worker otherwise.
    let wrap_key_salt_b64u = if request.wrap_key_salt_b64u.trim().is_empty() {
        match generate_wrap_key_salt_b64u() {
            Ok(s) => s,
            Err(e) => return VrfWorkerResponse::fail(message_id, e.to_string()),
        }
    } else {
        request.wrap_key_salt_b64u.clone()
    };

    let prf_first_bytes = match base64_url_decode(&request.prf_first_b64u) {
        Ok(bytes) => bytes,
        Err(e) => return VrfWorkerResponse::fail(message_id, e.to_string()),
    };

    // K_pass_auth = HKDF(PRF.first, "vrf-wrap-pass")
    let hk = Hkdf::<Sha256>::new(None, &prf_first_bytes);
    let mut k_pass_auth = vec![0u8; 32];
    if hk.expand(VRF_WRAP_PASS_INFO, &mut k_pass_auth).is_err() {
        return VrfWorkerResponse::fail(message_id, HkdfError::KeyDerivationFailed.to_string());
    }

    let vrf_secret = match manager.borrow().get_vrf_secret_key_bytes() {
        Ok(sk) => sk,
        Err(e) => return VrfWorkerResponse::fail(message_id, e.to_string()),
    };

    // WrapKeySeed = HKDF(K_pass_auth || vrf_sk, "near-wrap-seed")
    let mut seed = Vec::with_capacity(k_pass_auth.len() + vrf_secret.len());
    seed.extend_from_slice(&k_pass_auth);
    seed.extend_from_slice(&vrf_secret);

    let hk2 = Hkdf::<Sha256>::new(None, &seed);
    let mut wrap_key_seed = vec![0u8; 32];
    if hk2.expand(NEAR_WRAP_SEED_INFO, &mut wrap_key_seed).is_err() {
        return VrfWorkerResponse::fail(
            message_id,
            HkdfError::WrapKeySeedDerivationFailed.to_string(),
        );
    }

    let created_at = now_ms();
    manager.borrow_mut().upsert_session(
        &request.session_id,
        VrfSessionData {
            wrap_key_seed: wrap_key_seed.clone(),
            wrap_key_salt_b64u: wrap_key_salt_b64u.clone(),
            created_at_ms: created_at,
            expires_at_ms: Some(created_at + VRF_SESSION_DEFAULT_TTL_MS),
            remaining_uses: Some(VRF_SESSION_DEFAULT_MAX_USES),
        },
    );

    // Deliver WrapKeySeed + wrapKeySalt to the signer worker over the
    // attached MessagePort
    #[cfg(target_arch = "wasm32")]
    {
        let wrap_key_seed_b64u = crate::utils::base64_url_encode(&wrap_key_seed);
        let prf_first_forward = request
            .forward_prf_first
            .then_some(request.prf_first_b64u.as_str());
        crate::wrap_key_seed_port::send_wrap_key_seed_to_signer(
            &request.session_id,
            &wrap_key_seed_b64u,
            &wrap_key_salt_b64u,
            prf_first_forward,
        );
    }

    // Only session metadata goes back to the main thread
    VrfWorkerResponse::success(
        message_id,
        Some(serde_json::json!({
            "sessionId": request.session_id,
            // Echo the wrapKeySalt actually used so new vaults can persist it
            "wrapKeySalt": wrap_key_salt_b64u,
        })),
    )
}
