mod actions;
mod config;
mod cose;
mod crypto;
mod encoders;
mod error;
mod handlers;
mod logger;
mod mpc_signature;
#[cfg(test)]
mod tests;
mod transaction;
mod types;
mod wrap_key_handshake;

use log::debug;
use serde_json::Value;
use wasm_bindgen::prelude::*;

use crate::error::scrub_js_error_value;
use crate::types::progress::{
    progress_message_type_name, progress_step_name, ProgressMessageType, ProgressStep,
};
use crate::types::worker_messages::{
    parse_typed_payload, parse_worker_request_envelope, worker_request_type_name,
    worker_response_type_name, SignerWorkerMessage, SignerWorkerResponse, WorkerRequestType,
    WorkerResponseType,
};
use crate::wrap_key_handshake::{get_prf_first_b64u, get_wrap_key};

pub use handlers::{
    CoseExtractionResult, DecryptPrivateKeyRequest, DecryptPrivateKeyResult, DelegatePayload,
    DelegateSignResult, DeriveNearKeypairAndEncryptRequest, DeriveNearKeypairAndEncryptResult,
    ExtractCoseRequest, KeyActionResult, NormalizeMpcSignatureRequest,
    NormalizeMpcSignatureResult, RecoverKeypairRequest, RecoverKeypairResult,
    SignDelegateActionRequest, SignNep413Request, SignNep413Result,
    SignTransactionWithKeyPairRequest, SignTransactionsWithActionsRequest, TransactionPayload,
    TransactionSignResult,
};

// Re-export NEAR and progress types for the TypeScript bindings
pub use types::near::{
    AccountId, DelegateAction, PublicKey, Signature, SignedDelegate, SignedTransaction,
    Transaction,
};
pub use types::wasm_to_json::{WasmSignedDelegate, WasmSignedTransaction};

pub use crate::crypto::WrapKey;
pub use crate::mpc_signature::NormalizedMpcSignature;
pub use wrap_key_handshake::attach_wrap_key_seed_port;

#[wasm_bindgen]
pub fn init_worker() {
    logger::init(config::CURRENT_LOG_LEVEL);
}

// === PROGRESS MESSAGING ===

/// Send a progress message to the main thread via the JS bridge. Carries
/// both numeric codes and string names for debuggability.
pub fn send_progress_message(message_type: u32, step: u32, message: &str, data: JsValue) {
    #[wasm_bindgen]
    extern "C" {
        #[wasm_bindgen(js_name = sendProgressMessage)]
        fn send_progress_message_js(
            message_type: u32,
            message_type_name: &str,
            step: u32,
            step_name: &str,
            message: &str,
            data: JsValue,
        );
    }

    let message_type_name = match ProgressMessageType::try_from(message_type) {
        Ok(msg_type) => progress_message_type_name(msg_type),
        Err(_) => "UNKNOWN_MESSAGE_TYPE",
    };

    let step_name = match ProgressStep::try_from(step) {
        Ok(step_enum) => progress_step_name(step_enum),
        Err(_) => "unknown-step",
    };

    #[cfg(target_arch = "wasm32")]
    {
        send_progress_message_js(message_type, message_type_name, step, step_name, message, data);
    }

    #[cfg(not(target_arch = "wasm32"))]
    {
        let _ = data;
        debug!(
            "Progress: {} ({}) - {} ({}) - {}",
            message_type_name, message_type, step_name, step, message
        );
    }
}

// === MESSAGE HANDLER ===

/// Unified message handler for all signer worker operations.
#[wasm_bindgen]
pub async fn handle_signer_message(message_val: JsValue) -> Result<JsValue, JsValue> {
    init_worker();
    handle_signer_message_inner(message_val)
        .await
        .map_err(scrub_js_error_value)
}

async fn handle_signer_message_inner(message_val: JsValue) -> Result<JsValue, JsValue> {
    // Parse the outer `{ type, payload }` envelope through JSON so the raw
    // payload can be scanned structurally before any typed parsing.
    let raw: Value = serde_wasm_bindgen::from_value(message_val)
        .map_err(|e| JsValue::from_str(&format!("Failed to parse worker message: {}", e)))?;

    let SignerWorkerMessage {
        request_type,
        request_type_raw: msg_type_num,
        payload,
    } = parse_worker_request_envelope(raw).map_err(|e| JsValue::from_str(&e))?;

    // The signer never accepts PRF output or VRF secrets in payloads; key
    // material only ever arrives over the session MessagePort.
    if let Some(key) = find_forbidden_secret_field(&payload) {
        return Err(JsValue::from_str(&format!(
            "Forbidden secret field in signer payload: {}",
            key
        )));
    }

    debug!(
        "Signer worker: received message type {} ({})",
        worker_request_type_name(request_type),
        msg_type_num
    );

    let response_payload = match request_type {
        WorkerRequestType::DeriveNearKeypairAndEncrypt => {
            let request: DeriveNearKeypairAndEncryptRequest =
                parse_typed_payload(&payload, request_type).map_err(|e| JsValue::from_str(&e))?;
            let wrap_key = get_wrap_key(
                &request.session_id,
                request_type,
                config::WRAP_KEY_SEED_TIMEOUT_MS,
            )
            .await?;
            let prf_first_b64u = get_prf_first_b64u(
                &request.session_id,
                request_type,
                config::WRAP_KEY_SEED_TIMEOUT_MS,
            )
            .await?;
            let result =
                handlers::handle_derive_near_keypair_and_encrypt(request, wrap_key, prf_first_b64u)
                    .await
                    .map_err(|e| JsValue::from_str(&e))?;
            to_response_value(&result)?
        }
        WorkerRequestType::RecoverKeypairFromPasskey => {
            let request: RecoverKeypairRequest =
                parse_typed_payload(&payload, request_type).map_err(|e| JsValue::from_str(&e))?;
            let wrap_key = get_wrap_key(
                &request.session_id,
                request_type,
                config::WRAP_KEY_SEED_TIMEOUT_MS,
            )
            .await?;
            let prf_first_b64u = get_prf_first_b64u(
                &request.session_id,
                request_type,
                config::WRAP_KEY_SEED_TIMEOUT_MS,
            )
            .await?;
            let result =
                handlers::handle_recover_keypair_from_passkey(request, wrap_key, prf_first_b64u)
                    .await
                    .map_err(|e| JsValue::from_str(&e))?;
            to_response_value(&result)?
        }
        WorkerRequestType::DecryptPrivateKeyWithPrf => {
            let request: DecryptPrivateKeyRequest =
                parse_typed_payload(&payload, request_type).map_err(|e| JsValue::from_str(&e))?;
            let wrap_key = get_wrap_key(
                &request.session_id,
                request_type,
                config::WRAP_KEY_SEED_TIMEOUT_MS,
            )
            .await?;
            let result = handlers::handle_decrypt_private_key_with_prf(request, wrap_key)
                .await
                .map_err(|e| JsValue::from_str(&e))?;
            to_response_value(&result)?
        }
        WorkerRequestType::SignTransactionsWithActions => {
            let request: SignTransactionsWithActionsRequest =
                parse_typed_payload(&payload, request_type).map_err(|e| JsValue::from_str(&e))?;
            let wrap_key = get_wrap_key(
                &request.session_id,
                request_type,
                config::WRAP_KEY_SEED_TIMEOUT_MS,
            )
            .await?;
            let result = handlers::handle_sign_transactions_with_actions(request, wrap_key)
                .await
                .map_err(|e| JsValue::from_str(&e))?;
            to_response_value(&result)?
        }
        WorkerRequestType::SignDelegateAction => {
            let request: SignDelegateActionRequest =
                parse_typed_payload(&payload, request_type).map_err(|e| JsValue::from_str(&e))?;
            let wrap_key = get_wrap_key(
                &request.session_id,
                request_type,
                config::WRAP_KEY_SEED_TIMEOUT_MS,
            )
            .await?;
            let result = handlers::handle_sign_delegate_action(request, wrap_key)
                .await
                .map_err(|e| JsValue::from_str(&e))?;
            to_response_value(&result)?
        }
        WorkerRequestType::ExtractCosePublicKey => {
            let request: ExtractCoseRequest =
                parse_typed_payload(&payload, request_type).map_err(|e| JsValue::from_str(&e))?;
            let result = handlers::handle_extract_cose_public_key(request)
                .await
                .map_err(|e| JsValue::from_str(&e))?;
            to_response_value(&result)?
        }
        // The one handler that takes an explicit keypair: device-linking key
        // replacement. No PRF, no session port.
        WorkerRequestType::SignTransactionWithKeyPair => {
            let request: SignTransactionWithKeyPairRequest =
                parse_typed_payload(&payload, request_type).map_err(|e| JsValue::from_str(&e))?;
            let result = handlers::handle_sign_transaction_with_keypair(request)
                .await
                .map_err(|e| JsValue::from_str(&e))?;
            to_response_value(&result)?
        }
        WorkerRequestType::SignNep413Message => {
            let request: SignNep413Request =
                parse_typed_payload(&payload, request_type).map_err(|e| JsValue::from_str(&e))?;
            let wrap_key = get_wrap_key(
                &request.session_id,
                request_type,
                config::WRAP_KEY_SEED_TIMEOUT_MS,
            )
            .await?;
            let result = handlers::handle_sign_nep413_message(request, wrap_key)
                .await
                .map_err(|e| JsValue::from_str(&e))?;
            to_response_value(&result)?
        }
        // Normalizes relay-returned MPC signature blobs; ambiguous 64-byte
        // shapes surface both recovery-id candidates explicitly.
        WorkerRequestType::NormalizeMpcSignature => {
            let request: NormalizeMpcSignatureRequest =
                parse_typed_payload(&payload, request_type).map_err(|e| JsValue::from_str(&e))?;
            let result = handlers::handle_normalize_mpc_signature(request)
                .await
                .map_err(|e| JsValue::from_str(&e))?;
            to_response_value(&result)?
        }
        WorkerRequestType::HealthCheck => Value::Bool(true),
    };

    let response_type = match request_type {
        WorkerRequestType::DeriveNearKeypairAndEncrypt => {
            WorkerResponseType::DeriveNearKeypairAndEncryptSuccess
        }
        WorkerRequestType::RecoverKeypairFromPasskey => {
            WorkerResponseType::RecoverKeypairFromPasskeySuccess
        }
        WorkerRequestType::DecryptPrivateKeyWithPrf => {
            WorkerResponseType::DecryptPrivateKeyWithPrfSuccess
        }
        WorkerRequestType::SignTransactionsWithActions => {
            WorkerResponseType::SignTransactionsWithActionsSuccess
        }
        WorkerRequestType::SignDelegateAction => WorkerResponseType::SignDelegateActionSuccess,
        WorkerRequestType::ExtractCosePublicKey => WorkerResponseType::ExtractCosePublicKeySuccess,
        WorkerRequestType::SignTransactionWithKeyPair => {
            WorkerResponseType::SignTransactionWithKeyPairSuccess
        }
        WorkerRequestType::SignNep413Message => WorkerResponseType::SignNep413MessageSuccess,
        WorkerRequestType::NormalizeMpcSignature => {
            WorkerResponseType::NormalizeMpcSignatureSuccess
        }
        WorkerRequestType::HealthCheck => WorkerResponseType::HealthCheckSuccess,
    };

    debug!(
        "Signer worker: response type {} ({})",
        worker_response_type_name(response_type),
        u32::from(response_type)
    );

    let response = SignerWorkerResponse {
        response_type: u32::from(response_type),
        payload: response_payload,
    };

    serde_wasm_bindgen::to_value(&response)
        .map_err(|e| JsValue::from_str(&format!("Failed to serialize response: {:?}", e)))
}

fn to_response_value<T: serde::Serialize>(result: &T) -> Result<Value, JsValue> {
    serde_json::to_value(result)
        .map_err(|e| JsValue::from_str(&format!("Failed to serialize result: {}", e)))
}

/// Structural guard over inbound payloads: PRF output and VRF secrets must
/// never appear under any key, at any depth.
pub fn find_forbidden_secret_field(value: &Value) -> Option<String> {
    const FORBIDDEN_KEYS: [&str; 7] = [
        "prfOutput",
        "prf_output",
        "prfFirst",
        "prf_first",
        "prf",
        "vrfSk",
        "vrf_sk",
    ];
    match value {
        Value::Object(map) => {
            for (k, v) in map {
                if FORBIDDEN_KEYS.contains(&k.as_str()) {
                    return Some(k.clone());
                }
                if let Some(inner) = find_forbidden_secret_field(v) {
                    return Some(inner);
                }
            }
            None
        }
        Value::Array(arr) => {
            for v in arr {
                if let Some(inner) = find_forbidden_secret_field(v) {
                    return Some(inner);
                }
            }
            None
        }
        _ => None,
    }
}
