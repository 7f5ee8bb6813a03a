// === WORKER MESSAGES: REQUEST & RESPONSE TYPES ===

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use wasm_bindgen::prelude::*;

use crate::error::scrub_error_message;

// These export to TypeScript as numeric enums; the wire carries the numbers.
#[wasm_bindgen]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerRequestType {
    DeriveNearKeypairAndEncrypt,
    RecoverKeypairFromPasskey,
    DecryptPrivateKeyWithPrf,
    SignTransactionsWithActions,
    SignDelegateAction,
    ExtractCosePublicKey,
    SignTransactionWithKeyPair,
    SignNep413Message,
    HealthCheck,
    NormalizeMpcSignature,
}

impl TryFrom<u32> for WorkerRequestType {
    type Error = String;

    fn try_from(value: u32) -> Result<Self, String> {
        match value {
            0 => Ok(WorkerRequestType::DeriveNearKeypairAndEncrypt),
            1 => Ok(WorkerRequestType::RecoverKeypairFromPasskey),
            2 => Ok(WorkerRequestType::DecryptPrivateKeyWithPrf),
            3 => Ok(WorkerRequestType::SignTransactionsWithActions),
            4 => Ok(WorkerRequestType::SignDelegateAction),
            5 => Ok(WorkerRequestType::ExtractCosePublicKey),
            6 => Ok(WorkerRequestType::SignTransactionWithKeyPair),
            7 => Ok(WorkerRequestType::SignNep413Message),
            8 => Ok(WorkerRequestType::HealthCheck),
            9 => Ok(WorkerRequestType::NormalizeMpcSignature),
            _ => Err(format!("Invalid WorkerRequestType value: {}", value)),
        }
    }
}

pub fn worker_request_type_name(request_type: WorkerRequestType) -> &'static str {
    match request_type {
        WorkerRequestType::DeriveNearKeypairAndEncrypt => "DERIVE_NEAR_KEYPAIR_AND_ENCRYPT",
        WorkerRequestType::RecoverKeypairFromPasskey => "RECOVER_KEYPAIR_FROM_PASSKEY",
        WorkerRequestType::DecryptPrivateKeyWithPrf => "DECRYPT_PRIVATE_KEY_WITH_PRF",
        WorkerRequestType::SignTransactionsWithActions => "SIGN_TRANSACTIONS_WITH_ACTIONS",
        WorkerRequestType::SignDelegateAction => "SIGN_DELEGATE_ACTION",
        WorkerRequestType::ExtractCosePublicKey => "EXTRACT_COSE_PUBLIC_KEY",
        WorkerRequestType::SignTransactionWithKeyPair => "SIGN_TRANSACTION_WITH_KEYPAIR",
        WorkerRequestType::SignNep413Message => "SIGN_NEP413_MESSAGE",
        WorkerRequestType::HealthCheck => "HEALTH_CHECK",
        WorkerRequestType::NormalizeMpcSignature => "NORMALIZE_MPC_SIGNATURE",
    }
}

/// Success response codes, one per request type, sharing the numeric space
/// with the progress codes in `progress.rs` (which start at 18).
#[wasm_bindgen]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerResponseType {
    DeriveNearKeypairAndEncryptSuccess,
    RecoverKeypairFromPasskeySuccess,
    DecryptPrivateKeyWithPrfSuccess,
    SignTransactionsWithActionsSuccess,
    SignDelegateActionSuccess,
    ExtractCosePublicKeySuccess,
    SignTransactionWithKeyPairSuccess,
    SignNep413MessageSuccess,
    HealthCheckSuccess,
    NormalizeMpcSignatureSuccess,
}

impl From<WorkerResponseType> for u32 {
    fn from(value: WorkerResponseType) -> Self {
        match value {
            WorkerResponseType::DeriveNearKeypairAndEncryptSuccess => 0,
            WorkerResponseType::RecoverKeypairFromPasskeySuccess => 1,
            WorkerResponseType::DecryptPrivateKeyWithPrfSuccess => 2,
            WorkerResponseType::SignTransactionsWithActionsSuccess => 3,
            WorkerResponseType::SignDelegateActionSuccess => 4,
            WorkerResponseType::ExtractCosePublicKeySuccess => 5,
            WorkerResponseType::SignTransactionWithKeyPairSuccess => 6,
            WorkerResponseType::SignNep413MessageSuccess => 7,
            WorkerResponseType::HealthCheckSuccess => 8,
            WorkerResponseType::NormalizeMpcSignatureSuccess => 9,
        }
    }
}

pub fn worker_response_type_name(response_type: WorkerResponseType) -> &'static str {
    match response_type {
        WorkerResponseType::DeriveNearKeypairAndEncryptSuccess => {
            "DERIVE_NEAR_KEYPAIR_AND_ENCRYPT_SUCCESS"
        }
        WorkerResponseType::RecoverKeypairFromPasskeySuccess => {
            "RECOVER_KEYPAIR_FROM_PASSKEY_SUCCESS"
        }
        WorkerResponseType::DecryptPrivateKeyWithPrfSuccess => {
            "DECRYPT_PRIVATE_KEY_WITH_PRF_SUCCESS"
        }
        WorkerResponseType::SignTransactionsWithActionsSuccess => {
            "SIGN_TRANSACTIONS_WITH_ACTIONS_SUCCESS"
        }
        WorkerResponseType::SignDelegateActionSuccess => "SIGN_DELEGATE_ACTION_SUCCESS",
        WorkerResponseType::ExtractCosePublicKeySuccess => "EXTRACT_COSE_PUBLIC_KEY_SUCCESS",
        WorkerResponseType::SignTransactionWithKeyPairSuccess => {
            "SIGN_TRANSACTION_WITH_KEYPAIR_SUCCESS"
        }
        WorkerResponseType::SignNep413MessageSuccess => "SIGN_NEP413_MESSAGE_SUCCESS",
        WorkerResponseType::HealthCheckSuccess => "HEALTH_CHECK_SUCCESS",
        WorkerResponseType::NormalizeMpcSignatureSuccess => "NORMALIZE_MPC_SIGNATURE_SUCCESS",
    }
}

/// Parsed `{ type, payload }` envelope
pub struct SignerWorkerMessage {
    pub request_type: WorkerRequestType,
    pub request_type_raw: u32,
    pub payload: Value,
}

/// Parse the outer envelope from a JSON value.
pub fn parse_worker_request_envelope(raw: Value) -> Result<SignerWorkerMessage, String> {
    let msg_type_num = raw
        .get("type")
        .and_then(|t| t.as_u64())
        .ok_or_else(|| "Worker message missing numeric 'type' field".to_string())?
        as u32;

    let request_type = WorkerRequestType::try_from(msg_type_num)?;

    let payload = raw.get("payload").cloned().unwrap_or(Value::Null);

    Ok(SignerWorkerMessage {
        request_type,
        request_type_raw: msg_type_num,
        payload,
    })
}

/// Parse a typed payload, scrubbing the error text: serde errors can embed
/// the offending value, which may contain secrets.
pub fn parse_typed_payload<T: DeserializeOwned>(
    payload: &Value,
    request_type: WorkerRequestType,
) -> Result<T, String> {
    serde_json::from_value(payload.clone()).map_err(|e| {
        scrub_error_message(&format!(
            "Invalid payload for {}: {}",
            worker_request_type_name(request_type),
            e
        ))
    })
}

/// Final worker response envelope
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SignerWorkerResponse {
    #[serde(rename = "type")]
    pub response_type: u32,
    pub payload: Value,
}
