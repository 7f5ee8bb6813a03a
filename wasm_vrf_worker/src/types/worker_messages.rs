// === WORKER MESSAGES: REQUEST & RESPONSE TYPES ===

use crate::errors::{MessageError, VrfWorkerError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use wasm_bindgen::prelude::*;

// === WORKER REQUEST TYPE ENUM ===

// These export to TypeScript as numeric enums; the wire carries string names.
#[wasm_bindgen]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerRequestType {
    Ping,
    GenerateVrfChallenge,
    GenerateVrfKeypairBootstrap,
    UnlockVrfKeypair,
    CheckVrfStatus,
    ClearVrfSession,
    DeriveVrfKeypairFromPrf,
    Shamir3PassClientEncryptCurrentVrfKeypair,
    Shamir3PassClientDecryptVrfKeypair,
    Shamir3PassGenerateServerKeypair,
    Shamir3PassApplyServerLock,
    Shamir3PassRemoveServerLock,
    Shamir3PassConfigP,
    Shamir3PassConfigServerUrls,
    DeriveWrapKeySeedAndSession,
}

impl TryFrom<&str> for WorkerRequestType {
    type Error = VrfWorkerError;

    fn try_from(value: &str) -> Result<Self, VrfWorkerError> {
        match value {
            "PING" => Ok(WorkerRequestType::Ping),
            "GENERATE_VRF_CHALLENGE" => Ok(WorkerRequestType::GenerateVrfChallenge),
            "GENERATE_VRF_KEYPAIR_BOOTSTRAP" => Ok(WorkerRequestType::GenerateVrfKeypairBootstrap),
            "UNLOCK_VRF_KEYPAIR" => Ok(WorkerRequestType::UnlockVrfKeypair),
            "CHECK_VRF_STATUS" => Ok(WorkerRequestType::CheckVrfStatus),
            "CLEAR_VRF_SESSION" => Ok(WorkerRequestType::ClearVrfSession),
            "DERIVE_VRF_KEYPAIR_FROM_PRF" => Ok(WorkerRequestType::DeriveVrfKeypairFromPrf),
            "SHAMIR3PASS_CLIENT_ENCRYPT_CURRENT_VRF_KEYPAIR" => {
                Ok(WorkerRequestType::Shamir3PassClientEncryptCurrentVrfKeypair)
            }
            "SHAMIR3PASS_CLIENT_DECRYPT_VRF_KEYPAIR" => {
                Ok(WorkerRequestType::Shamir3PassClientDecryptVrfKeypair)
            }
            "SHAMIR3PASS_GENERATE_SERVER_KEYPAIR" => {
                Ok(WorkerRequestType::Shamir3PassGenerateServerKeypair)
            }
            "SHAMIR3PASS_APPLY_SERVER_LOCK_KEK" => {
                Ok(WorkerRequestType::Shamir3PassApplyServerLock)
            }
            "SHAMIR3PASS_REMOVE_SERVER_LOCK_KEK" => {
                Ok(WorkerRequestType::Shamir3PassRemoveServerLock)
            }
            "SHAMIR3PASS_CONFIG_P" => Ok(WorkerRequestType::Shamir3PassConfigP),
            "SHAMIR3PASS_CONFIG_SERVER_URLS" => Ok(WorkerRequestType::Shamir3PassConfigServerUrls),
            "DERIVE_WRAP_KEY_SEED_AND_SESSION" => {
                Ok(WorkerRequestType::DeriveWrapKeySeedAndSession)
            }
            other => Err(VrfWorkerError::MessageParsing(
                MessageError::UnknownRequestType(other.to_string()),
            )),
        }
    }
}

impl WorkerRequestType {
    pub fn name(&self) -> &'static str {
        match self {
            WorkerRequestType::Ping => "PING",
            WorkerRequestType::GenerateVrfChallenge => "GENERATE_VRF_CHALLENGE",
            WorkerRequestType::GenerateVrfKeypairBootstrap => "GENERATE_VRF_KEYPAIR_BOOTSTRAP",
            WorkerRequestType::UnlockVrfKeypair => "UNLOCK_VRF_KEYPAIR",
            WorkerRequestType::CheckVrfStatus => "CHECK_VRF_STATUS",
            WorkerRequestType::ClearVrfSession => "CLEAR_VRF_SESSION",
            WorkerRequestType::DeriveVrfKeypairFromPrf => "DERIVE_VRF_KEYPAIR_FROM_PRF",
            WorkerRequestType::Shamir3PassClientEncryptCurrentVrfKeypair => {
                "SHAMIR3PASS_CLIENT_ENCRYPT_CURRENT_VRF_KEYPAIR"
            }
            WorkerRequestType::Shamir3PassClientDecryptVrfKeypair => {
                "SHAMIR3PASS_CLIENT_DECRYPT_VRF_KEYPAIR"
            }
            WorkerRequestType::Shamir3PassGenerateServerKeypair => {
                "SHAMIR3PASS_GENERATE_SERVER_KEYPAIR"
            }
            WorkerRequestType::Shamir3PassApplyServerLock => "SHAMIR3PASS_APPLY_SERVER_LOCK_KEK",
            WorkerRequestType::Shamir3PassRemoveServerLock => "SHAMIR3PASS_REMOVE_SERVER_LOCK_KEK",
            WorkerRequestType::Shamir3PassConfigP => "SHAMIR3PASS_CONFIG_P",
            WorkerRequestType::Shamir3PassConfigServerUrls => "SHAMIR3PASS_CONFIG_SERVER_URLS",
            WorkerRequestType::DeriveWrapKeySeedAndSession => "DERIVE_WRAP_KEY_SEED_AND_SESSION",
        }
    }
}

/// Main worker message structure
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct VrfWorkerMessage {
    #[serde(rename = "type")]
    pub msg_type: String,
    pub id: Option<String>,
    pub payload: Option<serde_json::Value>,
}

impl VrfWorkerMessage {
    pub fn parse_payload<T: DeserializeOwned>(
        &self,
        request_type: WorkerRequestType,
    ) -> Result<T, VrfWorkerError> {
        let payload = self.payload.as_ref().ok_or_else(|| {
            VrfWorkerError::MissingRequiredData(format!("{}: Missing payload", request_type.name()))
        })?;

        serde_json::from_value(payload.clone()).map_err(|e| {
            VrfWorkerError::MessageParsing(MessageError::JsonParsingFailed(format!(
                "{}: {}",
                request_type.name(),
                e
            )))
        })
    }
}

/// Main worker response structure
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct VrfWorkerResponse {
    pub id: Option<String>,
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
}

impl VrfWorkerResponse {
    pub fn new(
        id: Option<String>,
        success: bool,
        data: Option<serde_json::Value>,
        error: Option<String>,
    ) -> Self {
        Self {
            id,
            success,
            data,
            error,
        }
    }

    pub fn success(id: Option<String>, data: Option<serde_json::Value>) -> Self {
        Self::new(id, true, data, None)
    }

    /// Serialize a typed payload into the `data` field.
    pub fn success_from<T: Serialize>(id: Option<String>, data: Option<T>) -> Self {
        let data = data.and_then(|d| serde_json::to_value(d).ok());
        Self::new(id, true, data, None)
    }

    pub fn fail(id: Option<String>, message: impl Into<String>) -> Self {
        Self::new(id, false, None, Some(message.into()))
    }
}
