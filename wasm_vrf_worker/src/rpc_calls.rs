use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::VrfWorkerError;
use crate::fetch::fetch_json_post;
use crate::types::VRFChallengeData;
use crate::utils::base64_url_decode;
use base64ct::{Base64, Encoding};

pub const VERIFY_AUTHENTICATION_RESPONSE_METHOD: &str = "verify_authentication_response";

/// Contract verification result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractVerificationResult {
    pub success: bool,
    pub verified: bool,
    pub error: Option<String>,
    pub logs: Vec<String>,
}

/// VRF challenge data in the byte-level shape the contract verifier expects
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct VrfData {
    pub vrf_input_data: Vec<u8>,
    pub vrf_output: Vec<u8>,
    pub vrf_proof: Vec<u8>,
    pub public_key: Vec<u8>,
    pub user_id: String,
    pub rp_id: String,
    pub block_height: u64,
    pub block_hash: Vec<u8>,
}

impl TryFrom<&VRFChallengeData> for VrfData {
    type Error = VrfWorkerError;

    fn try_from(challenge: &VRFChallengeData) -> Result<Self, Self::Error> {
        Ok(VrfData {
            vrf_input_data: base64_url_decode(&challenge.vrf_input)?,
            vrf_output: base64_url_decode(&challenge.vrf_output)?,
            vrf_proof: base64_url_decode(&challenge.vrf_proof)?,
            public_key: base64_url_decode(&challenge.vrf_public_key)?,
            user_id: challenge.user_id.clone(),
            rp_id: challenge.rp_id.clone(),
            block_height: challenge.block_height.parse::<u64>().map_err(|e| {
                VrfWorkerError::invalid_format(&format!("invalid blockHeight: {}", e))
            })?,
            block_hash: base64_url_decode(&challenge.block_hash)?,
        })
    }
}

/// WebAuthn authentication credential as submitted to the contract verifier.
/// PRF extension results are intentionally absent from this struct, so any
/// PRF output present in the source object never reaches the network.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct WebAuthnAuthenticationCredential {
    pub id: String,
    #[serde(rename = "rawId")]
    pub raw_id: String,
    pub response: WebAuthnAuthenticationResponse,
    #[serde(rename = "authenticatorAttachment")]
    pub authenticator_attachment: Option<String>,
    #[serde(rename = "type")]
    pub auth_type: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct WebAuthnAuthenticationResponse {
    #[serde(rename = "clientDataJSON")]
    pub client_data_json: String,
    #[serde(rename = "authenticatorData")]
    pub authenticator_data: String,
    pub signature: String,
    #[serde(rename = "userHandle")]
    pub user_handle: Option<String>,
}

/// Call the contract's verify_authentication_response view method over NEAR
/// JSON-RPC. Used to gate WrapKeySeed derivation on a verified session.
pub async fn verify_authentication_response_rpc_call(
    contract_id: &str,
    rpc_url: &str,
    vrf_data: VrfData,
    webauthn_authentication_credential: WebAuthnAuthenticationCredential,
) -> Result<ContractVerificationResult, VrfWorkerError> {
    let contract_args = serde_json::json!({
        "vrf_data": vrf_data,
        "webauthn_authentication": webauthn_authentication_credential
    });
    let rpc_body = serde_json::json!({
        "jsonrpc": "2.0",
        "id": "verify_from_vrf_worker",
        "method": "query",
        "params": {
            "request_type": "call_function",
            "account_id": contract_id,
            "method_name": VERIFY_AUTHENTICATION_RESPONSE_METHOD,
            "args_base64": Base64::encode_string(contract_args.to_string().as_bytes()),
            // 'final' aligns with the finality used to fetch the VRF
            // challenge's block context
            "finality": "final"
        }
    });

    debug!("verify_authentication_response RPC: {}", rpc_url);
    let resp = fetch_json_post(rpc_url, &rpc_body.to_string())
        .await
        .map_err(VrfWorkerError::Http)?;
    let result: Value = serde_json::from_str(&resp.body)?;

    if let Some(error) = result.get("error") {
        let error_msg = error
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("Unknown RPC error");
        return Ok(ContractVerificationResult {
            success: false,
            verified: false,
            error: Some(error_msg.to_string()),
            logs: vec![],
        });
    }

    let contract_result = result
        .get("result")
        .ok_or_else(|| VrfWorkerError::Http("Missing result in RPC response".to_string()))?;

    if let Some(error) = contract_result.get("error") {
        let error_msg = error
            .as_str()
            .map(|s| s.to_string())
            .unwrap_or_else(|| error.to_string());
        warn!("Contract execution error: {}", error_msg);
        return Ok(ContractVerificationResult {
            success: false,
            verified: false,
            error: Some(error_msg),
            logs: vec![],
        });
    }

    let result_bytes = contract_result
        .get("result")
        .and_then(|r| r.as_array())
        .ok_or_else(|| VrfWorkerError::Http("Missing result.result array".to_string()))?;

    let result_u8: Vec<u8> = result_bytes
        .iter()
        .map(|v| v.as_u64().unwrap_or(0) as u8)
        .collect();

    let result_string = String::from_utf8(result_u8)
        .map_err(|e| VrfWorkerError::Http(format!("Failed to decode result string: {}", e)))?;

    let contract_response: Value = serde_json::from_str(&result_string)?;

    let verified = contract_response
        .get("verified")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    let logs = contract_result
        .get("logs")
        .and_then(|l| l.as_array())
        .map(|logs_array| {
            logs_array
                .iter()
                .filter_map(|log| log.as_str().map(|s| s.to_string()))
                .collect()
        })
        .unwrap_or_default();

    Ok(ContractVerificationResult {
        success: true,
        verified,
        error: None,
        logs,
    })
}
