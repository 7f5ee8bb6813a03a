use serde::{Deserialize, Serialize};

use crate::cose::extract_cose_public_key_from_attestation;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractCoseRequest {
    /// base64url attestation object from a registration credential
    pub attestation_object_base64url: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoseExtractionResult {
    /// Canonical CBOR bytes of the COSE_Key map
    pub cose_public_key_bytes: Vec<u8>,
}

/// **Handles:** `WorkerRequestType::ExtractCosePublicKey`
///
/// Device records persist the authenticator's COSE public key; this pulls it
/// out of the attestation object produced at registration.
pub async fn handle_extract_cose_public_key(
    request: ExtractCoseRequest,
) -> Result<CoseExtractionResult, String> {
    let cose_public_key_bytes =
        extract_cose_public_key_from_attestation(&request.attestation_object_base64url)?;

    Ok(CoseExtractionResult {
        cose_public_key_bytes,
    })
}
