use serde::{Deserialize, Serialize};

use crate::encoders::base64_url_decode;
use crate::mpc_signature::NormalizedMpcSignature;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizeMpcSignatureRequest {
    /// Raw signature blob from the MPC relay, base64url: either 64 bytes
    /// (r || s) or 65 bytes (r || s || v)
    pub signature_b64u: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizeMpcSignatureResult {
    pub signature: NormalizedMpcSignature,
}

/// **Handles:** `WorkerRequestType::NormalizeMpcSignature`
///
/// Normalizes an MPC relay signature blob before the host applies it to a
/// cross-chain key action. 65-byte blobs resolve to a single recovery id;
/// 64-byte blobs come back as the explicit `UnresolvedRecoveryId` variant
/// carrying both candidates, and the caller must resolve against the
/// expected public key before use.
pub async fn handle_normalize_mpc_signature(
    request: NormalizeMpcSignatureRequest,
) -> Result<NormalizeMpcSignatureResult, String> {
    let blob = base64_url_decode(&request.signature_b64u)?;
    let signature = NormalizedMpcSignature::parse(&blob)?;

    Ok(NormalizeMpcSignatureResult { signature })
}
