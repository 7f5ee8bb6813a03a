use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::crypto::{decrypt_data_chacha20, WrapKey};
use crate::types::handlers::DecryptionPayload;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecryptPrivateKeyRequest {
    pub session_id: String,
    pub near_account_id: String,
    pub decryption: DecryptionPayload,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecryptPrivateKeyResult {
    pub private_key: String,
    pub near_account_id: String,
}

/// **Handles:** `WorkerRequestType::DecryptPrivateKeyWithPrf`
///
/// Decrypts the stored NEAR private key using the session's WrapKeySeed.
/// The plaintext key exists here only long enough to hand to the export
/// viewer; the host suppresses all confirmation UI for this flow.
pub async fn handle_decrypt_private_key_with_prf(
    request: DecryptPrivateKeyRequest,
    wrap_key: WrapKey,
) -> Result<DecryptPrivateKeyResult, String> {
    let kek = Zeroizing::new(wrap_key.derive_kek()?);

    let private_key = decrypt_data_chacha20(
        &request.decryption.encrypted_private_key_data,
        &request.decryption.encrypted_private_key_chacha20_nonce_b64u,
        &kek,
    )
    .map_err(|e| format!("Decryption failed: {}", e))?;

    Ok(DecryptPrivateKeyResult {
        private_key,
        near_account_id: request.near_account_id,
    })
}
