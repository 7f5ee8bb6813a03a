use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::crypto::{derive_ed25519_key_from_prf_output, encrypt_data_chacha20, WrapKey};
use crate::types::EncryptedDataChaCha20Response;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoverKeypairRequest {
    pub session_id: String,
    /// Account the recovered key is expected to belong to. Recovery flows
    /// that enumerate candidate accounts call once per candidate.
    pub account_id_hint: String,
    #[serde(default = "default_device_number")]
    pub device_number: u8,
}

fn default_device_number() -> u8 {
    1
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoverKeypairResult {
    pub public_key: String,
    pub encrypted_private_key: EncryptedDataChaCha20Response,
    pub account_id_hint: String,
    pub device_number: u8,
}

/// **Handles:** `WorkerRequestType::RecoverKeypairFromPasskey`
///
/// Re-derives the NEAR keypair from the credential's PRF.first (delivered
/// over the session port) and re-wraps it for local storage. Derivation is
/// deterministic, so the recovered public key equals the registered one
/// exactly when the hint names the right account and device.
pub async fn handle_recover_keypair_from_passkey(
    request: RecoverKeypairRequest,
    wrap_key: WrapKey,
    prf_first_b64u: String,
) -> Result<RecoverKeypairResult, String> {
    let (private_key, public_key) = derive_ed25519_key_from_prf_output(
        &prf_first_b64u,
        &request.account_id_hint,
        request.device_number,
    )
    .map_err(|e| e.to_string())?;
    let private_key = Zeroizing::new(private_key);

    let kek = Zeroizing::new(wrap_key.derive_kek()?);
    let encrypted_private_key = encrypt_data_chacha20(&private_key, &kek)?
        .with_wrap_key_salt_b64u(wrap_key.salt_b64u());

    Ok(RecoverKeypairResult {
        public_key,
        encrypted_private_key,
        account_id_hint: request.account_id_hint,
        device_number: request.device_number,
    })
}
