use borsh::{BorshSerialize, BorshDeserialize};
use ed25519_dalek::Signer;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::config::NEP413_SIGNABLE_TAG;
use crate::crypto::{decrypt_data_chacha20, signing_key_from_near_private_key, WrapKey};
use crate::encoders::{base64_standard_decode, base64_standard_encode};
use crate::types::handlers::DecryptionPayload;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignNep413Request {
    pub session_id: String,
    pub account_id: String,
    pub decryption: DecryptionPayload,
    pub message: String,
    pub recipient: String,
    /// 32-byte nonce, standard base64
    pub nonce: String,
    #[serde(default)]
    pub state: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignNep413Result {
    pub account_id: String,
    pub public_key: String,
    /// Standard base64 ed25519 signature, as NEP-413 verifiers expect
    pub signature: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

/// Borsh-serialized NEP-413 payload (message the user signs off-chain)
#[derive(BorshSerialize, BorshDeserialize)]
struct Nep413Payload {
    message: String,
    nonce: [u8; 32],
    recipient: String,
    callback_url: Option<String>,
}

/// **Handles:** `WorkerRequestType::SignNep413Message`
///
/// NEP-413 off-chain message signing: the signable bytes are
/// borsh(2^31 + 413) || borsh(payload), hashed with SHA-256, signed with the
/// account's ed25519 key. The discriminant keeps these signatures from ever
/// colliding with transaction signatures.
pub async fn handle_sign_nep413_message(
    request: SignNep413Request,
    wrap_key: WrapKey,
) -> Result<SignNep413Result, String> {
    let nonce_bytes = base64_standard_decode(&request.nonce)?;
    let nonce: [u8; 32] = nonce_bytes
        .try_into()
        .map_err(|_| "NEP-413 nonce must be exactly 32 bytes".to_string())?;

    let kek = Zeroizing::new(wrap_key.derive_kek()?);
    let private_key = Zeroizing::new(
        decrypt_data_chacha20(
            &request.decryption.encrypted_private_key_data,
            &request.decryption.encrypted_private_key_chacha20_nonce_b64u,
            &kek,
        )
        .map_err(|e| format!("Decryption failed: {}", e))?,
    );
    let signing_key = signing_key_from_near_private_key(&private_key)?;

    let payload = Nep413Payload {
        message: request.message,
        nonce,
        recipient: request.recipient,
        callback_url: None,
    };

    let mut signable = Vec::new();
    borsh::BorshSerialize::serialize(&NEP413_SIGNABLE_TAG, &mut signable)
        .map_err(|e| format!("Failed to serialize NEP-413 tag: {}", e))?;
    payload
        .serialize(&mut signable)
        .map_err(|e| format!("Failed to serialize NEP-413 payload: {}", e))?;

    let hash = Sha256::digest(&signable);
    let signature = signing_key.sign(&hash);

    let public_key = format!(
        "ed25519:{}",
        bs58::encode(signing_key.verifying_key().to_bytes()).into_string()
    );

    Ok(SignNep413Result {
        account_id: request.account_id,
        public_key,
        signature: base64_standard_encode(&signature.to_bytes()),
        state: request.state,
    })
}
