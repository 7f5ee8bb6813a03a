use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::actions::ActionParams;
use crate::crypto::{decrypt_data_chacha20, signing_key_from_near_private_key, WrapKey};
use crate::transaction::{build_actions_from_params, sign_delegate_action};
use crate::types::handlers::DecryptionPayload;
use crate::types::{AccountId, DelegateAction, PublicKey, WasmSignedDelegate};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignDelegateActionRequest {
    pub session_id: String,
    pub near_account_id: String,
    pub decryption: DecryptionPayload,
    pub delegate: DelegatePayload,
}

/// NEP-366 delegate action in boundary form
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DelegatePayload {
    pub sender_id: String,
    pub receiver_id: String,
    pub actions: Vec<ActionParams>,
    pub nonce: String,
    pub max_block_height: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DelegateSignResult {
    pub success: bool,
    pub signed_delegate: Option<WasmSignedDelegate>,
    pub logs: Vec<String>,
    pub error: Option<String>,
}

/// **Handles:** `WorkerRequestType::SignDelegateAction`
///
/// Signs a NEP-366 delegate action for meta-transaction relaying. The inner
/// actions are built with the same validation as direct transactions.
pub async fn handle_sign_delegate_action(
    request: SignDelegateActionRequest,
    wrap_key: WrapKey,
) -> Result<DelegateSignResult, String> {
    let mut logs = Vec::new();

    let sender_id: AccountId = request
        .delegate
        .sender_id
        .parse()
        .map_err(|e| format!("Invalid sender account: {}", e))?;
    let receiver_id: AccountId = request
        .delegate
        .receiver_id
        .parse()
        .map_err(|e| format!("Invalid receiver account: {}", e))?;
    let nonce: u64 = request
        .delegate
        .nonce
        .parse()
        .map_err(|e| format!("Invalid nonce: {}", e))?;
    let max_block_height: u64 = request
        .delegate
        .max_block_height
        .parse()
        .map_err(|e| format!("Invalid max block height: {}", e))?;

    let actions = build_actions_from_params(request.delegate.actions.clone())?;

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
    logs.push("Private key decrypted successfully".to_string());

    let delegate = DelegateAction {
        sender_id,
        receiver_id,
        actions,
        nonce,
        max_block_height,
        public_key: PublicKey::from_ed25519_bytes(&signing_key.verifying_key().to_bytes()),
    };

    let signed_delegate = sign_delegate_action(&delegate, &signing_key)?;
    logs.push("Delegate action signed".to_string());

    Ok(DelegateSignResult {
        success: true,
        signed_delegate: Some(WasmSignedDelegate::from_signed_delegate(&signed_delegate)?),
        logs,
        error: None,
    })
}
