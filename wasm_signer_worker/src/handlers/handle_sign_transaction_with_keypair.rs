use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::actions::ActionParams;
use crate::crypto::signing_key_from_near_private_key;
use crate::transaction::{
    build_actions_from_params, build_transaction_with_actions, calculate_transaction_hash,
    sign_transaction,
};
use crate::types::{SignedTransaction, WasmSignedTransaction};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignTransactionWithKeyPairRequest {
    /// Plaintext NEAR private key. Only the device-linking key-replacement
    /// flow uses this handler; no PRF or session material is involved.
    pub near_private_key: String,
    pub signer_account_id: String,
    pub receiver_id: String,
    pub nonce: String,
    pub block_hash: String,
    pub actions: Vec<ActionParams>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyActionResult {
    pub success: bool,
    pub transaction_hash: Option<String>,
    pub signed_transaction: Option<WasmSignedTransaction>,
    pub logs: Vec<String>,
    pub error: Option<String>,
}

/// **Handles:** `WorkerRequestType::SignTransactionWithKeyPair`
///
/// Device-linking only: the old device signs the AddKey/DeleteKey
/// replacement transaction with an explicitly supplied key.
pub async fn handle_sign_transaction_with_keypair(
    request: SignTransactionWithKeyPairRequest,
) -> Result<KeyActionResult, String> {
    let mut logs = Vec::new();

    let private_key = Zeroizing::new(request.near_private_key.clone());
    let signing_key = signing_key_from_near_private_key(&private_key)?;

    let nonce: u64 = request
        .nonce
        .parse()
        .map_err(|e| format!("Invalid nonce: {}", e))?;
    let block_hash_bytes = bs58::decode(&request.block_hash)
        .into_vec()
        .map_err(|e| format!("Invalid block hash: {}", e))?;

    let actions = build_actions_from_params(request.actions.clone())?;

    let transaction = build_transaction_with_actions(
        &request.signer_account_id,
        &request.receiver_id,
        nonce,
        &block_hash_bytes,
        &signing_key,
        actions,
    )?;

    let signed_tx_bytes = sign_transaction(transaction, &signing_key)?;
    let transaction_hash = calculate_transaction_hash(&signed_tx_bytes);
    logs.push(format!("Transaction signed (hash {})", transaction_hash));

    let signed_tx = SignedTransaction::from_borsh_bytes(&signed_tx_bytes)?;

    Ok(KeyActionResult {
        success: true,
        transaction_hash: Some(transaction_hash),
        signed_transaction: Some(WasmSignedTransaction::from_signed_transaction(&signed_tx)?),
        logs,
        error: None,
    })
}
