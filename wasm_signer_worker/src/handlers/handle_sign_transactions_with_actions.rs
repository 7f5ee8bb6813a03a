// ******************************************************************************
// *                                                                            *
// *                 HANDLER: SIGN TRANSACTIONS WITH ACTIONS                    *
// *                                                                            *
// ******************************************************************************

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::actions::ActionParams;
use crate::config::{now_ms, SESSION_MAX_DURATION_MS};
use crate::crypto::{decrypt_data_chacha20, signing_key_from_near_private_key, WrapKey};
use crate::transaction::{
    build_actions_from_params, build_transaction_with_actions, calculate_transaction_hash,
    sign_transaction,
};
use crate::types::{
    handlers::{ConfirmationConfig, DecryptionPayload, RpcCallPayload, TransactionContext},
    progress::{
        send_completion_message, send_progress_message, ProgressData, ProgressMessageType,
        ProgressStep,
    },
    SignedTransaction, WasmSignedTransaction,
};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignTransactionsWithActionsRequest {
    pub rpc_call: RpcCallPayload,
    pub session_id: String,
    pub created_at: Option<f64>,
    pub decryption: DecryptionPayload,
    pub tx_signing_requests: Vec<TransactionPayload>,
    /// Confirmation configuration the host flow ran with (echoed for logs)
    pub confirmation_config: Option<ConfirmationConfig>,
    /// Intent digest the confirmation flow verified against the UI
    pub intent_digest: Option<String>,
    /// Chain context reserved by the host's nonce manager
    pub transaction_context: Option<TransactionContext>,
    /// The exact nonces the host reserved for this batch, one per
    /// transaction and in order. Signing never invents nonces when a
    /// reservation is present; the broadcast must use the reserved block.
    pub reserved_nonces: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionPayload {
    pub near_account_id: String,
    pub receiver_id: String,
    pub actions: Vec<ActionParams>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionSignResult {
    pub success: bool,
    pub transaction_hashes: Option<Vec<String>>,
    pub signed_transactions: Option<Vec<WasmSignedTransaction>>,
    pub logs: Vec<String>,
    pub error: Option<String>,
}

impl TransactionSignResult {
    pub fn new(
        success: bool,
        transaction_hashes: Option<Vec<String>>,
        signed_transactions: Option<Vec<WasmSignedTransaction>>,
        logs: Vec<String>,
        error: Option<String>,
    ) -> TransactionSignResult {
        TransactionSignResult {
            success,
            transaction_hashes,
            signed_transactions,
            logs,
            error,
        }
    }

    pub fn failed(logs: Vec<String>, error_msg: String) -> TransactionSignResult {
        TransactionSignResult::new(false, None, None, logs, Some(error_msg))
    }
}

/// **Handles:** `WorkerRequestType::SignTransactionsWithActions`
///
/// Signs a batch of transactions with one decrypted key. Confirmation,
/// credential collection, and nonce reservation already ran in the host's
/// confirmation flow; this handler only signs, baking each transaction's
/// nonce from the reserved block when one is present.
pub async fn handle_sign_transactions_with_actions(
    tx_batch_request: SignTransactionsWithActionsRequest,
    wrap_key: WrapKey,
) -> Result<TransactionSignResult, String> {
    if tx_batch_request.tx_signing_requests.is_empty() {
        return Err("No transactions provided".to_string());
    }

    let mut logs: Vec<String> = Vec::new();
    logs.push(format!(
        "Processing {} transactions",
        tx_batch_request.tx_signing_requests.len()
    ));

    // Session expiry check
    if let Some(created_at) = tx_batch_request.created_at {
        if now_ms() - created_at > SESSION_MAX_DURATION_MS {
            return Err("Session expired".to_string());
        }
    }

    for (i, tx) in tx_batch_request.tx_signing_requests.iter().enumerate() {
        logs.push(format!(
            "Transaction {}: {} -> {} ({} actions)",
            i + 1,
            tx.near_account_id,
            tx.receiver_id,
            tx.actions.len()
        ));
    }
    send_progress_message(
        ProgressMessageType::ExecuteActionsProgress,
        ProgressStep::UserConfirmation,
        "Using pre-confirmed signing session...",
        Some(
            &ProgressData::new(1, 3)
                .with_transaction_count(tx_batch_request.tx_signing_requests.len()),
        ),
    );

    let intent_digest = tx_batch_request
        .intent_digest
        .clone()
        .ok_or_else(|| "Missing intent digest from pre-confirmed session".to_string())?;

    let transaction_context = tx_batch_request
        .transaction_context
        .clone()
        .ok_or_else(|| "Missing transaction context from confirmation".to_string())?;

    logs.push(format!(
        "Pre-confirmed session with intent digest {}",
        intent_digest
    ));

    send_progress_message(
        ProgressMessageType::ExecuteActionsProgress,
        ProgressStep::TransactionSigningProgress,
        "Decrypting private key and signing transactions...",
        Some(
            &ProgressData::new(2, 3)
                .with_transaction_count(tx_batch_request.tx_signing_requests.len()),
        ),
    );

    let tx_count = tx_batch_request.tx_signing_requests.len();

    let result = sign_transactions_batch(
        tx_batch_request.tx_signing_requests,
        &wrap_key,
        &tx_batch_request.decryption,
        &transaction_context,
        tx_batch_request.reserved_nonces.as_deref(),
        logs,
    )?;

    send_completion_message(
        ProgressMessageType::ExecuteActionsComplete,
        ProgressStep::TransactionSigningComplete,
        &format!("{} transactions signed", tx_count),
        Some(
            &ProgressData::new(3, 3)
                .with_success(result.success)
                .with_transaction_count(tx_count)
                .with_logs(result.logs.clone()),
        ),
    );

    Ok(result)
}

/// Batch signing with a shared decrypted key. The reserved block supplies
/// the nonce for each transaction in order; without one (flows that never
/// reserve), nonces start at the confirmed context's nextNonce and
/// increment per transaction.
fn sign_transactions_batch(
    tx_requests: Vec<TransactionPayload>,
    wrap_key: &WrapKey,
    decryption: &DecryptionPayload,
    transaction_context: &TransactionContext,
    reserved_nonces: Option<&[String]>,
    mut logs: Vec<String>,
) -> Result<TransactionSignResult, String> {
    let first_transaction = &tx_requests[0];

    // One key signs the whole batch; mixed signers are a host bug
    for tx in &tx_requests {
        if first_transaction.near_account_id != tx.near_account_id {
            let error_msg = "All transactions must use the same NEAR account ID".to_string();
            return Ok(TransactionSignResult::failed(logs, error_msg));
        }
    }

    let nonces: Vec<u64> = match reserved_nonces {
        Some(reserved) => {
            if reserved.len() != tx_requests.len() {
                let error_msg = format!(
                    "Reserved {} nonces for {} transactions",
                    reserved.len(),
                    tx_requests.len()
                );
                logs.push(error_msg.clone());
                return Ok(TransactionSignResult::failed(logs, error_msg));
            }
            let mut parsed = Vec::with_capacity(reserved.len());
            for nonce in reserved {
                parsed.push(
                    nonce
                        .parse::<u64>()
                        .map_err(|e| format!("Invalid reserved nonce: {}", e))?,
                );
            }
            parsed
        }
        None => {
            let base_nonce: u64 = transaction_context
                .next_nonce
                .parse()
                .map_err(|e| format!("Invalid nonce: {}", e))?;
            (0..tx_requests.len() as u64).map(|i| base_nonce + i).collect()
        }
    };

    let kek = Zeroizing::new(wrap_key.derive_kek()?);
    let decrypted_private_key = Zeroizing::new(
        decrypt_data_chacha20(
            &decryption.encrypted_private_key_data,
            &decryption.encrypted_private_key_chacha20_nonce_b64u,
            &kek,
        )
        .map_err(|e| format!("Decryption failed: {}", e))?,
    );

    let signing_key = signing_key_from_near_private_key(&decrypted_private_key)?;
    logs.push("Private key decrypted successfully".to_string());

    let block_hash_bytes = bs58::decode(&transaction_context.tx_block_hash)
        .into_vec()
        .map_err(|e| format!("Invalid block hash: {}", e))?;

    let mut signed_transactions = Vec::new();
    let mut transaction_hashes = Vec::new();

    for (index, tx_data) in tx_requests.iter().enumerate() {
        let nonce = nonces[index];
        let actions = match build_actions_from_params(tx_data.actions.clone()) {
            Ok(actions) => actions,
            Err(e) => {
                let error_msg = format!("Transaction {}: failed to build actions: {}", index + 1, e);
                logs.push(error_msg.clone());
                return Ok(TransactionSignResult::failed(logs, error_msg));
            }
        };

        let transaction = match build_transaction_with_actions(
            &tx_data.near_account_id,
            &tx_data.receiver_id,
            nonce,
            &block_hash_bytes,
            &signing_key,
            actions,
        ) {
            Ok(tx) => tx,
            Err(e) => {
                let error_msg =
                    format!("Transaction {}: failed to build transaction: {}", index + 1, e);
                logs.push(error_msg.clone());
                return Ok(TransactionSignResult::failed(logs, error_msg));
            }
        };

        let signed_tx_bytes = match sign_transaction(transaction, &signing_key) {
            Ok(bytes) => bytes,
            Err(e) => {
                let error_msg = format!("Transaction {}: failed to sign: {}", index + 1, e);
                logs.push(error_msg.clone());
                return Ok(TransactionSignResult::failed(logs, error_msg));
            }
        };

        let transaction_hash = calculate_transaction_hash(&signed_tx_bytes);
        logs.push(format!(
            "Transaction {}: signed (nonce {}, hash {})",
            index + 1,
            nonce,
            transaction_hash
        ));

        let signed_tx = SignedTransaction::from_borsh_bytes(&signed_tx_bytes)?;
        signed_transactions.push(WasmSignedTransaction::from_signed_transaction(&signed_tx)?);
        transaction_hashes.push(transaction_hash);
    }

    logs.push(format!(
        "All {} transactions signed successfully",
        signed_transactions.len()
    ));

    Ok(TransactionSignResult::new(
        true,
        Some(transaction_hashes),
        Some(signed_transactions),
        logs,
        None,
    ))
}
