use borsh::{self, BorshSerialize};
use ed25519_dalek::{Signer, SigningKey};
use sha2::{Digest, Sha256};

use crate::actions::ActionParams;
use crate::config::DELEGATE_ACTION_SIGNABLE_TAG;
use crate::types::*;

/// Build a transaction with multiple actions
pub fn build_transaction_with_actions(
    signer_account_id: &str,
    receiver_account_id: &str,
    nonce: u64,
    block_hash_bytes: &[u8],
    private_key: &SigningKey,
    actions: Vec<NearAction>,
) -> Result<Transaction, String> {
    let signer_id: AccountId = signer_account_id
        .parse()
        .map_err(|e| format!("Invalid signer account: {}", e))?;
    let receiver_id: AccountId = receiver_account_id
        .parse()
        .map_err(|e| format!("Invalid receiver account: {}", e))?;

    if block_hash_bytes.len() != 32 {
        return Err("Block hash must be 32 bytes".to_string());
    }
    let mut block_hash_array = [0u8; 32];
    block_hash_array.copy_from_slice(block_hash_bytes);
    let block_hash = CryptoHash::from_bytes(block_hash_array);

    let public_key_bytes = private_key.verifying_key().to_bytes();
    let public_key = PublicKey::from_ed25519_bytes(&public_key_bytes);

    Ok(Transaction {
        signer_id,
        public_key,
        nonce,
        receiver_id,
        block_hash,
        actions,
    })
}

/// Build concrete actions from boundary action params
pub fn build_actions_from_params(action_params: Vec<ActionParams>) -> Result<Vec<NearAction>, String> {
    let mut actions = Vec::new();
    for (i, params) in action_params.iter().enumerate() {
        let action = params
            .to_action()
            .map_err(|e| format!("Action {}: {}", i, e))?;
        actions.push(action);
    }
    Ok(actions)
}

/// Sign an already-built transaction and return the borsh-serialized
/// SignedTransaction bytes.
pub fn sign_transaction(
    transaction: Transaction,
    private_key: &SigningKey,
) -> Result<Vec<u8>, String> {
    let (transaction_hash, _size) = transaction.get_hash_and_size();

    let signature_bytes = private_key.sign(&transaction_hash.0);
    let signature = Signature::from_ed25519_bytes(&signature_bytes.to_bytes());

    let signed_transaction = SignedTransaction::new(signature, transaction);

    borsh::to_vec(&signed_transaction)
        .map_err(|e| format!("Signed transaction serialization failed: {}", e))
}

/// SHA-256 of signed transaction bytes, hex-encoded
pub fn calculate_transaction_hash(signed_tx_bytes: &[u8]) -> String {
    let result = Sha256::digest(signed_tx_bytes);
    format!("{:x}", result)
}

/// Sign a NEP-366 delegate action.
///
/// The signable payload is borsh(tag) || borsh(delegate) where tag is the
/// NEP-366 discriminant; the signature covers SHA-256 of that payload.
pub fn sign_delegate_action(
    delegate: &DelegateAction,
    private_key: &SigningKey,
) -> Result<SignedDelegate, String> {
    let mut signable = Vec::new();
    DELEGATE_ACTION_SIGNABLE_TAG
        .serialize(&mut signable)
        .map_err(|e| format!("Failed to serialize delegate tag: {}", e))?;
    delegate
        .serialize(&mut signable)
        .map_err(|e| format!("Failed to serialize delegate action: {}", e))?;

    let hash = Sha256::digest(&signable);
    let signature_bytes = private_key.sign(&hash);

    Ok(SignedDelegate {
        delegate_action: delegate.clone(),
        signature: Signature::from_ed25519_bytes(&signature_bytes.to_bytes()),
    })
}
