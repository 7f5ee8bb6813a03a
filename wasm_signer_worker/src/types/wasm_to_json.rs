//! JS-friendly wrappers around borsh-backed NEAR types: string fields and
//! base64url byte blobs only, safe for structured-clone transport.

use serde::{Deserialize, Serialize};

use super::near::{SignedDelegate, SignedTransaction};
use crate::encoders::base64_url_encode;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WasmSignedTransaction {
    pub signer_id: String,
    pub receiver_id: String,
    pub nonce: String,
    pub public_key: String,
    /// Borsh-serialized SignedTransaction, base64url, ready to broadcast
    pub borsh_bytes_b64u: String,
}

impl WasmSignedTransaction {
    pub fn from_signed_transaction(signed_tx: &SignedTransaction) -> Result<Self, String> {
        let borsh_bytes = signed_tx.to_borsh_bytes()?;
        Ok(WasmSignedTransaction {
            signer_id: signed_tx.transaction.signer_id.0.clone(),
            receiver_id: signed_tx.transaction.receiver_id.0.clone(),
            nonce: signed_tx.transaction.nonce.to_string(),
            public_key: signed_tx.transaction.public_key.to_near_format(),
            borsh_bytes_b64u: base64_url_encode(&borsh_bytes),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WasmSignedDelegate {
    pub sender_id: String,
    pub receiver_id: String,
    pub nonce: String,
    pub max_block_height: String,
    /// Borsh-serialized SignedDelegate, base64url
    pub borsh_bytes_b64u: String,
}

impl WasmSignedDelegate {
    pub fn from_signed_delegate(signed_delegate: &SignedDelegate) -> Result<Self, String> {
        let borsh_bytes = signed_delegate.to_borsh_bytes()?;
        Ok(WasmSignedDelegate {
            sender_id: signed_delegate.delegate_action.sender_id.0.clone(),
            receiver_id: signed_delegate.delegate_action.receiver_id.0.clone(),
            nonce: signed_delegate.delegate_action.nonce.to_string(),
            max_block_height: signed_delegate.delegate_action.max_block_height.to_string(),
            borsh_bytes_b64u: base64_url_encode(&borsh_bytes),
        })
    }
}
