use super::{test_prf_first_b64u, test_wrap_key};
use crate::actions::ActionParams;
use crate::crypto::{derive_ed25519_key_from_prf_output, encrypt_data_chacha20};
use crate::handlers::{
    handle_sign_transactions_with_actions, SignTransactionsWithActionsRequest, TransactionPayload,
};
use crate::transaction::{
    build_actions_from_params, build_transaction_with_actions, calculate_transaction_hash,
    sign_transaction,
};
use crate::types::handlers::{DecryptionPayload, RpcCallPayload, TransactionContext};
use crate::types::{NearAction, SignedTransaction};
use ed25519_dalek::{SigningKey, Verifier};
use futures::executor::block_on;

fn test_signing_key() -> SigningKey {
    SigningKey::from_bytes(&[0x42u8; 32])
}

fn transfer_actions() -> Vec<ActionParams> {
    vec![ActionParams::Transfer {
        deposit: "1000000000000000000000000".to_string(),
    }]
}

#[test]
fn builds_and_signs_a_verifiable_transaction() {
    let signing_key = test_signing_key();
    let actions = build_actions_from_params(transfer_actions()).unwrap();

    let transaction = build_transaction_with_actions(
        "alice.testnet",
        "bob.testnet",
        42,
        &[0x11u8; 32],
        &signing_key,
        actions,
    )
    .unwrap();

    assert_eq!(transaction.nonce, 42);
    assert_eq!(transaction.signer_id.0, "alice.testnet");
    assert_eq!(transaction.receiver_id.0, "bob.testnet");

    let (tx_hash, _) = transaction.get_hash_and_size();
    let signed_bytes = sign_transaction(transaction, &signing_key).unwrap();

    // Borsh roundtrip and signature verification against the tx hash
    let signed_tx = SignedTransaction::from_borsh_bytes(&signed_bytes).unwrap();
    let sig = ed25519_dalek::Signature::from_bytes(&signed_tx.signature.signature_data);
    signing_key
        .verifying_key()
        .verify(&tx_hash.0, &sig)
        .expect("signature must verify against the transaction hash");

    // Hash is hex sha256 of the signed bytes
    let hash = calculate_transaction_hash(&signed_bytes);
    assert_eq!(hash.len(), 64);
}

#[test]
fn rejects_invalid_account_ids_and_block_hashes() {
    let signing_key = test_signing_key();

    let result = build_transaction_with_actions(
        "UPPERCASE.testnet",
        "bob.testnet",
        1,
        &[0u8; 32],
        &signing_key,
        vec![NearAction::CreateAccount],
    );
    assert!(result.is_err());

    let result = build_transaction_with_actions(
        "alice.testnet",
        "bob.testnet",
        1,
        &[0u8; 16], // wrong length
        &signing_key,
        vec![NearAction::CreateAccount],
    );
    assert!(result.is_err());
}

fn batch_request(
    next_nonce: &str,
    reserved_nonces: Option<Vec<String>>,
) -> (SignTransactionsWithActionsRequest, crate::crypto::WrapKey) {
    let wrap_key = test_wrap_key();
    let prf = test_prf_first_b64u();
    let (near_sk, near_pk) = derive_ed25519_key_from_prf_output(&prf, "alice.testnet", 1).unwrap();
    let kek = wrap_key.derive_kek().unwrap();
    let encrypted = encrypt_data_chacha20(&near_sk, &kek).unwrap();

    let tx = |receiver: &str| TransactionPayload {
        near_account_id: "alice.testnet".to_string(),
        receiver_id: receiver.to_string(),
        actions: transfer_actions(),
    };

    let request = SignTransactionsWithActionsRequest {
        rpc_call: RpcCallPayload {
            contract_id: "w3a-v1.testnet".to_string(),
            near_rpc_url: "https://rpc.testnet.near.org".to_string(),
            near_account_id: "alice.testnet".to_string(),
        },
        session_id: "sess-batch".to_string(),
        created_at: None,
        decryption: DecryptionPayload {
            encrypted_private_key_data: encrypted.encrypted_near_key_data_b64u,
            encrypted_private_key_chacha20_nonce_b64u: encrypted.chacha20_nonce_b64u,
        },
        tx_signing_requests: vec![tx("bob.testnet"), tx("carol.testnet"), tx("dave.testnet")],
        confirmation_config: None,
        intent_digest: Some("digest-abc".to_string()),
        transaction_context: Some(TransactionContext {
            near_public_key_str: near_pk,
            next_nonce: next_nonce.to_string(),
            tx_block_height: "5000".to_string(),
            tx_block_hash: bs58::encode([0x22u8; 32]).into_string(),
        }),
        reserved_nonces,
    };
    (request, wrap_key)
}

fn signed_nonces(result: &crate::handlers::TransactionSignResult) -> Vec<u64> {
    result
        .signed_transactions
        .as_ref()
        .unwrap()
        .iter()
        .map(|tx| tx.nonce.parse().unwrap())
        .collect()
}

#[test]
fn batch_signing_bakes_the_reserved_nonce_block() {
    // The context's nextNonce already sits past the reservation (later
    // reservations moved it); the reserved block must still win.
    let (request, wrap_key) = batch_request(
        "106",
        Some(vec!["100".to_string(), "101".to_string(), "102".to_string()]),
    );

    let result = block_on(handle_sign_transactions_with_actions(request, wrap_key))
        .expect("batch signing should succeed");

    assert!(result.success, "error: {:?}", result.error);
    assert_eq!(signed_nonces(&result), vec![100, 101, 102]);
}

#[test]
fn batch_signing_without_reservations_increments_from_context() {
    let (request, wrap_key) = batch_request("100", None);

    let result = block_on(handle_sign_transactions_with_actions(request, wrap_key))
        .expect("batch signing should succeed");

    assert!(result.success, "error: {:?}", result.error);
    assert_eq!(signed_nonces(&result), vec![100, 101, 102]);
}

#[test]
fn batch_signing_rejects_a_short_reservation() {
    let (request, wrap_key) = batch_request(
        "100",
        Some(vec!["100".to_string(), "101".to_string()]), // 2 nonces, 3 txs
    );

    let result =
        block_on(handle_sign_transactions_with_actions(request, wrap_key)).unwrap();
    assert!(!result.success);
    assert!(result.error.unwrap().contains("Reserved 2 nonces"));
}

#[test]
fn batch_signing_requires_confirmed_context() {
    let wrap_key = test_wrap_key();
    let request = SignTransactionsWithActionsRequest {
        rpc_call: RpcCallPayload {
            contract_id: "w3a-v1.testnet".to_string(),
            near_rpc_url: "https://rpc.testnet.near.org".to_string(),
            near_account_id: "alice.testnet".to_string(),
        },
        session_id: "sess-noctx".to_string(),
        created_at: None,
        decryption: DecryptionPayload {
            encrypted_private_key_data: "AAAA".to_string(),
            encrypted_private_key_chacha20_nonce_b64u: "AAAA".to_string(),
        },
        tx_signing_requests: vec![TransactionPayload {
            near_account_id: "alice.testnet".to_string(),
            receiver_id: "bob.testnet".to_string(),
            actions: transfer_actions(),
        }],
        confirmation_config: None,
        intent_digest: None,
        transaction_context: None,
        reserved_nonces: None,
    };

    let result = block_on(handle_sign_transactions_with_actions(request, wrap_key));
    assert!(result.is_err());
    assert!(result.unwrap_err().contains("intent digest"));
}

#[test]
fn batch_signing_rejects_mixed_signers() {
    let wrap_key = test_wrap_key();
    let prf = test_prf_first_b64u();
    let (near_sk, near_pk) = derive_ed25519_key_from_prf_output(&prf, "alice.testnet", 1).unwrap();
    let kek = wrap_key.derive_kek().unwrap();
    let encrypted = encrypt_data_chacha20(&near_sk, &kek).unwrap();

    let request = SignTransactionsWithActionsRequest {
        rpc_call: RpcCallPayload {
            contract_id: "w3a-v1.testnet".to_string(),
            near_rpc_url: "https://rpc.testnet.near.org".to_string(),
            near_account_id: "alice.testnet".to_string(),
        },
        session_id: "sess-mixed".to_string(),
        created_at: None,
        decryption: DecryptionPayload {
            encrypted_private_key_data: encrypted.encrypted_near_key_data_b64u,
            encrypted_private_key_chacha20_nonce_b64u: encrypted.chacha20_nonce_b64u,
        },
        tx_signing_requests: vec![
            TransactionPayload {
                near_account_id: "alice.testnet".to_string(),
                receiver_id: "bob.testnet".to_string(),
                actions: transfer_actions(),
            },
            TransactionPayload {
                near_account_id: "eve.testnet".to_string(),
                receiver_id: "bob.testnet".to_string(),
                actions: transfer_actions(),
            },
        ],
        confirmation_config: None,
        intent_digest: Some("digest-abc".to_string()),
        transaction_context: Some(TransactionContext {
            near_public_key_str: near_pk,
            next_nonce: "100".to_string(),
            tx_block_height: "5000".to_string(),
            tx_block_hash: bs58::encode([0x22u8; 32]).into_string(),
        }),
        reserved_nonces: None,
    };

    let result = block_on(handle_sign_transactions_with_actions(request, wrap_key)).unwrap();
    assert!(!result.success);
    assert!(result.error.unwrap().contains("same NEAR account"));
}

#[test]
fn delegate_signing_covers_the_nep366_payload() {
    use crate::config::DELEGATE_ACTION_SIGNABLE_TAG;
    use crate::transaction::sign_delegate_action;
    use crate::types::{AccountId, DelegateAction, PublicKey};
    use borsh::BorshSerialize;
    use sha2::{Digest, Sha256};

    let signing_key = test_signing_key();
    let delegate = DelegateAction {
        sender_id: AccountId("alice.testnet".to_string()),
        receiver_id: AccountId("bob.testnet".to_string()),
        actions: vec![NearAction::Transfer { deposit: 1 }],
        nonce: 7,
        max_block_height: 99,
        public_key: PublicKey::from_ed25519_bytes(&signing_key.verifying_key().to_bytes()),
    };

    let signed = sign_delegate_action(&delegate, &signing_key).unwrap();

    let mut signable = Vec::new();
    DELEGATE_ACTION_SIGNABLE_TAG.serialize(&mut signable).unwrap();
    delegate.serialize(&mut signable).unwrap();
    let hash = Sha256::digest(&signable);

    let sig = ed25519_dalek::Signature::from_bytes(&signed.signature.signature_data);
    signing_key
        .verifying_key()
        .verify(&hash, &sig)
        .expect("delegate signature must verify against the NEP-366 payload");
}
