use super::{test_prf_first_b64u, test_wrap_key};
use crate::crypto::{
    decrypt_data_chacha20, derive_ed25519_key_from_prf_output, encrypt_data_chacha20,
    signing_key_from_near_private_key,
};
use futures::executor::block_on;
use std::str::FromStr;

#[test]
fn derivation_is_deterministic_per_account_and_device() {
    let prf = test_prf_first_b64u();

    let (sk1, pk1) = derive_ed25519_key_from_prf_output(&prf, "alice.testnet", 1).unwrap();
    let (sk2, pk2) = derive_ed25519_key_from_prf_output(&prf, "alice.testnet", 1).unwrap();
    assert_eq!(sk1, sk2);
    assert_eq!(pk1, pk2);

    // Another device slot of the same account derives a different key
    let (_, pk_device2) = derive_ed25519_key_from_prf_output(&prf, "alice.testnet", 2).unwrap();
    assert_ne!(pk1, pk_device2);

    // Another account derives a different key
    let (_, pk_bob) = derive_ed25519_key_from_prf_output(&prf, "bob.testnet", 1).unwrap();
    assert_ne!(pk1, pk_bob);
}

#[test]
fn derived_keys_parse_with_near_crypto() {
    let prf = test_prf_first_b64u();
    let (near_sk, near_pk) = derive_ed25519_key_from_prf_output(&prf, "alice.testnet", 1).unwrap();

    let sk = near_crypto::SecretKey::from_str(&near_sk).expect("near-crypto should parse our key");
    let pk = near_crypto::PublicKey::from_str(&near_pk).expect("near-crypto should parse our key");
    assert_eq!(sk.public_key(), pk);
}

#[test]
fn derivation_rejects_empty_prf() {
    assert!(derive_ed25519_key_from_prf_output("", "alice.testnet", 1).is_err());
}

#[test]
fn chacha20_roundtrip_with_wrap_key_kek() {
    let wrap_key = test_wrap_key();
    let kek = wrap_key.derive_kek().unwrap();

    let plaintext = "ed25519:not-a-real-key";
    let encrypted = encrypt_data_chacha20(plaintext, &kek).unwrap();
    let decrypted = decrypt_data_chacha20(
        &encrypted.encrypted_near_key_data_b64u,
        &encrypted.chacha20_nonce_b64u,
        &kek,
    )
    .unwrap();
    assert_eq!(decrypted, plaintext);
}

#[test]
fn chacha20_uses_a_fresh_nonce_per_encryption() {
    let kek = test_wrap_key().derive_kek().unwrap();
    let a = encrypt_data_chacha20("same input", &kek).unwrap();
    let b = encrypt_data_chacha20("same input", &kek).unwrap();
    assert_ne!(a.chacha20_nonce_b64u, b.chacha20_nonce_b64u);
    assert_ne!(a.encrypted_near_key_data_b64u, b.encrypted_near_key_data_b64u);
}

#[test]
fn chacha20_rejects_wrong_kek() {
    let kek = test_wrap_key().derive_kek().unwrap();
    let encrypted = encrypt_data_chacha20("secret", &kek).unwrap();

    let other = crate::crypto::WrapKey::new(
        crate::encoders::base64_url_encode(&[0x01u8; 32]),
        crate::encoders::base64_url_encode(&[0x02u8; 32]),
    );
    let wrong_kek = other.derive_kek().unwrap();
    assert!(decrypt_data_chacha20(
        &encrypted.encrypted_near_key_data_b64u,
        &encrypted.chacha20_nonce_b64u,
        &wrong_kek,
    )
    .is_err());
}

#[test]
fn derive_handler_roundtrips_through_decrypt_handler() {
    use crate::handlers::{
        handle_decrypt_private_key_with_prf, handle_derive_near_keypair_and_encrypt,
        DecryptPrivateKeyRequest, DeriveNearKeypairAndEncryptRequest,
    };
    use crate::types::handlers::DecryptionPayload;

    let wrap_key = test_wrap_key();
    let prf = test_prf_first_b64u();

    let derive_result = block_on(handle_derive_near_keypair_and_encrypt(
        DeriveNearKeypairAndEncryptRequest {
            session_id: "sess-derive".to_string(),
            near_account_id: "alice.testnet".to_string(),
            device_number: 1,
            registration: None,
        },
        wrap_key.clone(),
        prf.clone(),
    ))
    .expect("derive should succeed");

    assert!(derive_result.public_key.starts_with("ed25519:"));
    assert_eq!(
        derive_result.encrypted_private_key.wrap_key_salt_b64u.as_deref(),
        Some(wrap_key.salt_b64u())
    );

    let decrypt_result = block_on(handle_decrypt_private_key_with_prf(
        DecryptPrivateKeyRequest {
            session_id: "sess-derive".to_string(),
            near_account_id: "alice.testnet".to_string(),
            decryption: DecryptionPayload {
                encrypted_private_key_data: derive_result
                    .encrypted_private_key
                    .encrypted_near_key_data_b64u
                    .clone(),
                encrypted_private_key_chacha20_nonce_b64u: derive_result
                    .encrypted_private_key
                    .chacha20_nonce_b64u
                    .clone(),
            },
        },
        wrap_key,
    ))
    .expect("decrypt should succeed");

    // The decrypted key re-derives the same public key
    let (expected_sk, _) = derive_ed25519_key_from_prf_output(&prf, "alice.testnet", 1).unwrap();
    assert_eq!(decrypt_result.private_key, expected_sk);
    let signing_key = signing_key_from_near_private_key(&decrypt_result.private_key).unwrap();
    assert_eq!(
        format!(
            "ed25519:{}",
            bs58::encode(signing_key.verifying_key().to_bytes()).into_string()
        ),
        derive_result.public_key
    );
}

#[test]
fn recover_handler_matches_original_derivation() {
    use crate::handlers::{handle_recover_keypair_from_passkey, RecoverKeypairRequest};

    let prf = test_prf_first_b64u();
    let (_, registered_pk) = derive_ed25519_key_from_prf_output(&prf, "alice.testnet", 1).unwrap();

    let recovered = block_on(handle_recover_keypair_from_passkey(
        RecoverKeypairRequest {
            session_id: "sess-recover".to_string(),
            account_id_hint: "alice.testnet".to_string(),
            device_number: 1,
        },
        test_wrap_key(),
        prf,
    ))
    .expect("recovery should succeed");

    assert_eq!(recovered.public_key, registered_pk);
}
