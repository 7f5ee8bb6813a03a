//! Full 3-pass protocol walkthroughs driving both the client and the relay
//! halves natively, without HTTP in between.

use super::*;
use crate::handlers::{
    handle_shamir3pass_remove_server_lock_kek, Shamir3PassRemoveServerLockRequest, ServerKeyEntry,
};
use crate::manager::VRFKeyManager;
use std::cell::RefCell;
use std::rc::Rc;

fn engine() -> Shamir3Pass {
    Shamir3Pass::new_default()
}

#[test]
fn commutativity_of_locks() {
    let s = engine();
    let k = s.random_k().unwrap();
    let client = s.generate_lock_keys().unwrap();
    let server = s.generate_lock_keys().unwrap();

    // Enc_B(Enc_A(K)) == Enc_A(Enc_B(K))
    let ab = s.add_lock(&s.add_lock(&k, &client.e), &server.e);
    let ba = s.add_lock(&s.add_lock(&k, &server.e), &client.e);
    assert_eq!(ab, ba);

    // kek_cs^{d_c} == K^{e_s}
    let kek_cs = s.add_lock(&s.add_lock(&k, &client.e), &server.e);
    let kek_s = s.remove_lock(&kek_cs, &client.d);
    assert_eq!(kek_s, s.add_lock(&k, &server.e));
}

#[test]
fn registration_wrap_then_login_unlock_recovers_the_kek_exactly() {
    let s = engine();
    let vrf_blob = b"bincode-serialized VRF keypair data";

    // Registration: client samples KEK and wraps the blob
    let (ciphertext, kek) = s.encrypt_with_random_kek(vrf_blob).unwrap();
    let client_reg = s.generate_lock_keys().unwrap();
    let server = s.generate_lock_keys().unwrap();

    let kek_c = s.add_lock(&kek, &client_reg.e);
    let kek_cs = s.add_lock(&kek_c, &server.e); // relay applies its lock
    let kek_s = s.remove_lock(&kek_cs, &client_reg.d); // client stores this

    // Login: fresh one-time lock
    let client_login = s.generate_lock_keys().unwrap();
    let kek_st = s.add_lock(&kek_s, &client_login.e);
    let kek_t = s.remove_lock(&kek_st, &server.d); // relay removes its lock
    let recovered = s.remove_lock(&kek_t, &client_login.d);

    assert_eq!(recovered, kek, "3-pass must recover K exactly");
    let decrypted = s.decrypt_with_kek_key(&ciphertext, &recovered).unwrap();
    assert_eq!(decrypted, vrf_blob);
}

#[test]
fn reencryption_under_a_new_server_key_preserves_content() {
    let s = engine();
    let vrf_blob = b"the same VRF keypair across rotations";

    // Original wrap under server key 1
    let (ciphertext_1, kek_1) = s.encrypt_with_random_kek(vrf_blob).unwrap();
    let server_1 = s.generate_lock_keys().unwrap();
    let kek_s_1 = s.add_lock(&kek_1, &server_1.e);

    // Rotation: unlock with the old (grace) key...
    let login = s.generate_lock_keys().unwrap();
    let kek_st = s.add_lock(&kek_s_1, &login.e);
    let kek_t = s.remove_lock(&kek_st, &server_1.d);
    let recovered_kek = s.remove_lock(&kek_t, &login.d);
    let plaintext = s.decrypt_with_kek_key(&ciphertext_1, &recovered_kek).unwrap();

    // ...then re-encrypt under server key 2
    let (ciphertext_2, kek_2) = s.encrypt_with_random_kek(&plaintext).unwrap();
    let server_2 = s.generate_lock_keys().unwrap();
    let reg = s.generate_lock_keys().unwrap();
    let kek_cs = s.add_lock(&s.add_lock(&kek_2, &reg.e), &server_2.e);
    let kek_s_2 = s.remove_lock(&kek_cs, &reg.d);

    // Unlock of the new blob yields the original content
    let login_2 = s.generate_lock_keys().unwrap();
    let kek_t_2 = s.remove_lock(&s.add_lock(&kek_s_2, &login_2.e), &server_2.d);
    let kek_recovered_2 = s.remove_lock(&kek_t_2, &login_2.d);
    let decrypted = s
        .decrypt_with_kek_key(&ciphertext_2, &kek_recovered_2)
        .unwrap();
    assert_eq!(decrypted, vrf_blob);
}

fn manager_rc() -> Rc<RefCell<VRFKeyManager>> {
    Rc::new(RefCell::new(VRFKeyManager::new(None, None, None, None, None)))
}

#[test]
fn remove_server_lock_honors_grace_keys() {
    let s = engine();
    let manager = manager_rc();

    let old_server = s.generate_lock_keys().unwrap();
    let new_server = s.generate_lock_keys().unwrap();
    let old_e_b64u = encode_biguint_b64u(&old_server.e);
    let new_e_b64u = encode_biguint_b64u(&new_server.e);
    let old_key_id = server_key_id(&old_e_b64u);
    let new_key_id = server_key_id(&new_e_b64u);

    // A blob locked under the old (now grace) key
    let kek = s.random_k().unwrap();
    let kek_s = s.add_lock(&kek, &old_server.e);
    let login = s.generate_lock_keys().unwrap();
    let kek_st = s.add_lock(&kek_s, &login.e);

    let keys = vec![
        ServerKeyEntry {
            key_id: new_key_id,
            d_s_b64u: encode_biguint_b64u(&new_server.d),
        },
        ServerKeyEntry {
            key_id: old_key_id.clone(),
            d_s_b64u: encode_biguint_b64u(&old_server.d),
        },
    ];

    let response = handle_shamir3pass_remove_server_lock_kek(
        manager.clone(),
        Some("msg-grace".to_string()),
        Shamir3PassRemoveServerLockRequest {
            kek_st_b64u: encode_biguint_b64u(&kek_st),
            key_id: old_key_id,
            keys: keys.clone(),
        },
    );
    assert!(response.success, "grace key removal should succeed");

    let kek_t_b64u = response
        .data
        .unwrap()
        .get("kek_t_b64u")
        .and_then(|v| v.as_str())
        .unwrap()
        .to_string();
    let kek_t = decode_biguint_b64u(&kek_t_b64u).unwrap();
    let recovered = s.remove_lock(&kek_t, &login.d);
    assert_eq!(recovered, kek);

    // An unknown keyId must fail without touching the KEK
    let response = handle_shamir3pass_remove_server_lock_kek(
        manager,
        Some("msg-unknown".to_string()),
        Shamir3PassRemoveServerLockRequest {
            kek_st_b64u: encode_biguint_b64u(&kek_st),
            key_id: "unknown-key-id".to_string(),
            keys,
        },
    );
    assert!(!response.success);
    assert!(response.error.unwrap().contains("Unknown Shamir keyId"));
}
