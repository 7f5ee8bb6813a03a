use super::*;
use num_bigint::BigUint;
use num_integer::Integer;
use num_traits::One;

fn engine() -> Shamir3Pass {
    Shamir3Pass::new_default()
}

#[test]
fn compiled_prime_is_2048_bits() {
    let s = engine();
    assert_eq!(s.p().bits(), 2048);
}

#[test]
fn p_b64u_roundtrips() {
    let s = engine();
    let encoded = s.p_b64u();
    let decoded = decode_biguint_b64u(&encoded).unwrap();
    assert_eq!(&decoded, s.p());
    assert!(Shamir3Pass::matches_compiled_prime(&encoded));
}

#[test]
fn mismatched_prime_is_detected() {
    let other = encode_biguint_b64u(&BigUint::from(65537u32));
    assert!(!Shamir3Pass::matches_compiled_prime(&other));
    assert!(!Shamir3Pass::matches_compiled_prime("not-base64!"));
}

#[test]
fn new_rejects_small_primes() {
    // 257 is prime but far below the bit floor
    let small = encode_biguint_b64u(&BigUint::from(257u32));
    match Shamir3Pass::new(&small) {
        Err(ShamirError::PrimeTooSmall { min_bits, .. }) => {
            assert_eq!(min_bits, crate::config::SHAMIR_MIN_PRIME_BITS)
        }
        other => panic!("expected PrimeTooSmall, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn new_rejects_large_but_foreign_primes() {
    // Right size, wrong value: compiled prime plus 4 (even, certainly not p)
    let foreign = engine().p() + BigUint::from(4u32);
    let encoded = encode_biguint_b64u(&foreign);
    assert!(matches!(
        Shamir3Pass::new(&encoded),
        Err(ShamirError::PrimeMismatch)
    ));
}

#[test]
fn new_accepts_the_compiled_prime() {
    let encoded = engine().p_b64u();
    assert!(Shamir3Pass::new(&encoded).is_ok());
}

#[test]
fn random_k_is_in_range_and_coprime() {
    let s = engine();
    let p_minus_1 = s.p() - BigUint::one();
    let min_k = BigUint::from(1u128 << 64);

    for _ in 0..4 {
        let k = s.random_k().expect("random_k should succeed");
        assert!(k >= min_k);
        assert!(&k < s.p());
        assert_eq!(k.gcd(&p_minus_1), BigUint::one());
    }
}

#[test]
fn lock_keys_are_inverses_in_the_exponent_group() {
    let s = engine();
    let keys = s.generate_lock_keys().expect("lock keys should generate");

    let p_minus_1 = s.p() - BigUint::one();
    let product = (&keys.e * &keys.d) % &p_minus_1;
    assert_eq!(product, BigUint::one());
}

#[test]
fn add_then_remove_lock_restores_the_base() {
    let s = engine();
    let keys = s.generate_lock_keys().unwrap();
    let k = s.random_k().unwrap();

    let locked = s.add_lock(&k, &keys.e);
    assert_ne!(locked, k);
    let unlocked = s.remove_lock(&locked, &keys.d);
    assert_eq!(unlocked, k);
}

#[test]
fn modinv_of_even_exponent_does_not_exist() {
    // p - 1 is even, so an even exponent shares a factor of 2 with it
    let s = engine();
    let even = BigUint::from(1u128 << 65);
    assert!(s.modinv(&even).is_none());
}

#[test]
fn kek_aead_roundtrip() {
    let s = engine();
    let plaintext = b"vrf keypair bytes go here";

    let (ciphertext, kek) = s.encrypt_with_random_kek(plaintext).unwrap();
    assert_ne!(&ciphertext[12..], plaintext.as_slice());

    let decrypted = s.decrypt_with_kek_key(&ciphertext, &kek).unwrap();
    assert_eq!(decrypted, plaintext);
}

#[test]
fn kek_aead_rejects_wrong_kek() {
    let s = engine();
    let (ciphertext, _) = s.encrypt_with_random_kek(b"secret").unwrap();
    let wrong_kek = s.random_k().unwrap();
    assert!(matches!(
        s.decrypt_with_kek_key(&ciphertext, &wrong_kek),
        Err(ShamirError::DecryptionFailed(_))
    ));
}

#[test]
fn kek_aead_rejects_truncated_ciphertext() {
    let s = engine();
    let kek = s.random_k().unwrap();
    assert!(matches!(
        s.decrypt_with_kek_key(&[0u8; 4], &kek),
        Err(ShamirError::DecryptionFailed(_))
    ));
}

#[test]
fn server_key_id_is_a_stable_sha256() {
    let a = server_key_id("exponent-a");
    let b = server_key_id("exponent-a");
    let c = server_key_id("exponent-b");
    assert_eq!(a, b);
    assert_ne!(a, c);
    // base64url(SHA-256) without padding is 43 characters
    assert_eq!(a.len(), 43);
}
