//! Shamir 3-pass commutative encryption over a fixed safe prime.
//!
//! The KEK wrapping the VRF ciphertext is a random element of Z/pZ*. Locks
//! are modular exponentiations; commutativity of exponentiation mod p gives
//! `Enc_B(Enc_A(K)) = Enc_A(Enc_B(K))`, so a client and the relay can add and
//! remove locks in either order without ever seeing each other's exponents,
//! the KEK, or the wrapped plaintext.
//!
//! Registration:
//! 1. Client samples KEK, AEAD-encrypts the VRF keypair under it
//! 2. Client adds a one-time lock: KEK → KEK_c
//! 3. Relay adds its lock → KEK_cs, returns its current keyId
//! 4. Client removes its lock → KEK_s (stored alongside keyId)
//!
//! Login:
//! 1. Client adds a fresh one-time lock to KEK_s → KEK_st
//! 2. Relay removes its lock (active or grace key, selected by keyId) → KEK_t
//! 3. Client removes its lock → KEK, decrypts the VRF keypair

#[cfg(test)]
mod tests_integration;
#[cfg(test)]
mod tests_unit;

use crate::config::{
    SHAMIR_AEAD_HKDF_INFO, SHAMIR_MIN_PRIME_BITS, SHAMIR_P_HEX,
    SHAMIR_RANDOM_BYTES_OVERHEAD, SHAMIR_REJECTION_SAMPLING_MAX_ATTEMPTS,
};
use crate::errors::ShamirError;
use base64ct::{Base64UrlUnpadded, Encoding};
use chacha20poly1305::{
    aead::{generic_array::GenericArray, Aead, Key},
    ChaCha20Poly1305, KeyInit,
};
use getrandom::getrandom;
use hkdf::Hkdf;
use num_bigint::{BigInt, BigUint, Sign};
use num_integer::Integer;
use num_traits::{One, Zero};
use sha2::{Digest, Sha256};

/// One-time or long-lived lock keys: (e, d) with e·d ≡ 1 (mod p−1)
#[derive(Clone, Debug)]
pub struct LockKeys {
    pub e: BigUint, // encryption exponent (add lock)
    pub d: BigUint, // decryption exponent (remove lock)
}

/// Shamir 3-pass group state for a single prime
#[derive(Clone, Debug)]
pub struct Shamir3Pass {
    p: BigUint,
    p_minus_1: BigUint, // cached
    min_k: BigUint,     // lower security bound for exponents/KEKs
    max_k: BigUint,     // p − 2
}

impl Shamir3Pass {
    /// Create an instance with a caller-provided prime. The prime must be at
    /// least `SHAMIR_MIN_PRIME_BITS` and must equal the compiled-in prime;
    /// anything else is refused rather than silently preferred.
    pub fn new(p_b64u: &str) -> Result<Self, ShamirError> {
        let p = decode_biguint_b64u(p_b64u)
            .map_err(|_| ShamirError::InvalidPrime("Invalid base64url encoding".to_string()))?;

        let bits = p.bits();
        if bits < SHAMIR_MIN_PRIME_BITS as u64 {
            return Err(ShamirError::PrimeTooSmall {
                bits: bits as usize,
                min_bits: SHAMIR_MIN_PRIME_BITS,
            });
        }
        if p != compiled_prime() {
            return Err(ShamirError::PrimeMismatch);
        }

        Ok(Self::from_biguint(p))
    }

    /// Create an instance with the compiled-in 2048-bit safe prime.
    pub fn new_default() -> Self {
        Self::from_biguint(compiled_prime())
    }

    fn from_biguint(p: BigUint) -> Self {
        let one = BigUint::one();
        let two = &one + &one;
        let p_minus_1 = &p - &one;
        let p_minus_2 = &p - &two;

        Shamir3Pass {
            p,
            p_minus_1,
            // Exponents below 2^64 are rejected outright.
            min_k: BigUint::from(1u128 << 64),
            max_k: p_minus_2,
        }
    }

    pub fn p(&self) -> &BigUint {
        &self.p
    }

    pub fn p_b64u(&self) -> String {
        encode_biguint_b64u(&self.p)
    }

    /// True when a relay-reported prime matches the compiled-in prime.
    pub fn matches_compiled_prime(p_b64u: &str) -> bool {
        match decode_biguint_b64u(p_b64u) {
            Ok(p) => p == compiled_prime(),
            Err(_) => false,
        }
    }

    /// Modular exponentiation base^exp mod p
    pub fn modexp(&self, base: &BigUint, exp: &BigUint) -> BigUint {
        if self.p.is_zero() {
            return BigUint::zero();
        }
        base.modpow(exp, &self.p)
    }

    /// Modular inverse of `a` in the exponent group (mod p−1), extended Euclid
    pub fn modinv(&self, a: &BigUint) -> Option<BigUint> {
        let a_bigint = BigInt::from_biguint(Sign::Plus, a.clone());
        let m_bigint = BigInt::from_biguint(Sign::Plus, self.p_minus_1.clone());

        let (gcd, x, _) = extended_gcd(a_bigint, m_bigint.clone());

        if gcd != BigInt::one() {
            return None;
        }

        let mut x_mod = x % &m_bigint;
        if x_mod.sign() == Sign::Minus {
            x_mod += &m_bigint;
        }

        Some(x_mod.to_biguint().unwrap())
    }

    /// Random k in [min_k, p−2] with gcd(k, p−1) = 1, via rejection sampling
    pub fn random_k(&self) -> Result<BigUint, ShamirError> {
        let range = &self.max_k - &self.min_k;
        let bytes_needed = ((range.bits() + 7) / 8 + SHAMIR_RANDOM_BYTES_OVERHEAD as u64) as usize;

        for _ in 0..SHAMIR_REJECTION_SAMPLING_MAX_ATTEMPTS {
            let mut buf = vec![0u8; bytes_needed];
            getrandom(&mut buf).map_err(|_| ShamirError::RandomGenerationFailed)?;

            let candidate = BigUint::from_bytes_be(&buf) % &range;
            let k = &self.min_k + candidate;

            if k.gcd(&self.p_minus_1) == BigUint::one() {
                return Ok(k);
            }
        }

        Err(ShamirError::RandomGenerationFailed)
    }

    /// Generate lock keys (e, d) with e·d ≡ 1 (mod p−1)
    pub fn generate_lock_keys(&self) -> Result<LockKeys, ShamirError> {
        let e = self.random_k()?;
        let d = self.modinv(&e).ok_or(ShamirError::ModularInverseNotFound)?;

        Ok(LockKeys { e, d })
    }

    /// Encrypt plaintext under a fresh random KEK. Returns (ciphertext, KEK).
    pub fn encrypt_with_random_kek(
        &self,
        plaintext: &[u8],
    ) -> Result<(Vec<u8>, BigUint), ShamirError> {
        let kek = self.random_k()?;
        let ciphertext = self.encrypt_with_kek(&kek, plaintext)?;
        Ok((ciphertext, kek))
    }

    /// Decrypt ciphertext with a recovered KEK
    pub fn decrypt_with_kek_key(
        &self,
        ciphertext: &[u8],
        kek: &BigUint,
    ) -> Result<Vec<u8>, ShamirError> {
        self.decrypt_with_kek(kek, ciphertext)
    }

    /// Add a lock: base^exponent mod p
    pub fn add_lock(&self, base: &BigUint, exponent: &BigUint) -> BigUint {
        self.modexp(base, exponent)
    }

    /// Remove a lock: base^exponent mod p (the inverse exponent)
    pub fn remove_lock(&self, base: &BigUint, exponent: &BigUint) -> BigUint {
        self.modexp(base, exponent)
    }

    /// Derive the AEAD key from KEK bytes via HKDF
    fn derive_aead_key(&self, kek_bytes: &[u8]) -> Result<[u8; 32], ShamirError> {
        let hkdf = Hkdf::<Sha256>::new(None, kek_bytes);
        let mut key = [0u8; 32];
        hkdf.expand(SHAMIR_AEAD_HKDF_INFO, &mut key)
            .map_err(|_| ShamirError::EncryptionFailed("HKDF expansion failed".to_string()))?;
        Ok(key)
    }

    fn encrypt_with_kek(&self, kek: &BigUint, plaintext: &[u8]) -> Result<Vec<u8>, ShamirError> {
        let kek_bytes = kek.to_bytes_be();
        let key_bytes = self.derive_aead_key(&kek_bytes)?;

        let cipher = ChaCha20Poly1305::new(Key::<ChaCha20Poly1305>::from_slice(&key_bytes));

        let mut nonce = [0u8; 12];
        getrandom(&mut nonce).map_err(|_| ShamirError::RandomGenerationFailed)?;
        let nonce_ga = GenericArray::from_slice(&nonce);

        let ciphertext = cipher
            .encrypt(nonce_ga, plaintext)
            .map_err(|e| ShamirError::EncryptionFailed(e.to_string()))?;

        // Nonce is prepended to the ciphertext
        let mut result = nonce.to_vec();
        result.extend_from_slice(&ciphertext);
        Ok(result)
    }

    fn decrypt_with_kek(&self, kek: &BigUint, ciphertext: &[u8]) -> Result<Vec<u8>, ShamirError> {
        if ciphertext.len() < 12 {
            return Err(ShamirError::DecryptionFailed(
                "Ciphertext too short".to_string(),
            ));
        }

        let (nonce_bytes, ct) = ciphertext.split_at(12);

        let kek_bytes = kek.to_bytes_be();
        let key_bytes = self.derive_aead_key(&kek_bytes)?;

        let cipher = ChaCha20Poly1305::new(Key::<ChaCha20Poly1305>::from_slice(&key_bytes));
        let nonce_ga = GenericArray::from_slice(nonce_bytes);

        cipher
            .decrypt(nonce_ga, ct)
            .map_err(|e| ShamirError::DecryptionFailed(e.to_string()))
    }
}

/// Compute the keyId for a server exponent: base64url(SHA-256(e_s_b64u)).
/// The id travels end-to-end so the relay can select the matching exponent
/// (active or grace) at remove-lock time.
pub fn server_key_id(e_s_b64u: &str) -> String {
    let digest = Sha256::digest(e_s_b64u.as_bytes());
    Base64UrlUnpadded::encode_string(&digest)
}

fn compiled_prime() -> BigUint {
    BigUint::parse_bytes(SHAMIR_P_HEX.as_bytes(), 16).expect("compiled Shamir prime is valid hex")
}

/// Extended Euclidean algorithm
fn extended_gcd(a: BigInt, b: BigInt) -> (BigInt, BigInt, BigInt) {
    if b.is_zero() {
        return (a, BigInt::one(), BigInt::zero());
    }

    let (gcd, x1, y1) = extended_gcd(b.clone(), &a % &b);
    let x = y1.clone();
    let y = x1 - (&a / &b) * y1;

    (gcd, x, y)
}

/// Encode BigUint as base64url
pub fn encode_biguint_b64u(x: &BigUint) -> String {
    Base64UrlUnpadded::encode_string(&x.to_bytes_be())
}

/// Decode BigUint from base64url
pub fn decode_biguint_b64u(s: &str) -> Result<BigUint, ShamirError> {
    let bytes = Base64UrlUnpadded::decode_vec(s)
        .map_err(|_| ShamirError::InvalidPrime("Invalid base64url".to_string()))?;
    Ok(BigUint::from_bytes_be(&bytes))
}
