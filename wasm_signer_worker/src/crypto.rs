use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Nonce};
use getrandom::getrandom;
use hkdf::Hkdf;
use log::debug;
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::config::{
    near_key_hkdf_info, CHACHA20_KEY_SIZE, CHACHA20_NONCE_SIZE, ED25519_PRIVATE_KEY_SIZE,
    ERROR_INVALID_KEY_SIZE, NEAR_KEK_INFO,
};
use crate::encoders::{base64_url_decode, base64_url_encode};
use crate::error::KdfError;
use crate::types::EncryptedDataChaCha20Response;

/// Ephemeral wrap-key material derived in the VRF worker and delivered to the
/// signer over the session MessagePort. Holds the base64url WrapKeySeed and
/// its salt and exposes the KEK derivation.
#[derive(Clone, Debug)]
pub struct WrapKey {
    pub(crate) wrap_key_seed: String,
    pub(crate) wrap_key_salt: String,
}

impl WrapKey {
    pub fn new(wrap_key_seed: String, wrap_key_salt: String) -> Self {
        Self {
            wrap_key_seed,
            wrap_key_salt,
        }
    }

    /// Derive the KEK from the stored WrapKeySeed + wrapKeySalt.
    pub fn derive_kek(&self) -> Result<Vec<u8>, String> {
        derive_kek_from_wrap_key_seed(&self.wrap_key_seed, &self.wrap_key_salt)
            .map_err(|e| format!("WrapKeySeed to KEK derivation failed: {}", e))
    }

    /// The base64url wrapKeySalt associated with this wrap key.
    pub fn salt_b64u(&self) -> &str {
        &self.wrap_key_salt
    }
}

/// KEK = HKDF-SHA256(WrapKeySeed, salt = wrapKeySalt, info = "near-kek")
pub(crate) fn derive_kek_from_wrap_key_seed(
    wrap_key_seed_b64u: &str,
    wrap_key_salt_b64u: &str,
) -> Result<Vec<u8>, KdfError> {
    let wrap_key_seed = Zeroizing::new(base64_url_decode(wrap_key_seed_b64u)?);
    if wrap_key_seed.is_empty() {
        return Err(KdfError::InvalidInput("Empty WrapKeySeed".to_string()));
    }
    let wrap_key_salt = base64_url_decode(wrap_key_salt_b64u)?;
    let hk = Hkdf::<Sha256>::new(Some(&wrap_key_salt), &wrap_key_seed);
    let mut kek = vec![0u8; CHACHA20_KEY_SIZE];
    hk.expand(NEAR_KEK_INFO, &mut kek)
        .map_err(|_| KdfError::HkdfError)?;
    Ok(kek)
}

// === CHACHA20POLY1305 ENCRYPTION/DECRYPTION ===

/// Encrypt a string under a ChaCha20-Poly1305 key with a fresh nonce.
pub(crate) fn encrypt_data_chacha20(
    plain_text_data_str: &str,
    key_bytes: &[u8],
) -> Result<EncryptedDataChaCha20Response, String> {
    if key_bytes.len() != CHACHA20_KEY_SIZE {
        return Err(ERROR_INVALID_KEY_SIZE.to_string());
    }

    let key = chacha20poly1305::Key::from_slice(key_bytes);
    let cipher = ChaCha20Poly1305::new(key);

    let mut nonce_bytes = [0u8; CHACHA20_NONCE_SIZE];
    getrandom(&mut nonce_bytes).map_err(|e| format!("Failed to generate nonce: {}", e))?;
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plain_text_data_str.as_bytes())
        .map_err(|e| format!("Encryption error: {}", e))?;

    Ok(EncryptedDataChaCha20Response {
        encrypted_near_key_data_b64u: base64_url_encode(&ciphertext),
        chacha20_nonce_b64u: base64_url_encode(&nonce_bytes),
        wrap_key_salt_b64u: None,
    })
}

/// Decrypt a ChaCha20-Poly1305 ciphertext back to a string.
pub(crate) fn decrypt_data_chacha20(
    encrypted_data_b64u: &str,
    chacha20_nonce_b64u: &str,
    key_bytes: &[u8],
) -> Result<String, String> {
    if key_bytes.len() != CHACHA20_KEY_SIZE {
        return Err(ERROR_INVALID_KEY_SIZE.to_string());
    }

    let key = chacha20poly1305::Key::from_slice(key_bytes);
    let cipher = ChaCha20Poly1305::new(key);

    let nonce_bytes = base64_url_decode(chacha20_nonce_b64u)
        .map_err(|e| format!("Base64 decode error for ChaCha20 nonce: {}", e))?;
    if nonce_bytes.len() != CHACHA20_NONCE_SIZE {
        return Err(format!(
            "Decryption ChaCha20 nonce must be {} bytes.",
            CHACHA20_NONCE_SIZE
        ));
    }
    let nonce = Nonce::from_slice(&nonce_bytes);

    let encrypted_data = base64_url_decode(encrypted_data_b64u)
        .map_err(|e| format!("Base64 decode error for encrypted data: {}", e))?;

    let decrypted_bytes = cipher
        .decrypt(nonce, encrypted_data.as_slice())
        .map_err(|e| format!("Decryption error: {}", e))?;

    String::from_utf8(decrypted_bytes).map_err(|e| format!("UTF-8 decoding error: {}", e))
}

// === KEY GENERATION ===

/// Deterministic NEAR ed25519 keypair from PRF output.
///
/// HKDF-SHA256 over the PRF first output with info
/// "w3a/near/v1/<account_id>/<device_number>" so each device slot of each
/// account derives a distinct signing key from the same credential.
pub(crate) fn derive_ed25519_key_from_prf_output(
    prf_output_base64: &str,
    account_id: &str,
    device_number: u8,
) -> Result<(String, String), KdfError> {
    let prf_output = Zeroizing::new(base64_url_decode(prf_output_base64)?);

    if prf_output.is_empty() {
        return Err(KdfError::InvalidInput("Empty PRF output".to_string()));
    }

    let info = near_key_hkdf_info(account_id, device_number);

    let hk = Hkdf::<Sha256>::new(None, &prf_output);
    let mut ed25519_key_material = [0u8; ED25519_PRIVATE_KEY_SIZE];
    hk.expand(info.as_bytes(), &mut ed25519_key_material)
        .map_err(|_| KdfError::HkdfError)?;

    let signing_key = ed25519_dalek::SigningKey::from_bytes(&ed25519_key_material);
    let verifying_key = signing_key.verifying_key();

    // NEAR private key format: base58(seed || public key), 64 bytes total
    let seed_bytes = signing_key.to_bytes();
    let public_key_bytes = verifying_key.to_bytes();

    let mut near_private_key_bytes = Vec::with_capacity(64);
    near_private_key_bytes.extend_from_slice(&seed_bytes);
    near_private_key_bytes.extend_from_slice(&public_key_bytes);

    let near_private_key = format!("ed25519:{}", bs58::encode(&near_private_key_bytes).into_string());
    let near_public_key = format!("ed25519:{}", bs58::encode(&public_key_bytes).into_string());

    debug!(
        "Derived Ed25519 key for {} (device {})",
        account_id, device_number
    );
    Ok((near_private_key, near_public_key))
}

/// Parse a NEAR-format private key ("ed25519:" + base58 of 64 bytes) into a
/// SigningKey. The caller owns keeping the plaintext transient.
pub(crate) fn signing_key_from_near_private_key(
    private_key: &str,
) -> Result<ed25519_dalek::SigningKey, String> {
    let key_str = private_key
        .strip_prefix("ed25519:")
        .ok_or_else(|| "Private key must be in ed25519: format".to_string())?;

    let key_bytes = Zeroizing::new(
        bs58::decode(key_str)
            .into_vec()
            .map_err(|e| format!("Failed to decode private key: {}", e))?,
    );

    if key_bytes.len() != 64 {
        return Err(format!(
            "Invalid private key length: expected 64 bytes, got {}",
            key_bytes.len()
        ));
    }

    let seed: [u8; 32] = key_bytes[0..32]
        .try_into()
        .map_err(|_| "Failed to extract seed from private key".to_string())?;

    Ok(ed25519_dalek::SigningKey::from_bytes(&seed))
}

// === RESPONSE HELPERS ===

impl EncryptedDataChaCha20Response {
    pub fn with_wrap_key_salt_b64u(mut self, wrap_key_salt_b64u: &str) -> Self {
        self.wrap_key_salt_b64u = Some(wrap_key_salt_b64u.to_string());
        self
    }
}
