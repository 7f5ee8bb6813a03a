use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Nonce};
use getrandom::getrandom;
use hkdf::Hkdf;
use log::{debug, warn};
use rand_core::SeedableRng;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
// VRF and crypto imports
use vrf_wasm::ecvrf::ECVRFKeyPair;
use vrf_wasm::traits::WasmRngFromSeed;
use vrf_wasm::vrf::{VRFKeyPair, VRFProof};
use zeroize::ZeroizeOnDrop;

use crate::config::*;
use crate::errors::{AeadError, HkdfError, SerializationError, VrfResult, VrfWorkerError};
use crate::shamir3pass::Shamir3Pass;
use crate::types::*;
use crate::utils::{base64_url_decode, base64_url_encode, parse_block_height};

// === SECURE VRF KEYPAIR WRAPPER ===

/// VRF keypair wrapper with automatic memory zeroization
#[derive(ZeroizeOnDrop)]
pub struct SecureVRFKeyPair {
    keypair: ECVRFKeyPair,
}

impl SecureVRFKeyPair {
    pub fn new(keypair: ECVRFKeyPair) -> Self {
        Self { keypair }
    }

    pub fn inner(&self) -> &ECVRFKeyPair {
        &self.keypair
    }

    pub fn secret_key_bytes(&self) -> Vec<u8> {
        self.keypair.secret_key_bytes().to_vec()
    }
}

// === WRAP-KEY-SEED SESSIONS ===

/// Ephemeral per-signing-session material. Dispensed to the signer worker
/// over a dedicated MessagePort; bounded by TTL and a use count.
#[derive(Clone, ZeroizeOnDrop)]
pub struct VrfSessionData {
    pub wrap_key_seed: Vec<u8>,
    #[zeroize(skip)]
    pub wrap_key_salt_b64u: String,
    #[zeroize(skip)]
    pub created_at_ms: f64,
    #[zeroize(skip)]
    pub expires_at_ms: Option<f64>,
    #[zeroize(skip)]
    pub remaining_uses: Option<u32>,
}

// === VRF KEY MANAGER ===

pub struct VRFKeyManager {
    pub vrf_keypair: Option<SecureVRFKeyPair>,
    /// The single account the in-memory session belongs to. Challenge
    /// generation for any other account fails with AccountMismatch.
    pub session_account_id: Option<String>,
    pub session_start_time: f64,
    /// SessionId -> WrapKeySeed material awaiting dispense
    pub sessions: HashMap<String, VrfSessionData>,
    // Shamir 3-pass configs
    pub shamir3pass: Shamir3Pass,
    pub relay_server_url: Option<String>,
    pub apply_lock_route: Option<String>,
    pub remove_lock_route: Option<String>,
    pub key_info_route: Option<String>,
}

impl VRFKeyManager {
    pub fn new(
        shamir_p_b64u: Option<&str>,
        relay_server_url: Option<String>,
        apply_lock_route: Option<String>,
        remove_lock_route: Option<String>,
        key_info_route: Option<String>,
    ) -> Self {
        let shamir3pass = match shamir_p_b64u {
            Some(p) => match Shamir3Pass::new(p) {
                Ok(sp) => sp,
                Err(e) => {
                    warn!(
                        "Rejecting provided Shamir p ({:?}); using compiled-in prime",
                        e
                    );
                    Shamir3Pass::new_default()
                }
            },
            None => Shamir3Pass::new_default(),
        };

        Self {
            vrf_keypair: None,
            session_account_id: None,
            session_start_time: 0.0,
            sessions: HashMap::new(),
            shamir3pass,
            relay_server_url,
            apply_lock_route,
            remove_lock_route,
            key_info_route,
        }
    }

    pub fn shamir3pass(&self) -> &Shamir3Pass {
        &self.shamir3pass
    }

    pub fn session_active(&self) -> bool {
        self.session_account_id.is_some() && self.vrf_keypair.is_some()
    }

    /// Secret key bytes of the current in-memory VRF keypair.
    /// Only ever consumed inside the worker (WrapKeySeed derivation).
    pub fn get_vrf_secret_key_bytes(&self) -> VrfResult<Vec<u8>> {
        if !self.session_active() {
            return Err(VrfWorkerError::SessionInactive);
        }
        let sk = self
            .vrf_keypair
            .as_ref()
            .ok_or(VrfWorkerError::SessionInactive)?;
        Ok(sk.secret_key_bytes())
    }

    /// Generate a random VRF keypair held unencrypted in worker memory until
    /// the registration ceremony produces PRF output to wrap it with. Solves
    /// the chicken-and-egg at registration: the challenge the authenticator
    /// signs is produced by the very keypair being registered.
    pub fn generate_vrf_keypair_bootstrap(
        &mut self,
        account_id: String,
        vrf_input_data: Option<VRFInputData>,
    ) -> VrfResult<GenerateVrfKeypairBootstrapResponse> {
        debug!("Generating bootstrap VRF keypair for {}", account_id);

        // Clear any existing keypair (zeroization via ZeroizeOnDrop)
        self.vrf_keypair.take();

        let vrf_keypair = self.generate_vrf_keypair()?;

        let vrf_public_key_bytes = bincode::serialize(&vrf_keypair.pk).map_err(|e| {
            VrfWorkerError::Serialization(SerializationError::VrfPublicKeySerialization(format!(
                "{:?}",
                e
            )))
        })?;
        let vrf_public_key_b64 = base64_url_encode(&vrf_public_key_bytes);

        self.vrf_keypair = Some(SecureVRFKeyPair::new(vrf_keypair));
        self.session_account_id = Some(account_id);
        self.session_start_time = now_ms();

        let mut result = GenerateVrfKeypairBootstrapResponse {
            vrf_public_key: vrf_public_key_b64,
            vrf_challenge_data: None,
        };

        if let Some(vrf_input_data) = vrf_input_data {
            let vrf_keypair = self.vrf_keypair.as_ref().unwrap().inner();
            result.vrf_challenge_data =
                Some(self.generate_vrf_challenge_with_keypair(vrf_keypair, vrf_input_data)?);
        }

        Ok(result)
    }

    /// Encrypt the in-memory VRF keypair with real PRF output after the
    /// WebAuthn ceremony. Verifies the keypair is the one the caller expects.
    pub fn encrypt_vrf_keypair_with_prf(
        &mut self,
        expected_public_key: String,
        prf_key: Vec<u8>,
    ) -> VrfResult<EncryptedVrfKeypairResponse> {
        debug!(
            "Encrypting VRF keypair with PRF output. Expected public key: {}...",
            &expected_public_key[..DISPLAY_TRUNCATE_LENGTH.min(expected_public_key.len())]
        );

        if !self.session_active() {
            return Err(VrfWorkerError::SessionInactive);
        }

        let vrf_keypair = self.vrf_keypair.as_ref().unwrap().inner();
        let stored_public_key_bytes = bincode::serialize(&vrf_keypair.pk)
            .map_err(|e| format!("Failed to serialize stored VRF public key: {:?}", e))?;
        let stored_public_key = base64_url_encode(&stored_public_key_bytes);

        if stored_public_key != expected_public_key {
            return Err(VrfWorkerError::invalid_format(
                "bootstrap VRF public key does not match the expected key",
            ));
        }

        let (vrf_public_key, encrypted_vrf_keypair) =
            self.encrypt_vrf_keypair_data(vrf_keypair, &prf_key)?;

        Ok(EncryptedVrfKeypairResponse {
            vrf_public_key,
            encrypted_vrf_keypair,
        })
    }

    /// Decrypt a PRF-wrapped VRF keypair and install it as the active session.
    pub fn unlock_vrf_keypair(
        &mut self,
        account_id: String,
        encrypted_vrf_keypair: EncryptedVRFKeypair,
        prf_key: Vec<u8>,
    ) -> VrfResult<()> {
        debug!("Unlocking VRF keypair for {}", account_id);
        self.vrf_keypair.take();

        let decrypted_keypair = self.decrypt_vrf_keypair(encrypted_vrf_keypair, prf_key)?;

        self.vrf_keypair = Some(SecureVRFKeyPair::new(decrypted_keypair));
        self.session_account_id = Some(account_id);
        self.session_start_time = now_ms();

        debug!("VRF keypair unlocked successfully");
        Ok(())
    }

    /// Load a plaintext VRF keypair recovered via the Shamir 3-pass unlock.
    pub fn load_plaintext_vrf_keypair(
        &mut self,
        account_id: String,
        keypair_data: VRFKeypairData,
    ) -> VrfResult<()> {
        debug!("Loading VRF keypair for {}", account_id);
        self.vrf_keypair.take();
        let keypair: ECVRFKeyPair = bincode::deserialize(&keypair_data.keypair_bytes)?;
        self.vrf_keypair = Some(SecureVRFKeyPair::new(keypair));
        self.session_account_id = Some(account_id);
        self.session_start_time = now_ms();
        Ok(())
    }

    /// Generate a VRF challenge from the active session. No user activation
    /// is required; regenerating a challenge is a pure worker-side operation.
    pub fn generate_vrf_challenge(&self, input_data: VRFInputData) -> VrfResult<VRFChallengeData> {
        if !self.session_active() {
            return Err(VrfWorkerError::SessionInactive);
        }
        let session_account = self.session_account_id.as_ref().unwrap();
        if session_account != &input_data.user_id {
            return Err(VrfWorkerError::account_mismatch(
                session_account,
                &input_data.user_id,
            ));
        }

        let vrf_keypair = self.vrf_keypair.as_ref().unwrap().inner();
        self.generate_vrf_challenge_with_keypair(vrf_keypair, input_data)
    }

    /// Generate a VRF challenge using a specific keypair (session or bootstrap).
    ///
    /// Input layout: SHA256(domain || user_id || rp_id || block_height_le64 || block_hash)
    pub fn generate_vrf_challenge_with_keypair(
        &self,
        vrf_keypair: &ECVRFKeyPair,
        input_data: VRFInputData,
    ) -> VrfResult<VRFChallengeData> {
        let user_id_bytes = input_data.user_id.as_bytes();
        let rp_id_bytes = input_data.rp_id.as_bytes();
        let block_height_num = parse_block_height(&input_data.block_height)?;
        let block_height_bytes = block_height_num.to_le_bytes();

        let block_hash_bytes = bs58::decode(&input_data.block_hash)
            .into_vec()
            .map_err(|e| VrfWorkerError::invalid_format(&format!("invalid blockHash: {}", e)))?;

        let mut vrf_input_data = Vec::new();
        vrf_input_data.extend_from_slice(VRF_CHALLENGE_DOMAIN);
        vrf_input_data.extend_from_slice(user_id_bytes);
        vrf_input_data.extend_from_slice(rp_id_bytes);
        vrf_input_data.extend_from_slice(&block_height_bytes);
        vrf_input_data.extend_from_slice(&block_hash_bytes);

        let vrf_input = Sha256::digest(&vrf_input_data).to_vec();

        let proof = vrf_keypair.prove(&vrf_input);
        let vrf_output = proof.to_hash().to_vec();

        let proof_bytes = bincode::serialize(&proof).map_err(|e| {
            VrfWorkerError::Serialization(SerializationError::VrfKeypairSerialization(format!(
                "{:?}",
                e
            )))
        })?;
        let pk_bytes = bincode::serialize(&vrf_keypair.pk).map_err(|e| {
            VrfWorkerError::Serialization(SerializationError::VrfPublicKeySerialization(format!(
                "{:?}",
                e
            )))
        })?;

        Ok(VRFChallengeData {
            vrf_input: base64_url_encode(&vrf_input),
            vrf_output: base64_url_encode(&vrf_output),
            vrf_proof: base64_url_encode(&proof_bytes),
            vrf_public_key: base64_url_encode(&pk_bytes),
            user_id: input_data.user_id,
            rp_id: input_data.rp_id,
            block_height: input_data.block_height,
            block_hash: base64_url_encode(&block_hash_bytes),
        })
    }

    pub fn get_vrf_status(&self) -> VrfStatusResponse {
        let active = self.session_active();
        let session_duration_ms = if active {
            now_ms() - self.session_start_time
        } else {
            0.0
        };
        VrfStatusResponse {
            active,
            account_id: self.session_account_id.clone(),
            session_duration_ms,
        }
    }

    /// Zeroize all secret material and tear down session latches.
    pub fn clear_session(&mut self) -> VrfResult<()> {
        if self.vrf_keypair.take().is_some() {
            debug!("VRF keypair cleared with zeroization");
        }
        self.session_account_id = None;
        self.session_start_time = 0.0;
        self.sessions.clear();
        Ok(())
    }

    /// Derive a deterministic VRF keypair from PRF output.
    ///
    /// HKDF-SHA256 over the PRF output with info "w3a/vrf/v1/" + account_id
    /// yields the ed25519 seed; the keypair is AEAD-wrapped under the same
    /// PRF output for local storage.
    pub fn derive_vrf_keypair_from_prf(
        &self,
        prf_output: Vec<u8>,
        account_id: String,
        vrf_input_params: Option<VRFInputData>,
    ) -> VrfResult<(DerivedVrfKeypair, ECVRFKeyPair)> {
        if prf_output.is_empty() {
            return Err(VrfWorkerError::empty_prf_output());
        }

        let vrf_keypair = self.generate_vrf_keypair_from_seed(&prf_output, &account_id)?;

        let vrf_public_key_bytes = bincode::serialize(&vrf_keypair.pk).map_err(|e| {
            VrfWorkerError::Serialization(SerializationError::VrfPublicKeySerialization(format!(
                "{:?}",
                e
            )))
        })?;
        let vrf_public_key_b64 = base64_url_encode(&vrf_public_key_bytes);

        let (_public_key, encrypted_vrf_keypair) =
            self.encrypt_vrf_keypair_data(&vrf_keypair, &prf_output)?;

        let vrf_challenge_data = match vrf_input_params {
            Some(params) => Some(self.generate_vrf_challenge_with_keypair(&vrf_keypair, params)?),
            None => None,
        };

        let derived = DerivedVrfKeypair {
            vrf_public_key: vrf_public_key_b64,
            vrf_challenge_data,
            encrypted_vrf_keypair,
        };

        Ok((derived, vrf_keypair))
    }

    /// Install a derived keypair as the active in-memory session.
    pub fn store_vrf_keypair_in_memory(&mut self, vrf_keypair: ECVRFKeyPair, account_id: String) {
        debug!("Storing VRF keypair in worker memory for {}", account_id);
        self.vrf_keypair.take();
        self.vrf_keypair = Some(SecureVRFKeyPair::new(vrf_keypair));
        self.session_account_id = Some(account_id);
        self.session_start_time = now_ms();
    }

    // === WRAP-KEY-SEED SESSION STORE ===

    pub fn upsert_session(&mut self, session_id: &str, data: VrfSessionData) {
        self.sessions.insert(session_id.to_string(), data);
    }

    /// Dispense WrapKeySeed material for a signing session, consuming `uses`
    /// from its budget. Expired or exhausted sessions are removed.
    pub fn dispense_session_key(
        &mut self,
        session_id: &str,
        uses: u32,
        now_ms: f64,
    ) -> VrfResult<VrfSessionData> {
        let expired = match self.sessions.get(session_id) {
            None => return Err(VrfWorkerError::MissingRequiredData(format!(
                "no WrapKeySeed session {}",
                session_id
            ))),
            Some(session) => session
                .expires_at_ms
                .map(|expiry| now_ms >= expiry)
                .unwrap_or(false),
        };
        if expired {
            self.sessions.remove(session_id);
            return Err(VrfWorkerError::SessionExpired);
        }

        let session = self.sessions.get_mut(session_id).unwrap();
        if let Some(remaining) = session.remaining_uses {
            if remaining == 0 {
                self.sessions.remove(session_id);
                return Err(VrfWorkerError::SessionExhausted);
            }
            session.remaining_uses = Some(remaining.saturating_sub(uses));
        }

        Ok(self.sessions.get(session_id).unwrap().clone())
    }

    // === PRIVATE HELPER METHODS ===

    fn decrypt_vrf_keypair(
        &self,
        encrypted_vrf_keypair: EncryptedVRFKeypair,
        prf_key: Vec<u8>,
    ) -> VrfResult<ECVRFKeyPair> {
        let hk = Hkdf::<Sha256>::new(None, &prf_key);
        let mut chacha20_key = [0u8; CHACHA20_KEY_SIZE];
        hk.expand(HKDF_CHACHA20_KEY_INFO, &mut chacha20_key)
            .map_err(|_| VrfWorkerError::KdfFailed(HkdfError::KeyDerivationFailed))?;

        let encrypted_data = base64_url_decode(&encrypted_vrf_keypair.encrypted_vrf_data_b64u)?;
        let iv_nonce_bytes = base64_url_decode(&encrypted_vrf_keypair.chacha20_nonce_b64u)?;

        if iv_nonce_bytes.len() != CHACHA20_NONCE_SIZE {
            return Err(VrfWorkerError::InvalidIvLength {
                expected: CHACHA20_NONCE_SIZE,
                actual: iv_nonce_bytes.len(),
            });
        }

        let key = chacha20poly1305::Key::from_slice(&chacha20_key);
        let cipher = ChaCha20Poly1305::new(key);
        let nonce = Nonce::from_slice(&iv_nonce_bytes);

        let decrypted_data = cipher
            .decrypt(nonce, encrypted_data.as_ref())
            .map_err(|e| VrfWorkerError::AeadFailed(AeadError::DecryptionFailed(e.to_string())))?;

        let keypair_data: VRFKeypairData = bincode::deserialize(&decrypted_data).map_err(|e| {
            VrfWorkerError::Serialization(SerializationError::KeypairDataDeserialization(
                e.to_string(),
            ))
        })?;

        // Reconstruct the exact original keypair from its bincode bytes
        let keypair: ECVRFKeyPair =
            bincode::deserialize(&keypair_data.keypair_bytes).map_err(|e| {
                VrfWorkerError::Serialization(SerializationError::VrfKeypairDeserialization(
                    e.to_string(),
                ))
            })?;

        Ok(keypair)
    }

    fn generate_vrf_keypair(&self) -> VrfResult<ECVRFKeyPair> {
        let mut rng = WasmRngFromSeed::from_entropy();
        Ok(ECVRFKeyPair::generate(&mut rng))
    }

    /// Deterministic VRF keypair from seed material (PRF output).
    fn generate_vrf_keypair_from_seed(
        &self,
        seed: &[u8],
        account_id: &str,
    ) -> VrfResult<ECVRFKeyPair> {
        let info = format!("{}{}", VRF_KEYPAIR_HKDF_INFO_PREFIX, account_id);
        let hk = Hkdf::<Sha256>::new(None, seed);
        let mut vrf_seed = [0u8; VRF_SEED_SIZE];
        hk.expand(info.as_bytes(), &mut vrf_seed)
            .map_err(|_| VrfWorkerError::KdfFailed(HkdfError::VrfSeedDerivationFailed))?;

        let mut rng = WasmRngFromSeed::from_seed(vrf_seed);
        Ok(ECVRFKeyPair::generate(&mut rng))
    }

    /// Serialize and AEAD-wrap a VRF keypair under a PRF-derived key.
    fn encrypt_vrf_keypair_data(
        &self,
        vrf_keypair: &ECVRFKeyPair,
        prf_key: &[u8],
    ) -> VrfResult<(String, EncryptedVRFKeypair)> {
        let vrf_keypair_bytes = bincode::serialize(vrf_keypair)?;
        let vrf_public_key_bytes = bincode::serialize(&vrf_keypair.pk)?;

        let keypair_data = VRFKeypairData {
            keypair_bytes: vrf_keypair_bytes,
            public_key_base64: base64_url_encode(&vrf_public_key_bytes),
        };

        let keypair_data_bytes = bincode::serialize(&keypair_data).map_err(|e| {
            VrfWorkerError::Serialization(SerializationError::KeypairDataSerialization(format!(
                "{:?}",
                e
            )))
        })?;

        let encrypted_keypair = self.encrypt_vrf_keypair(&keypair_data_bytes, prf_key)?;

        Ok((base64_url_encode(&vrf_public_key_bytes), encrypted_keypair))
    }

    fn encrypt_vrf_keypair(&self, data: &[u8], key: &[u8]) -> VrfResult<EncryptedVRFKeypair> {
        let hk = Hkdf::<Sha256>::new(None, key);
        let mut chacha20_key = [0u8; CHACHA20_KEY_SIZE];
        hk.expand(HKDF_CHACHA20_KEY_INFO, &mut chacha20_key)
            .map_err(|_| VrfWorkerError::KdfFailed(HkdfError::KeyDerivationFailed))?;

        let key_slice = chacha20poly1305::Key::from_slice(&chacha20_key);
        let cipher = ChaCha20Poly1305::new(key_slice);

        // Fresh nonce per wrap
        let mut iv_nonce_bytes = [0u8; CHACHA20_NONCE_SIZE];
        getrandom(&mut iv_nonce_bytes).map_err(|e| {
            VrfWorkerError::AeadFailed(AeadError::NonceGenerationFailed(e.to_string()))
        })?;
        let nonce = Nonce::from_slice(&iv_nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, data)
            .map_err(|e| VrfWorkerError::AeadFailed(AeadError::EncryptionFailed(e.to_string())))?;

        Ok(EncryptedVRFKeypair {
            encrypted_vrf_data_b64u: base64_url_encode(&ciphertext),
            chacha20_nonce_b64u: base64_url_encode(&iv_nonce_bytes),
        })
    }
}

/// Result of a deterministic VRF derivation, before any Shamir wrapping.
pub struct DerivedVrfKeypair {
    pub vrf_public_key: String,
    pub vrf_challenge_data: Option<VRFChallengeData>,
    pub encrypted_vrf_keypair: EncryptedVRFKeypair,
}
