// ******************************************************************************
// *                                                                            *
// *             HANDLER: DERIVE NEAR KEYPAIR AND ENCRYPT                       *
// *                                                                            *
// ******************************************************************************

use log::debug;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::config::LINK_DEVICE_REGISTRATION_GAS;
use crate::crypto::{
    derive_ed25519_key_from_prf_output, encrypt_data_chacha20, signing_key_from_near_private_key,
    WrapKey,
};
use crate::encoders::base64_url_decode;
use crate::transaction::{
    build_actions_from_params, build_transaction_with_actions, calculate_transaction_hash,
    sign_transaction,
};
use crate::types::handlers::AuthenticatorOptions;
use crate::types::webauthn::WebAuthnRegistrationCredential;
use crate::types::{EncryptedDataChaCha20Response, SignedTransaction, WasmSignedTransaction};

pub const LINK_DEVICE_REGISTER_USER_METHOD: &str = "link_device_register_user";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeriveNearKeypairAndEncryptRequest {
    pub session_id: String,
    pub near_account_id: String,
    /// Device slot this key belongs to; first device is 1
    #[serde(default = "default_device_number")]
    pub device_number: u8,
    /// When present, also sign the link-device registration transaction with
    /// the freshly derived key (key replacement during device linking).
    #[serde(default)]
    pub registration: Option<LinkDeviceRegistrationPayload>,
}

fn default_device_number() -> u8 {
    1
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkDeviceRegistrationPayload {
    pub contract_id: String,
    pub nonce: String,
    /// bs58 block hash for the registration transaction
    pub block_hash: String,
    /// Contract args, pre-assembled by the VRF-side confirmation flow
    pub vrf_data: serde_json::Value,
    /// base64url deterministic VRF public key
    pub deterministic_vrf_public_key: String,
    pub webauthn_registration: WebAuthnRegistrationCredential,
    #[serde(default)]
    pub authenticator_options: Option<AuthenticatorOptions>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeriveNearKeypairAndEncryptResult {
    pub near_account_id: String,
    pub public_key: String,
    pub encrypted_private_key: EncryptedDataChaCha20Response,
    pub device_number: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signed_registration_tx: Option<WasmSignedTransaction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registration_tx_hash: Option<String>,
}

/// **Handles:** `WorkerRequestType::DeriveNearKeypairAndEncrypt`
///
/// Derives the NEAR ed25519 keypair from PRF.first (delivered over the
/// session port), wraps the private key under the WrapKeySeed-derived KEK,
/// and optionally signs the link-device registration transaction before the
/// plaintext key leaves scope.
pub async fn handle_derive_near_keypair_and_encrypt(
    request: DeriveNearKeypairAndEncryptRequest,
    wrap_key: WrapKey,
    prf_first_b64u: String,
) -> Result<DeriveNearKeypairAndEncryptResult, String> {
    let (private_key, public_key) = derive_ed25519_key_from_prf_output(
        &prf_first_b64u,
        &request.near_account_id,
        request.device_number,
    )
    .map_err(|e| e.to_string())?;
    let private_key = Zeroizing::new(private_key);

    let kek = Zeroizing::new(wrap_key.derive_kek()?);
    let encrypted_private_key = encrypt_data_chacha20(&private_key, &kek)?
        .with_wrap_key_salt_b64u(wrap_key.salt_b64u());

    debug!(
        "Derived and encrypted NEAR key for {} (device {})",
        request.near_account_id, request.device_number
    );

    let mut result = DeriveNearKeypairAndEncryptResult {
        near_account_id: request.near_account_id.clone(),
        public_key,
        encrypted_private_key,
        device_number: request.device_number,
        signed_registration_tx: None,
        registration_tx_hash: None,
    };

    if let Some(registration) = request.registration {
        let (signed_tx, tx_hash) = sign_link_device_registration_tx(
            &registration,
            &request.near_account_id,
            &private_key,
        )?;
        result.signed_registration_tx = Some(WasmSignedTransaction::from_signed_transaction(
            &signed_tx,
        )?);
        result.registration_tx_hash = Some(tx_hash);
    }

    Ok(result)
}

/// Sign the device-link registration tx with the freshly derived key.
fn sign_link_device_registration_tx(
    registration: &LinkDeviceRegistrationPayload,
    signer_account_id: &str,
    private_key: &str,
) -> Result<(SignedTransaction, String), String> {
    let signing_key = signing_key_from_near_private_key(private_key)?;

    let nonce: u64 = registration
        .nonce
        .parse()
        .map_err(|e| format!("Invalid registration nonce: {}", e))?;
    let block_hash_bytes = bs58::decode(&registration.block_hash)
        .into_vec()
        .map_err(|e| format!("Invalid block hash: {}", e))?;

    let deterministic_vrf_public_key =
        base64_url_decode(&registration.deterministic_vrf_public_key)?;

    let action_params = vec![crate::actions::ActionParams::FunctionCall {
        method_name: LINK_DEVICE_REGISTER_USER_METHOD.to_string(),
        args: serde_json::json!({
            "vrf_data": registration.vrf_data,
            "webauthn_registration": registration.webauthn_registration,
            "deterministic_vrf_public_key": deterministic_vrf_public_key,
            "authenticator_options": registration.authenticator_options,
        })
        .to_string(),
        gas: LINK_DEVICE_REGISTRATION_GAS.to_string(),
        deposit: "0".to_string(),
    }];

    let actions = build_actions_from_params(action_params)
        .map_err(|e| format!("Failed to build registration actions: {}", e))?;

    let transaction = build_transaction_with_actions(
        signer_account_id,
        &registration.contract_id,
        nonce,
        &block_hash_bytes,
        &signing_key,
        actions,
    )?;

    let signed_tx_bytes = sign_transaction(transaction, &signing_key)?;
    let tx_hash = calculate_transaction_hash(&signed_tx_bytes);
    let signed_tx = SignedTransaction::from_borsh_bytes(&signed_tx_bytes)?;

    Ok((signed_tx, tx_hash))
}
