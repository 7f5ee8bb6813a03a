//! Cross-origin confirmation state machine.
//!
//! One deterministic sequence for every request class:
//! Classifying → Preparing → AwaitingUi → Refreshing → CollectingCredential
//! → Responding → Done, with Cancelled / TimedOut / MismatchedIntent as
//! terminal error states. `uiMode` only selects how the prompt is mounted
//! and whether a click is awaited; the event timeline is identical for
//! modal and drawer.

pub mod config;
pub mod digest;

use async_trait::async_trait;
use getrandom::getrandom;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{WalletError, WalletResult};
use crate::nonce_manager::TransactionContext;
pub use config::{
    apply_runtime_clamps, merge_confirmation_config, ConfirmationBehavior, ConfirmationConfig,
    ConfirmationUiMode, FlowClass, RuntimeEnvironment,
};
pub use digest::compute_intent_digest;

pub const UI_DIGEST_MISMATCH: &str = "ui_digest_mismatch";

// === STATES ===

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConfirmPhase {
    Classifying,
    Preparing,
    AwaitingUi,
    Refreshing,
    CollectingCredential,
    Responding,
    Done,
    Cancelled,
    TimedOut,
    MismatchedIntent,
}

// === REQUEST / DECISION TYPES ===

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ConfirmationRequestKind {
    /// Decrypt private key for internal use: UI suppressed entirely
    DecryptPrivateKey,
    /// Show the private-key viewer: sticky UI, kept open past the decision
    ExportPrivateKey,
    Registration {
        device_number: u8,
    },
    LinkDevice {
        device_number: u8,
    },
    SignTransactions {
        /// `[{ receiverId, actions }, ...]` exactly as the UI renders them
        tx_signing_requests: Vec<Value>,
    },
    SignNep413 {
        message_summary: Value,
    },
    SignDelegate {
        delegate_summary: Value,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmationRequest {
    pub request_id: String,
    pub account_id: String,
    pub rp_id: String,
    #[serde(flatten)]
    pub kind: ConfirmationRequestKind,
    /// The requester's digest over the transaction set, when it computed one
    pub intent_digest: Option<String>,
    /// Per-request config override (strongest precedence)
    pub confirmation_config: Option<ConfirmationConfig>,
}

/// Sanitized decision handed back through the router. Contains no PRF
/// output, no handles, nothing that cannot survive a structured clone.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmationDecision {
    pub request_id: String,
    pub intent_digest: Option<String>,
    pub confirmed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vrf_challenge: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_context: Option<TransactionContext>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reserved_nonces: Option<Vec<String>>,
    /// Device number actually used (registration may bump it on conflict)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_number: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// === COLLABORATOR SEAMS ===

/// What the UI shows and how it behaves for this confirmation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UiPrompt {
    pub request_id: String,
    pub account_id: String,
    pub ui_mode: ConfirmationUiMode,
    pub behavior: ConfirmationBehavior,
    pub auto_proceed_delay: Option<u32>,
    pub theme: Option<String>,
    /// Sticky prompts stay mounted after the decision (key export viewer)
    pub sticky: bool,
    pub summary: Value,
    pub tx_signing_requests: Vec<Value>,
    pub intent_digest: Option<String>,
}

/// The UI's verdict: whether the user proceeded, and the digest the UI
/// computed over what it actually rendered.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UiDecision {
    pub confirmed: bool,
    pub intent_digest: Option<String>,
}

#[async_trait(?Send)]
pub trait ConfirmationUi {
    async fn present(&self, prompt: &UiPrompt) -> WalletResult<UiDecision>;
    /// Close any mounted prompt; sticky prompts ignore this until the host
    /// posts WALLET_UI_CLOSED.
    fn close(&self);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialError {
    /// User cancellation / NotAllowedError
    NotAllowed,
    /// InvalidStateError: the credential already exists on this device slot
    InvalidState,
    /// SecurityError: the wallet origin cannot run WebAuthn (Safari
    /// cross-origin case); the router escalates to the parent
    Security,
    Other(String),
}

#[async_trait(?Send)]
pub trait CredentialCollector {
    /// navigator.credentials.create() with dual PRF evaluation inputs
    async fn create_credential(
        &self,
        account_id: &str,
        device_number: u8,
        challenge_b64u: &str,
    ) -> Result<Value, CredentialError>;

    /// navigator.credentials.get() with PRF evaluation input
    async fn get_credential(
        &self,
        account_id: &str,
        challenge_b64u: &str,
    ) -> Result<Value, CredentialError>;
}

#[async_trait(?Send)]
pub trait VrfChallenger {
    /// Challenge from the active VRF session
    async fn generate_challenge(
        &self,
        account_id: &str,
        rp_id: &str,
        block_height: &str,
        block_hash: &str,
    ) -> WalletResult<Value>;

    /// Bootstrap a temporary VRF keypair and challenge (registration only)
    async fn bootstrap_challenge(
        &self,
        account_id: &str,
        rp_id: &str,
        block_height: &str,
        block_hash: &str,
    ) -> WalletResult<Value>;
}

#[async_trait(?Send)]
pub trait ChainContextSource {
    async fn transaction_context(&self, force: bool) -> WalletResult<TransactionContext>;
    fn reserve_nonces(&self, count: usize) -> WalletResult<Vec<String>>;
    fn release_nonces(&self, nonces: &[String]);
}

pub struct ConfirmFlowDeps<'a> {
    pub ui: &'a dyn ConfirmationUi,
    pub credentials: &'a dyn CredentialCollector,
    pub vrf: &'a dyn VrfChallenger,
    pub chain: &'a dyn ChainContextSource,
    pub env: RuntimeEnvironment,
    /// Phase observer; progress events fire here in order
    pub on_phase: Option<&'a dyn Fn(ConfirmPhase)>,
}

// === DRIVER ===

struct FlowState {
    phase: ConfirmPhase,
    reserved_nonces: Vec<String>,
}

impl FlowState {
    fn enter(&mut self, phase: ConfirmPhase, deps: &ConfirmFlowDeps<'_>) {
        debug!("confirm flow: {:?} -> {:?}", self.phase, phase);
        self.phase = phase;
        if let Some(observer) = deps.on_phase {
            observer(phase);
        }
    }
}

/// Run one confirmation to a terminal decision. Cancellation and failure
/// paths release reserved nonces and close non-sticky UI before returning.
pub async fn run_confirm_flow(
    request: ConfirmationRequest,
    stored_preference: Option<&ConfirmationConfig>,
    deps: &ConfirmFlowDeps<'_>,
) -> ConfirmationDecision {
    let mut state = FlowState {
        phase: ConfirmPhase::Classifying,
        reserved_nonces: Vec::new(),
    };
    if let Some(observer) = deps.on_phase {
        observer(ConfirmPhase::Classifying);
    }

    match drive(&request, stored_preference, deps, &mut state).await {
        Ok(decision) => {
            state.enter(ConfirmPhase::Done, deps);
            decision
        }
        Err(failure) => {
            // Every failure path releases its reservations and closes the UI
            deps.chain.release_nonces(&state.reserved_nonces);
            if !is_sticky(&request.kind) {
                deps.ui.close();
            }
            state.enter(failure.terminal_phase, deps);
            ConfirmationDecision {
                request_id: request.request_id.clone(),
                intent_digest: failure.intent_digest,
                confirmed: false,
                vrf_challenge: None,
                transaction_context: None,
                credential: None,
                reserved_nonces: None,
                device_number: None,
                error: Some(failure.error),
            }
        }
    }
}

struct FlowFailure {
    terminal_phase: ConfirmPhase,
    error: String,
    intent_digest: Option<String>,
}

impl FlowFailure {
    fn from_wallet_error(err: WalletError) -> Self {
        let terminal_phase = match err {
            WalletError::Timeout(_) => ConfirmPhase::TimedOut,
            WalletError::NotAuthorized(_) => ConfirmPhase::Cancelled,
            _ => ConfirmPhase::Cancelled,
        };
        FlowFailure {
            terminal_phase,
            error: err.to_string(),
            intent_digest: None,
        }
    }
}

fn classify(kind: &ConfirmationRequestKind) -> FlowClass {
    match kind {
        ConfirmationRequestKind::DecryptPrivateKey => FlowClass::LocalDecrypt,
        ConfirmationRequestKind::ExportPrivateKey => FlowClass::LocalExport,
        ConfirmationRequestKind::Registration { .. } => FlowClass::Registration,
        ConfirmationRequestKind::LinkDevice { .. } => FlowClass::LinkDevice,
        ConfirmationRequestKind::SignTransactions { .. }
        | ConfirmationRequestKind::SignNep413 { .. }
        | ConfirmationRequestKind::SignDelegate { .. } => FlowClass::Signing,
    }
}

fn is_sticky(kind: &ConfirmationRequestKind) -> bool {
    matches!(kind, ConfirmationRequestKind::ExportPrivateKey)
}

fn needs_chain_context(class: FlowClass) -> bool {
    !matches!(class, FlowClass::LocalDecrypt | FlowClass::LocalExport)
}

async fn drive(
    request: &ConfirmationRequest,
    stored_preference: Option<&ConfirmationConfig>,
    deps: &ConfirmFlowDeps<'_>,
    state: &mut FlowState,
) -> Result<ConfirmationDecision, FlowFailure> {
    // --- Classifying ---
    let class = classify(&request.kind);
    let merged = merge_confirmation_config(request.confirmation_config.as_ref(), stored_preference);
    let effective = apply_runtime_clamps(merged, class, deps.env);

    // --- Preparing ---
    state.enter(ConfirmPhase::Preparing, deps);

    let tx_signing_requests = match &request.kind {
        ConfirmationRequestKind::SignTransactions { tx_signing_requests } => {
            tx_signing_requests.clone()
        }
        _ => Vec::new(),
    };

    // The digest the flow itself computes over what will be signed; the UI
    // must independently arrive at the same value.
    let expected_digest = match &request.kind {
        ConfirmationRequestKind::SignTransactions { tx_signing_requests } => Some(
            compute_intent_digest(tx_signing_requests)
                .map_err(|e| FlowFailure::from_wallet_error(WalletError::internal(e)))?,
        ),
        _ => request.intent_digest.clone(),
    };

    if let (Some(requester), Some(expected)) = (&request.intent_digest, &expected_digest) {
        if requester != expected {
            return Err(FlowFailure {
                terminal_phase: ConfirmPhase::MismatchedIntent,
                error: UI_DIGEST_MISMATCH.to_string(),
                intent_digest: Some(expected.clone()),
            });
        }
    }

    let mut transaction_context = None;
    let mut vrf_challenge = None;

    match class {
        FlowClass::LocalDecrypt | FlowClass::LocalExport => {
            // No chain calls; a random challenge keeps the WebAuthn plumbing
            // uniform without anchoring anything on-chain.
            vrf_challenge = Some(
                local_random_challenge()
                    .map_err(FlowFailure::from_wallet_error)?,
            );
        }
        FlowClass::Registration | FlowClass::LinkDevice => {
            let ctx = deps
                .chain
                .transaction_context(false)
                .await
                .map_err(FlowFailure::from_wallet_error)?;
            vrf_challenge = Some(
                deps.vrf
                    .bootstrap_challenge(
                        &request.account_id,
                        &request.rp_id,
                        &ctx.tx_block_height,
                        &ctx.tx_block_hash,
                    )
                    .await
                    .map_err(FlowFailure::from_wallet_error)?,
            );
            transaction_context = Some(ctx);
        }
        FlowClass::Signing => {
            let ctx = deps
                .chain
                .transaction_context(false)
                .await
                .map_err(FlowFailure::from_wallet_error)?;
            if !tx_signing_requests.is_empty() {
                state.reserved_nonces = deps
                    .chain
                    .reserve_nonces(tx_signing_requests.len())
                    .map_err(FlowFailure::from_wallet_error)?;
            }
            vrf_challenge = Some(
                deps.vrf
                    .generate_challenge(
                        &request.account_id,
                        &request.rp_id,
                        &ctx.tx_block_height,
                        &ctx.tx_block_hash,
                    )
                    .await
                    .map_err(FlowFailure::from_wallet_error)?,
            );
            transaction_context = Some(ctx);
        }
    }

    // --- AwaitingUi ---
    state.enter(ConfirmPhase::AwaitingUi, deps);

    if effective.ui_mode != ConfirmationUiMode::Skip {
        let prompt = UiPrompt {
            request_id: request.request_id.clone(),
            account_id: request.account_id.clone(),
            ui_mode: effective.ui_mode,
            behavior: effective.behavior,
            auto_proceed_delay: effective.auto_proceed_delay,
            theme: effective.theme.clone(),
            sticky: is_sticky(&request.kind),
            summary: summarize(&request.kind),
            tx_signing_requests: tx_signing_requests.clone(),
            intent_digest: expected_digest.clone(),
        };

        let ui_decision = deps
            .ui
            .present(&prompt)
            .await
            .map_err(FlowFailure::from_wallet_error)?;

        if !ui_decision.confirmed {
            return Err(FlowFailure {
                terminal_phase: ConfirmPhase::Cancelled,
                error: WalletError::NotAuthorized("user declined confirmation".to_string())
                    .to_string(),
                intent_digest: expected_digest,
            });
        }

        // Digest gate: what the UI rendered must be what will be signed
        if let Some(expected) = &expected_digest {
            match &ui_decision.intent_digest {
                Some(reported) if reported == expected => {}
                _ => {
                    warn!("confirm flow: UI digest mismatch on {}", request.request_id);
                    return Err(FlowFailure {
                        terminal_phase: ConfirmPhase::MismatchedIntent,
                        error: UI_DIGEST_MISMATCH.to_string(),
                        intent_digest: Some(expected.clone()),
                    });
                }
            }
        }
    }

    // --- Refreshing (JIT, right before credential collection) ---
    state.enter(ConfirmPhase::Refreshing, deps);

    if needs_chain_context(class) {
        let mut fresh = deps
            .chain
            .transaction_context(true)
            .await
            .map_err(FlowFailure::from_wallet_error)?;
        vrf_challenge = Some(
            deps.vrf
                .generate_challenge(
                    &request.account_id,
                    &request.rp_id,
                    &fresh.tx_block_height,
                    &fresh.tx_block_hash,
                )
                .await
                .map_err(FlowFailure::from_wallet_error)?,
        );
        // The refreshed context reports the manager's next free nonce, which
        // already sits past this flow's reservation. The signer must bake
        // the reserved block, so the context it receives starts there.
        if let Some(first) = state.reserved_nonces.first() {
            fresh.next_nonce = first.clone();
        }
        transaction_context = Some(fresh);
    }

    // --- CollectingCredential ---
    state.enter(ConfirmPhase::CollectingCredential, deps);

    let challenge_b64u = vrf_challenge
        .as_ref()
        .and_then(|c| c.get("vrfOutput"))
        .and_then(|o| o.as_str())
        .unwrap_or_default()
        .to_string();

    let (credential, final_device_number) =
        collect_credential(request, class, &challenge_b64u, deps).await?;

    // --- Responding ---
    state.enter(ConfirmPhase::Responding, deps);

    Ok(ConfirmationDecision {
        request_id: request.request_id.clone(),
        intent_digest: expected_digest,
        confirmed: true,
        vrf_challenge,
        transaction_context,
        credential: Some(credential),
        reserved_nonces: (!state.reserved_nonces.is_empty())
            .then(|| state.reserved_nonces.clone()),
        device_number: final_device_number,
        error: None,
    })
}

/// Collect the WebAuthn credential for this class. Registration conflicts
/// (InvalidStateError) bump the device number and retry exactly once.
async fn collect_credential(
    request: &ConfirmationRequest,
    class: FlowClass,
    challenge_b64u: &str,
    deps: &ConfirmFlowDeps<'_>,
) -> Result<(Value, Option<u8>), FlowFailure> {
    match class {
        FlowClass::Registration | FlowClass::LinkDevice => {
            let device_number = match &request.kind {
                ConfirmationRequestKind::Registration { device_number }
                | ConfirmationRequestKind::LinkDevice { device_number } => *device_number,
                _ => 1,
            };

            match deps
                .credentials
                .create_credential(&request.account_id, device_number, challenge_b64u)
                .await
            {
                Ok(credential) => Ok((credential, Some(device_number))),
                Err(CredentialError::InvalidState) => {
                    let bumped = device_number + 1;
                    debug!(
                        "confirm flow: credential exists for device {}; retrying with {}",
                        device_number, bumped
                    );
                    match deps
                        .credentials
                        .create_credential(&request.account_id, bumped, challenge_b64u)
                        .await
                    {
                        Ok(credential) => Ok((credential, Some(bumped))),
                        Err(err) => Err(credential_failure(err)),
                    }
                }
                Err(err) => Err(credential_failure(err)),
            }
        }
        _ => deps
            .credentials
            .get_credential(&request.account_id, challenge_b64u)
            .await
            .map(|credential| (credential, None))
            .map_err(credential_failure),
    }
}

fn credential_failure(err: CredentialError) -> FlowFailure {
    let wallet_err = match err {
        CredentialError::NotAllowed => {
            WalletError::NotAuthorized("authenticator request was not allowed".to_string())
        }
        CredentialError::InvalidState => {
            WalletError::Conflict("credential already exists after retry".to_string())
        }
        CredentialError::Security => WalletError::Unavailable(
            "wallet origin cannot run WebAuthn; parent fallback required".to_string(),
        ),
        CredentialError::Other(msg) => WalletError::internal(msg),
    };
    FlowFailure::from_wallet_error(wallet_err)
}

fn summarize(kind: &ConfirmationRequestKind) -> Value {
    match kind {
        ConfirmationRequestKind::DecryptPrivateKey => serde_json::json!({ "type": "decrypt" }),
        ConfirmationRequestKind::ExportPrivateKey => serde_json::json!({ "type": "export" }),
        ConfirmationRequestKind::Registration { device_number } => {
            serde_json::json!({ "type": "registration", "deviceNumber": device_number })
        }
        ConfirmationRequestKind::LinkDevice { device_number } => {
            serde_json::json!({ "type": "linkDevice", "deviceNumber": device_number })
        }
        ConfirmationRequestKind::SignTransactions { tx_signing_requests } => {
            let receivers: Vec<&str> = tx_signing_requests
                .iter()
                .filter_map(|tx| tx.get("receiverId").and_then(|r| r.as_str()))
                .collect();
            let to = match receivers.len() {
                0 => "0 recipients".to_string(),
                1 => receivers[0].to_string(),
                n => format!("{} recipients", n),
            };
            serde_json::json!({ "type": "signTransaction", "to": to })
        }
        ConfirmationRequestKind::SignNep413 { message_summary } => {
            serde_json::json!({ "type": "signNep413", "message": message_summary })
        }
        ConfirmationRequestKind::SignDelegate { delegate_summary } => {
            serde_json::json!({ "type": "signDelegate", "delegate": delegate_summary })
        }
    }
}

/// Random 32-byte challenge for local-only flows: keeps the authenticator
/// plumbing identical without anchoring anything to the chain.
fn local_random_challenge() -> WalletResult<Value> {
    use base64ct::{Base64UrlUnpadded, Encoding};
    let mut bytes = [0u8; 32];
    getrandom(&mut bytes)
        .map_err(|e| WalletError::internal(format!("failed to generate challenge: {}", e)))?;
    Ok(serde_json::json!({
        "vrfOutput": Base64UrlUnpadded::encode_string(&bytes),
        "local": true,
    }))
}

#[cfg(test)]
mod tests;
