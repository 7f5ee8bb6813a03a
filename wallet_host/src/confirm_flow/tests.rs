use super::*;
use crate::nonce_manager::TransactionContext;
use futures::executor::block_on;
use serde_json::json;
use std::cell::{Cell, RefCell};

// === MOCK COLLABORATORS ===

#[derive(Default)]
struct MockUi {
    decision: RefCell<Option<UiDecision>>,
    presented: Cell<bool>,
    closed: Cell<bool>,
    prompts: RefCell<Vec<UiPrompt>>,
}

impl MockUi {
    fn confirming_with_digest(digest: Option<String>) -> Self {
        let ui = MockUi::default();
        *ui.decision.borrow_mut() = Some(UiDecision {
            confirmed: true,
            intent_digest: digest,
        });
        ui
    }

    fn echoing() -> Self {
        // Returns whatever digest the prompt carried, like an honest UI
        MockUi::default()
    }
}

#[async_trait::async_trait(?Send)]
impl ConfirmationUi for MockUi {
    async fn present(&self, prompt: &UiPrompt) -> crate::errors::WalletResult<UiDecision> {
        self.presented.set(true);
        self.prompts.borrow_mut().push(prompt.clone());
        Ok(self.decision.borrow().clone().unwrap_or(UiDecision {
            confirmed: true,
            intent_digest: prompt.intent_digest.clone(),
        }))
    }

    fn close(&self) {
        self.closed.set(true);
    }
}

#[derive(Default)]
struct MockCredentials {
    creates: Cell<u32>,
    gets: Cell<u32>,
    invalid_state_until: Cell<u32>,
    always_not_allowed: Cell<bool>,
}

#[async_trait::async_trait(?Send)]
impl CredentialCollector for MockCredentials {
    async fn create_credential(
        &self,
        _account_id: &str,
        device_number: u8,
        _challenge_b64u: &str,
    ) -> Result<serde_json::Value, CredentialError> {
        let attempt = self.creates.get() + 1;
        self.creates.set(attempt);
        if attempt <= self.invalid_state_until.get() {
            return Err(CredentialError::InvalidState);
        }
        Ok(json!({ "id": "cred-id", "type": "public-key", "deviceNumber": device_number }))
    }

    async fn get_credential(
        &self,
        _account_id: &str,
        _challenge_b64u: &str,
    ) -> Result<serde_json::Value, CredentialError> {
        if self.always_not_allowed.get() {
            return Err(CredentialError::NotAllowed);
        }
        self.gets.set(self.gets.get() + 1);
        Ok(json!({ "id": "cred-id", "type": "public-key" }))
    }
}

#[derive(Default)]
struct MockVrf {
    challenges: Cell<u32>,
}

#[async_trait::async_trait(?Send)]
impl VrfChallenger for MockVrf {
    async fn generate_challenge(
        &self,
        account_id: &str,
        _rp_id: &str,
        block_height: &str,
        _block_hash: &str,
    ) -> crate::errors::WalletResult<serde_json::Value> {
        self.challenges.set(self.challenges.get() + 1);
        Ok(json!({
            "vrfOutput": format!("challenge-{}-{}", account_id, block_height),
            "blockHeight": block_height,
        }))
    }

    async fn bootstrap_challenge(
        &self,
        account_id: &str,
        _rp_id: &str,
        block_height: &str,
        _block_hash: &str,
    ) -> crate::errors::WalletResult<serde_json::Value> {
        Ok(json!({
            "vrfOutput": format!("bootstrap-{}-{}", account_id, block_height),
            "bootstrap": true,
        }))
    }
}

#[derive(Default)]
struct MockChain {
    reserved: RefCell<Vec<String>>,
    released: RefCell<Vec<String>>,
    context_fetches: Cell<u32>,
    forced_fetches: Cell<u32>,
    next_nonce: Cell<u64>,
}

impl MockChain {
    fn with_nonce(nonce: u64) -> Self {
        let chain = MockChain::default();
        chain.next_nonce.set(nonce);
        chain
    }
}

#[async_trait::async_trait(?Send)]
impl ChainContextSource for MockChain {
    async fn transaction_context(
        &self,
        force: bool,
    ) -> crate::errors::WalletResult<TransactionContext> {
        self.context_fetches.set(self.context_fetches.get() + 1);
        if force {
            self.forced_fetches.set(self.forced_fetches.get() + 1);
        }
        Ok(TransactionContext {
            near_public_key_str: "ed25519:pk".to_string(),
            access_key_nonce: (self.next_nonce.get() - 1).to_string(),
            next_nonce: self.next_nonce.get().to_string(),
            tx_block_height: format!("{}", 5000 + self.context_fetches.get()),
            tx_block_hash: bs58::encode([9u8; 32]).into_string(),
            last_nonce_update_ms: 0.0,
            last_block_height_update_ms: 0.0,
        })
    }

    fn reserve_nonces(&self, count: usize) -> crate::errors::WalletResult<Vec<String>> {
        let start = self.next_nonce.get();
        let nonces: Vec<String> = (start..start + count as u64).map(|n| n.to_string()).collect();
        self.next_nonce.set(start + count as u64);
        self.reserved.borrow_mut().extend(nonces.iter().cloned());
        Ok(nonces)
    }

    fn release_nonces(&self, nonces: &[String]) {
        self.released.borrow_mut().extend(nonces.iter().cloned());
    }
}

fn tx_requests() -> Vec<serde_json::Value> {
    vec![
        json!({ "receiverId": "bob.testnet", "actions": [{ "action_type": "Transfer", "deposit": "1" }] }),
        json!({ "receiverId": "carol.testnet", "actions": [{ "action_type": "Transfer", "deposit": "2" }] }),
        json!({ "receiverId": "dave.testnet", "actions": [{ "action_type": "Transfer", "deposit": "3" }] }),
    ]
}

fn signing_request(intent_digest: Option<String>) -> ConfirmationRequest {
    ConfirmationRequest {
        request_id: "req-1".to_string(),
        account_id: "alice.testnet".to_string(),
        rp_id: "wallet.example.com".to_string(),
        kind: ConfirmationRequestKind::SignTransactions {
            tx_signing_requests: tx_requests(),
        },
        intent_digest,
        confirmation_config: None,
    }
}

fn run(
    request: ConfirmationRequest,
    ui: &MockUi,
    credentials: &MockCredentials,
    vrf: &MockVrf,
    chain: &MockChain,
) -> (ConfirmationDecision, Vec<ConfirmPhase>) {
    let phases = RefCell::new(Vec::new());
    let record = |phase: ConfirmPhase| phases.borrow_mut().push(phase);
    let deps = ConfirmFlowDeps {
        ui,
        credentials,
        vrf,
        chain,
        env: RuntimeEnvironment::default(),
        on_phase: Some(&record),
    };
    let decision = block_on(run_confirm_flow(request, None, &deps));
    (decision, phases.into_inner())
}

// === TESTS ===

#[test]
fn signing_flow_follows_the_full_timeline() {
    let ui = MockUi::echoing();
    let credentials = MockCredentials::default();
    let vrf = MockVrf::default();
    let chain = MockChain::with_nonce(100);

    let (decision, phases) = run(signing_request(None), &ui, &credentials, &vrf, &chain);

    assert!(decision.confirmed, "error: {:?}", decision.error);
    assert_eq!(
        phases,
        vec![
            ConfirmPhase::Classifying,
            ConfirmPhase::Preparing,
            ConfirmPhase::AwaitingUi,
            ConfirmPhase::Refreshing,
            ConfirmPhase::CollectingCredential,
            ConfirmPhase::Responding,
            ConfirmPhase::Done,
        ]
    );

    // Three transactions reserve three contiguous nonces
    assert_eq!(
        decision.reserved_nonces,
        Some(vec!["100".to_string(), "101".to_string(), "102".to_string()])
    );
    assert!(chain.released.borrow().is_empty());

    // The JIT-refreshed context hands the signer the reservation start, not
    // the manager's next free nonce (which already moved past the block)
    assert_eq!(
        decision.transaction_context.as_ref().unwrap().next_nonce,
        "100"
    );

    // JIT refresh forced a second context fetch and a fresh challenge
    assert_eq!(chain.forced_fetches.get(), 1);
    assert_eq!(vrf.challenges.get(), 2);
    assert_eq!(credentials.gets.get(), 1);
    assert!(decision.credential.is_some());
    assert!(decision.intent_digest.is_some());
}

#[test]
fn drawer_and_modal_share_the_same_timeline() {
    let run_with_mode = |ui_mode: ConfirmationUiMode| {
        let ui = MockUi::echoing();
        let credentials = MockCredentials::default();
        let vrf = MockVrf::default();
        let chain = MockChain::with_nonce(100);
        let mut request = signing_request(None);
        request.confirmation_config = Some(ConfirmationConfig {
            ui_mode,
            behavior: ConfirmationBehavior::RequireClick,
            auto_proceed_delay: None,
            theme: None,
        });
        let (_, phases) = run(request, &ui, &credentials, &vrf, &chain);
        phases
    };

    assert_eq!(
        run_with_mode(ConfirmationUiMode::Modal),
        run_with_mode(ConfirmationUiMode::Drawer)
    );
}

#[test]
fn ui_digest_mismatch_aborts_before_credentials_and_releases_nonces() {
    let ui = MockUi::confirming_with_digest(Some("tampered-digest".to_string()));
    let credentials = MockCredentials::default();
    let vrf = MockVrf::default();
    let chain = MockChain::with_nonce(100);

    let (decision, phases) = run(signing_request(None), &ui, &credentials, &vrf, &chain);

    assert!(!decision.confirmed);
    assert_eq!(decision.error.as_deref(), Some(UI_DIGEST_MISMATCH));
    assert_eq!(*phases.last().unwrap(), ConfirmPhase::MismatchedIntent);

    // No create()/get() was invoked
    assert_eq!(credentials.gets.get(), 0);
    assert_eq!(credentials.creates.get(), 0);

    // Exactly the reserved nonces were released
    assert_eq!(*chain.released.borrow(), vec!["100", "101", "102"]);
    assert!(ui.closed.get());
}

#[test]
fn requester_digest_mismatch_aborts_before_ui() {
    let ui = MockUi::echoing();
    let credentials = MockCredentials::default();
    let vrf = MockVrf::default();
    let chain = MockChain::with_nonce(100);

    let (decision, _) = run(
        signing_request(Some("stale-requester-digest".to_string())),
        &ui,
        &credentials,
        &vrf,
        &chain,
    );

    assert!(!decision.confirmed);
    assert_eq!(decision.error.as_deref(), Some(UI_DIGEST_MISMATCH));
    assert!(!ui.presented.get());
    assert_eq!(credentials.gets.get(), 0);
}

#[test]
fn user_decline_releases_nonces() {
    let ui = MockUi::default();
    *ui.decision.borrow_mut() = Some(UiDecision {
        confirmed: false,
        intent_digest: None,
    });
    let credentials = MockCredentials::default();
    let vrf = MockVrf::default();
    let chain = MockChain::with_nonce(100);

    let (decision, phases) = run(signing_request(None), &ui, &credentials, &vrf, &chain);

    assert!(!decision.confirmed);
    assert_eq!(*phases.last().unwrap(), ConfirmPhase::Cancelled);
    assert_eq!(chain.released.borrow().len(), 3);
    assert_eq!(credentials.gets.get(), 0);
}

#[test]
fn decrypt_flow_skips_ui_but_still_collects_a_credential() {
    let ui = MockUi::echoing();
    let credentials = MockCredentials::default();
    let vrf = MockVrf::default();
    let chain = MockChain::with_nonce(100);

    let request = ConfirmationRequest {
        request_id: "req-decrypt".to_string(),
        account_id: "alice.testnet".to_string(),
        rp_id: "wallet.example.com".to_string(),
        kind: ConfirmationRequestKind::DecryptPrivateKey,
        intent_digest: None,
        // Even a loud override cannot force UI onto a decrypt flow
        confirmation_config: Some(ConfirmationConfig {
            ui_mode: ConfirmationUiMode::Modal,
            behavior: ConfirmationBehavior::RequireClick,
            auto_proceed_delay: None,
            theme: None,
        }),
    };

    let (decision, _) = run(request, &ui, &credentials, &vrf, &chain);

    assert!(decision.confirmed);
    assert!(!ui.presented.get(), "decrypt must suppress the UI");
    assert_eq!(credentials.gets.get(), 1);
    // Local-only: no chain fetches at all
    assert_eq!(chain.context_fetches.get(), 0);
}

#[test]
fn registration_retries_once_on_invalid_state_with_a_device_bump() {
    let ui = MockUi::echoing();
    let credentials = MockCredentials::default();
    credentials.invalid_state_until.set(1); // first create() conflicts
    let vrf = MockVrf::default();
    let chain = MockChain::with_nonce(100);

    let request = ConfirmationRequest {
        request_id: "req-reg".to_string(),
        account_id: "alice.testnet".to_string(),
        rp_id: "wallet.example.com".to_string(),
        kind: ConfirmationRequestKind::Registration { device_number: 1 },
        intent_digest: None,
        confirmation_config: None,
    };

    let (decision, _) = run(request, &ui, &credentials, &vrf, &chain);

    assert!(decision.confirmed, "error: {:?}", decision.error);
    assert_eq!(credentials.creates.get(), 2);
    assert_eq!(decision.device_number, Some(2));
}

#[test]
fn registration_conflict_after_retry_is_terminal() {
    let ui = MockUi::echoing();
    let credentials = MockCredentials::default();
    credentials.invalid_state_until.set(2); // both attempts conflict
    let vrf = MockVrf::default();
    let chain = MockChain::with_nonce(100);

    let request = ConfirmationRequest {
        request_id: "req-reg2".to_string(),
        account_id: "alice.testnet".to_string(),
        rp_id: "wallet.example.com".to_string(),
        kind: ConfirmationRequestKind::Registration { device_number: 1 },
        intent_digest: None,
        confirmation_config: None,
    };

    let (decision, _) = run(request, &ui, &credentials, &vrf, &chain);

    assert!(!decision.confirmed);
    assert_eq!(credentials.creates.get(), 2);
    assert!(decision.error.unwrap().contains("conflict"));
}

#[test]
fn authenticator_cancellation_surfaces_as_not_authorized() {
    let ui = MockUi::echoing();
    let credentials = MockCredentials::default();
    credentials.always_not_allowed.set(true);
    let vrf = MockVrf::default();
    let chain = MockChain::with_nonce(100);

    let (decision, phases) = run(signing_request(None), &ui, &credentials, &vrf, &chain);

    assert!(!decision.confirmed);
    assert!(decision.error.unwrap().starts_with("not_authorized"));
    assert_eq!(*phases.last().unwrap(), ConfirmPhase::Cancelled);
    // Cancellation released the batch reservations
    assert_eq!(chain.released.borrow().len(), 3);
}
