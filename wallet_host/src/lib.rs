//! Wallet host: the outer layers of the passkey wallet core.
//!
//! Owns the confirmation state machine, the wallet-iframe router, the nonce
//! manager, the signer worker pool, and the persistent stores. All state
//! hangs off one `WalletHost` context with explicit init/teardown; on wasm a
//! thread-local holds the context and the exported functions operate on it.

use log::debug;
use std::cell::RefCell;
use std::rc::Rc;
use wasm_bindgen::prelude::*;

pub mod config;
pub mod confirm_flow;
pub mod errors;
mod logger;
pub mod nonce_manager;
pub mod router;
pub mod rpc;
pub mod sanitize;
pub mod session;
pub mod stores;

pub use confirm_flow::{
    run_confirm_flow, ConfirmFlowDeps, ConfirmPhase, ConfirmationDecision, ConfirmationRequest,
    ConfirmationRequestKind,
};
pub use errors::{ErrorPayload, WalletError, WalletResult};
pub use nonce_manager::{NonceManager, TransactionContext};
pub use router::{CancelDirectives, OutboundMessage, RouterCore, WalletRequestEnvelope};
pub use session::{SessionRegistry, TerminatedSession, WorkerPool};
pub use stores::{
    MemoryBackend, PasskeyClientDb, PasskeyNearKeysDb, Preferences, StorageBackend,
};

/// Process-wide host state, created by `init` and dropped by `teardown`.
/// Subsystems receive it by reference; nothing else is a singleton.
pub struct WalletHost {
    pub nonce_manager: Rc<RefCell<NonceManager>>,
    pub router: RefCell<RouterCore>,
    pub sessions: RefCell<SessionRegistry>,
    pub client_db: RefCell<PasskeyClientDb<MemoryBackend>>,
    pub near_keys_db: RefCell<PasskeyNearKeysDb<MemoryBackend>>,
}

impl WalletHost {
    pub fn init() -> Self {
        debug!("wallet host: init");
        Self {
            nonce_manager: Rc::new(RefCell::new(NonceManager::new())),
            router: RefCell::new(RouterCore::new()),
            sessions: RefCell::new(SessionRegistry::new()),
            client_db: RefCell::new(PasskeyClientDb::open(MemoryBackend::new())),
            near_keys_db: RefCell::new(PasskeyNearKeysDb::open(MemoryBackend::new())),
        }
    }

    /// Tear down: drop pending requests, sessions, and cached chain state.
    /// The stores keep their persisted records; only process state goes away.
    pub fn teardown(&self) {
        debug!("wallet host: teardown");
        *self.sessions.borrow_mut() = SessionRegistry::new();
        *self.router.borrow_mut() = RouterCore::new();
        *self.nonce_manager.borrow_mut() = NonceManager::new();
    }

    /// Run the standing housekeeping tick: expire timed-out requests and
    /// over-age signing sessions. Returns (expired request messages,
    /// terminated sessions).
    pub fn housekeeping(
        &self,
        now_ms: f64,
    ) -> (Vec<(String, OutboundMessage)>, Vec<TerminatedSession>) {
        let expired_requests = self.router.borrow_mut().expire(now_ms);
        let expired_sessions = self.sessions.borrow_mut().expire_sessions(now_ms);
        (expired_requests, expired_sessions)
    }
}

// === WASM EXPORTS ===
// The JS shim owns DOM/worker wiring; these entry points operate on the
// thread-local host context.

thread_local! {
    static WALLET_HOST: RefCell<Option<Rc<WalletHost>>> = const { RefCell::new(None) };
}

fn with_host<T>(f: impl FnOnce(&WalletHost) -> Result<T, JsValue>) -> Result<T, JsValue> {
    WALLET_HOST.with(|host| {
        let host = host.borrow();
        let host = host
            .as_ref()
            .ok_or_else(|| JsValue::from_str("wallet host is not initialized"))?;
        f(host)
    })
}

#[wasm_bindgen(start)]
pub fn main() {
    logger::init(config::CURRENT_LOG_LEVEL);
}

#[wasm_bindgen]
pub fn init_wallet_host() {
    WALLET_HOST.with(|host| {
        *host.borrow_mut() = Some(Rc::new(WalletHost::init()));
    });
}

#[wasm_bindgen]
pub fn teardown_wallet_host() {
    WALLET_HOST.with(|host| {
        if let Some(existing) = host.borrow_mut().take() {
            existing.teardown();
        }
    });
}

/// CONNECT handshake; returns the READY message for the transferred port.
#[wasm_bindgen]
pub fn host_connect() -> Result<JsValue, JsValue> {
    with_host(|host| {
        let ready = host.router.borrow_mut().handle_connect();
        serde_wasm_bindgen::to_value(&ready).map_err(|e| JsValue::from_str(&e.to_string()))
    })
}

/// Admit an inbound request envelope; returns the parsed envelope or throws
/// on validation failure.
#[wasm_bindgen]
pub fn host_register_request(envelope: JsValue) -> Result<JsValue, JsValue> {
    with_host(|host| {
        let envelope: serde_json::Value = serde_wasm_bindgen::from_value(envelope)
            .map_err(|e| JsValue::from_str(&format!("invalid envelope: {}", e)))?;
        let admitted = host
            .router
            .borrow_mut()
            .register_request(envelope, config::now_ms())
            .map_err(|e| JsValue::from_str(&e.to_string()))?;
        serde_wasm_bindgen::to_value(&admitted).map_err(|e| JsValue::from_str(&e.to_string()))
    })
}

/// Terminal success for a request; returns the sanitized PM_RESULT message.
#[wasm_bindgen]
pub fn host_complete_request(request_id: String, payload: JsValue) -> Result<JsValue, JsValue> {
    with_host(|host| {
        let payload: serde_json::Value = serde_wasm_bindgen::from_value(payload)
            .map_err(|e| JsValue::from_str(&format!("invalid payload: {}", e)))?;
        let message = host
            .router
            .borrow_mut()
            .complete(&request_id, payload)
            .map_err(|e| JsValue::from_str(&e.to_string()))?;
        serde_wasm_bindgen::to_value(&message).map_err(|e| JsValue::from_str(&e.to_string()))
    })
}

/// PM_CANCEL: release reserved nonces, destroy the signer session, close UI.
#[wasm_bindgen]
pub fn host_cancel_request(request_id: String) -> Result<JsValue, JsValue> {
    with_host(|host| {
        let directives = host.router.borrow_mut().cancel(&request_id);
        if directives.release_nonces {
            host.nonce_manager.borrow_mut().release_all_nonces();
        }
        if directives.terminate_session {
            host.sessions.borrow_mut().end_session(&request_id);
        }
        serde_wasm_bindgen::to_value(&serde_json::json!({
            "found": directives.found,
            "closeUi": directives.close_ui,
            "postUiClosed": directives.post_ui_closed,
        }))
        .map_err(|e| JsValue::from_str(&e.to_string()))
    })
}

#[wasm_bindgen]
pub fn host_ui_closed() -> Result<(), JsValue> {
    with_host(|host| {
        host.router.borrow_mut().handle_ui_closed();
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_builds_an_isolated_context() {
        let host = WalletHost::init();
        assert!(!host.router.borrow().is_connected());
        assert_eq!(host.sessions.borrow().active_count(), 0);
    }

    #[test]
    fn housekeeping_expires_requests_and_sessions() {
        let host = WalletHost::init();
        host.router.borrow_mut().handle_connect();
        host.router
            .borrow_mut()
            .register_request(
                serde_json::json!({
                    "type": "signTransactionsWithActions",
                    "requestId": "req-1",
                    "options": { "timeoutMs": 10.0 },
                }),
                0.0,
            )
            .unwrap();
        host.sessions.borrow_mut().begin_session("sess-1", 0.0).unwrap();

        let (expired_requests, expired_sessions) =
            host.housekeeping(config::SIGNING_SESSION_TIMEOUT_MS + 1.0);

        assert_eq!(expired_requests.len(), 1);
        assert_eq!(expired_sessions.len(), 1);
        assert_eq!(host.sessions.borrow().active_count(), 0);
    }
}
