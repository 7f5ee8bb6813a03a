//! Typed request/response layer between the parent application and the
//! isolated wallet document.
//!
//! Bootstrap: the parent posts CONNECT with one port of a fresh
//! MessageChannel; the wallet replies READY { protocolVersion } on that port
//! and all subsequent traffic is port-only. Every request carries a
//! requestId and a timeout; PROGRESS events may stream before the terminal
//! PM_RESULT / ERROR. Sticky flows keep the overlay mounted until
//! WALLET_UI_CLOSED. The router core is pure state-machine logic; the
//! MessagePort glue is wasm-gated in `lib.rs`.

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::config::{DEFAULT_REQUEST_TIMEOUT_MS, WALLET_PROTOCOL_VERSION};
use crate::errors::{ErrorPayload, WalletError, WalletResult};
use crate::sanitize::sanitize_boundary_value;

// === MESSAGE TYPES ===

pub const MSG_CONNECT: &str = "CONNECT";
pub const MSG_READY: &str = "READY";
pub const MSG_PROGRESS: &str = "PROGRESS";
pub const MSG_RESULT: &str = "PM_RESULT";
pub const MSG_ERROR: &str = "ERROR";
pub const MSG_CANCEL: &str = "PM_CANCEL";
pub const MSG_UI_CLOSED: &str = "WALLET_UI_CLOSED";
pub const MSG_WEBAUTHN_FALLBACK_REQUEST: &str = "WEBAUTHN_FALLBACK_REQUEST";
pub const MSG_WEBAUTHN_FALLBACK_RESPONSE: &str = "WEBAUTHN_FALLBACK_RESPONSE";

/// Request types whose overlay must survive the terminal response
/// (the viewer stays open until the user dismisses it).
const STICKY_REQUEST_TYPES: [&str; 1] = ["exportPrivateKey"];

/// Request types that mount UI at all.
const UI_REQUEST_TYPES: [&str; 5] = [
    "signTransactionsWithActions",
    "signDelegateAction",
    "registerPasskey",
    "linkDevice",
    "exportPrivateKey",
];

// === ENVELOPES ===

/// Inbound `{ type, requestId?, payload?, options? }`. Unknown fields are
/// rejected at the boundary rather than ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct WalletRequestEnvelope {
    #[serde(rename = "type")]
    pub msg_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<RequestOptions>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct RequestOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<f64>,
}

/// Outbound messages to the parent, all plain data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum OutboundMessage {
    #[serde(rename = "READY")]
    Ready { protocol_version: u32 },
    #[serde(rename = "PROGRESS")]
    Progress { request_id: String, payload: Value },
    #[serde(rename = "PM_RESULT")]
    Result { request_id: String, payload: Value },
    #[serde(rename = "ERROR")]
    Error {
        request_id: String,
        error: ErrorPayload,
    },
    #[serde(rename = "WEBAUTHN_FALLBACK_REQUEST")]
    WebAuthnFallbackRequest {
        request_id: String,
        /// "create" | "get"
        purpose: String,
        public_key_options: Value,
    },
}

/// What the host must do when a request is cancelled or times out.
#[derive(Debug, Clone, PartialEq)]
pub struct CancelDirectives {
    pub found: bool,
    pub release_nonces: bool,
    pub terminate_session: bool,
    pub close_ui: bool,
    pub post_ui_closed: bool,
}

struct PendingRequest {
    msg_type: String,
    sticky: bool,
    deadline_ms: f64,
}

// === ROUTER CORE ===

pub struct RouterCore {
    connected: bool,
    pending: HashMap<String, PendingRequest>,
    overlay_visible: bool,
}

impl RouterCore {
    pub fn new() -> Self {
        Self {
            connected: false,
            pending: HashMap::new(),
            overlay_visible: false,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn overlay_visible(&self) -> bool {
        self.overlay_visible
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// CONNECT handshake: reply READY with the protocol version.
    pub fn handle_connect(&mut self) -> OutboundMessage {
        self.connected = true;
        debug!("router: connected, protocol v{}", WALLET_PROTOCOL_VERSION);
        OutboundMessage::Ready {
            protocol_version: WALLET_PROTOCOL_VERSION,
        }
    }

    /// Parse and admit an inbound request envelope.
    pub fn register_request(
        &mut self,
        envelope: Value,
        now_ms: f64,
    ) -> WalletResult<WalletRequestEnvelope> {
        let envelope: WalletRequestEnvelope = serde_json::from_value(envelope)
            .map_err(|e| WalletError::invalid_input(format!("invalid envelope: {}", e)))?;

        if envelope.msg_type == MSG_CONNECT {
            return Ok(envelope);
        }
        if !self.connected {
            return Err(WalletError::invalid_input(
                "request received before CONNECT handshake",
            ));
        }

        let request_id = envelope
            .request_id
            .clone()
            .ok_or_else(|| WalletError::invalid_input("request is missing requestId"))?;
        if self.pending.contains_key(&request_id) {
            return Err(WalletError::invalid_input(format!(
                "duplicate requestId {}",
                request_id
            )));
        }

        let timeout_ms = envelope
            .options
            .as_ref()
            .and_then(|o| o.timeout_ms)
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT_MS);
        let sticky = STICKY_REQUEST_TYPES.contains(&envelope.msg_type.as_str());
        if UI_REQUEST_TYPES.contains(&envelope.msg_type.as_str()) {
            self.overlay_visible = true;
        }

        self.pending.insert(
            request_id,
            PendingRequest {
                msg_type: envelope.msg_type.clone(),
                sticky,
                deadline_ms: now_ms + timeout_ms,
            },
        );

        Ok(envelope)
    }

    /// Stream a progress event for an in-flight request.
    pub fn progress(&self, request_id: &str, payload: Value) -> Option<OutboundMessage> {
        if !self.pending.contains_key(request_id) {
            return None;
        }
        Some(OutboundMessage::Progress {
            request_id: request_id.to_string(),
            payload,
        })
    }

    /// Terminal success. The payload is sanitized for structured-clone
    /// transport; sticky overlays stay mounted until WALLET_UI_CLOSED.
    pub fn complete(&mut self, request_id: &str, payload: Value) -> WalletResult<OutboundMessage> {
        let pending = self
            .pending
            .remove(request_id)
            .ok_or_else(|| WalletError::internal(format!("no pending request {}", request_id)))?;

        if !pending.sticky {
            self.overlay_visible = self.has_ui_pending();
        }

        let sanitized = sanitize_boundary_value(payload)?;
        Ok(OutboundMessage::Result {
            request_id: request_id.to_string(),
            payload: sanitized,
        })
    }

    /// Terminal failure; the error is stripped to `{ code, message }`.
    pub fn fail(&mut self, request_id: &str, error: &WalletError) -> OutboundMessage {
        if let Some(pending) = self.pending.remove(request_id) {
            if !pending.sticky {
                self.overlay_visible = self.has_ui_pending();
            }
        }
        OutboundMessage::Error {
            request_id: request_id.to_string(),
            error: error.to_boundary_payload(),
        }
    }

    /// PM_CANCEL by requestId, legal at any time. Cancellation must release
    /// reserved nonces, destroy the in-flight signer session, and close any
    /// UI (sticky flows additionally post WALLET_UI_CLOSED).
    pub fn cancel(&mut self, request_id: &str) -> CancelDirectives {
        match self.pending.remove(request_id) {
            Some(pending) => {
                self.overlay_visible = self.has_ui_pending();
                CancelDirectives {
                    found: true,
                    release_nonces: true,
                    terminate_session: true,
                    close_ui: true,
                    post_ui_closed: pending.sticky,
                }
            }
            None => CancelDirectives {
                found: false,
                release_nonces: false,
                terminate_session: false,
                close_ui: false,
                post_ui_closed: false,
            },
        }
    }

    /// Collect requests whose deadline has passed. The caller runs the same
    /// cancellation duties as for PM_CANCEL, then sends the Error.
    pub fn expire(&mut self, now_ms: f64) -> Vec<(String, OutboundMessage)> {
        let expired: Vec<String> = self
            .pending
            .iter()
            .filter(|(_, p)| now_ms >= p.deadline_ms)
            .map(|(id, _)| id.clone())
            .collect();

        expired
            .into_iter()
            .map(|id| {
                let pending = self.pending.remove(&id).expect("collected above");
                warn!("router: request {} ({}) timed out", id, pending.msg_type);
                self.overlay_visible = self.has_ui_pending();
                let error =
                    WalletError::timeout(format!("request {} exceeded its budget", pending.msg_type));
                (
                    id.clone(),
                    OutboundMessage::Error {
                        request_id: id,
                        error: error.to_boundary_payload(),
                    },
                )
            })
            .collect()
    }

    /// WALLET_UI_CLOSED: the only way a sticky overlay comes down.
    pub fn handle_ui_closed(&mut self) {
        self.overlay_visible = false;
    }

    fn has_ui_pending(&self) -> bool {
        self.pending
            .values()
            .any(|p| UI_REQUEST_TYPES.contains(&p.msg_type.as_str()))
    }

    // === SAFARI CROSS-ORIGIN WEBAUTHN FALLBACK ===

    /// When the wallet origin cannot execute navigator.credentials.*, ask the
    /// parent to run the ceremony at the top level and return serialized
    /// results.
    pub fn build_webauthn_fallback_request(
        &self,
        request_id: &str,
        purpose: &str,
        public_key_options: Value,
    ) -> WalletResult<OutboundMessage> {
        if purpose != "create" && purpose != "get" {
            return Err(WalletError::invalid_input(format!(
                "invalid fallback purpose: {}",
                purpose
            )));
        }
        Ok(OutboundMessage::WebAuthnFallbackRequest {
            request_id: request_id.to_string(),
            purpose: purpose.to_string(),
            public_key_options,
        })
    }

    /// Validate a fallback response: it must come from the expected parent
    /// origin and reference a known request.
    pub fn accept_webauthn_fallback_response(
        &self,
        request_id: &str,
        sender_origin: &str,
        expected_parent_origin: &str,
        credential: Value,
    ) -> WalletResult<Value> {
        if sender_origin != expected_parent_origin {
            return Err(WalletError::invalid_input(format!(
                "fallback response from unexpected origin {}",
                sender_origin
            )));
        }
        if !self.pending.contains_key(request_id) {
            return Err(WalletError::invalid_input(format!(
                "fallback response for unknown request {}",
                request_id
            )));
        }
        // The serialized credential crosses back into the wallet document;
        // no PRF bytes may remain in the parent-visible form
        sanitize_boundary_value(credential)
    }
}

impl Default for RouterCore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn connected_router() -> RouterCore {
        let mut router = RouterCore::new();
        let ready = router.handle_connect();
        assert_eq!(
            ready,
            OutboundMessage::Ready {
                protocol_version: WALLET_PROTOCOL_VERSION
            }
        );
        router
    }

    fn sign_envelope(request_id: &str) -> Value {
        json!({
            "type": "signTransactionsWithActions",
            "requestId": request_id,
            "payload": { "txSigningRequests": [] },
        })
    }

    #[test]
    fn requests_before_connect_are_rejected() {
        let mut router = RouterCore::new();
        let result = router.register_request(sign_envelope("req-1"), 0.0);
        assert!(matches!(result, Err(WalletError::InvalidInput(_))));
    }

    #[test]
    fn unknown_envelope_fields_are_rejected() {
        let mut router = connected_router();
        let envelope = json!({
            "type": "signTransactionsWithActions",
            "requestId": "req-1",
            "payload": {},
            "extraField": true,
        });
        let result = router.register_request(envelope, 0.0);
        assert!(matches!(result, Err(WalletError::InvalidInput(_))));
    }

    #[test]
    fn duplicate_request_ids_are_rejected() {
        let mut router = connected_router();
        router.register_request(sign_envelope("req-1"), 0.0).unwrap();
        let result = router.register_request(sign_envelope("req-1"), 0.0);
        assert!(matches!(result, Err(WalletError::InvalidInput(_))));
    }

    #[test]
    fn complete_sends_result_and_hides_overlay() {
        let mut router = connected_router();
        router.register_request(sign_envelope("req-1"), 0.0).unwrap();
        assert!(router.overlay_visible());

        let message = router
            .complete("req-1", json!({ "success": true }))
            .unwrap();
        assert!(matches!(message, OutboundMessage::Result { .. }));
        assert!(!router.overlay_visible());
        assert_eq!(router.pending_count(), 0);
    }

    #[test]
    fn sticky_flow_keeps_overlay_until_ui_closed() {
        let mut router = connected_router();
        router
            .register_request(
                json!({ "type": "exportPrivateKey", "requestId": "req-exp" }),
                0.0,
            )
            .unwrap();
        assert!(router.overlay_visible());

        router
            .complete("req-exp", json!({ "mounted": true }))
            .unwrap();
        // Terminal response arrived, but the viewer stays up
        assert!(router.overlay_visible());

        router.handle_ui_closed();
        assert!(!router.overlay_visible());
    }

    #[test]
    fn progress_streams_only_for_pending_requests() {
        let mut router = connected_router();
        router.register_request(sign_envelope("req-1"), 0.0).unwrap();

        assert!(router.progress("req-1", json!({ "step": 1 })).is_some());
        assert!(router.progress("req-unknown", json!({})).is_none());

        router.complete("req-1", json!({})).unwrap();
        assert!(router.progress("req-1", json!({ "step": 2 })).is_none());
    }

    #[test]
    fn cancel_directs_nonce_release_and_session_teardown() {
        let mut router = connected_router();
        router.register_request(sign_envelope("req-1"), 0.0).unwrap();

        let directives = router.cancel("req-1");
        assert!(directives.found);
        assert!(directives.release_nonces);
        assert!(directives.terminate_session);
        assert!(directives.close_ui);
        assert!(!directives.post_ui_closed);

        // Cancelling again is a no-op
        let again = router.cancel("req-1");
        assert!(!again.found);
        assert!(!again.release_nonces);
    }

    #[test]
    fn cancelling_sticky_flow_posts_ui_closed() {
        let mut router = connected_router();
        router
            .register_request(
                json!({ "type": "exportPrivateKey", "requestId": "req-exp" }),
                0.0,
            )
            .unwrap();
        let directives = router.cancel("req-exp");
        assert!(directives.post_ui_closed);
    }

    #[test]
    fn requests_expire_at_their_deadline() {
        let mut router = connected_router();
        let envelope = json!({
            "type": "signTransactionsWithActions",
            "requestId": "req-slow",
            "options": { "timeoutMs": 1000.0 },
        });
        router.register_request(envelope, 0.0).unwrap();

        assert!(router.expire(999.0).is_empty());
        let expired = router.expire(1000.0);
        assert_eq!(expired.len(), 1);
        match &expired[0].1 {
            OutboundMessage::Error { request_id, error } => {
                assert_eq!(request_id, "req-slow");
                assert_eq!(error.code, "timeout");
            }
            other => panic!("expected Error, got {:?}", other),
        }
        assert_eq!(router.pending_count(), 0);
    }

    #[test]
    fn fallback_response_origin_is_validated() {
        let mut router = connected_router();
        router.register_request(sign_envelope("req-1"), 0.0).unwrap();

        let accepted = router.accept_webauthn_fallback_response(
            "req-1",
            "https://app.example.com",
            "https://app.example.com",
            json!({ "id": "cred", "type": "public-key" }),
        );
        assert!(accepted.is_ok());

        let rejected = router.accept_webauthn_fallback_response(
            "req-1",
            "https://evil.example.com",
            "https://app.example.com",
            json!({ "id": "cred", "type": "public-key" }),
        );
        assert!(matches!(rejected, Err(WalletError::InvalidInput(_))));

        let unknown = router.accept_webauthn_fallback_response(
            "req-ghost",
            "https://app.example.com",
            "https://app.example.com",
            json!({}),
        );
        assert!(matches!(unknown, Err(WalletError::InvalidInput(_))));
    }

    #[test]
    fn fallback_request_purpose_is_validated() {
        let router = connected_router();
        assert!(router
            .build_webauthn_fallback_request("req-1", "get", json!({}))
            .is_ok());
        assert!(router
            .build_webauthn_fallback_request("req-1", "sign", json!({}))
            .is_err());
    }

    #[test]
    fn fallback_response_strips_prf_bytes() {
        let mut router = connected_router();
        router.register_request(sign_envelope("req-1"), 0.0).unwrap();

        let accepted = router
            .accept_webauthn_fallback_response(
                "req-1",
                "https://app.example.com",
                "https://app.example.com",
                json!({
                    "id": "cred",
                    "type": "public-key",
                    "clientExtensionResults": { "prf": { "results": { "first": "c2VjcmV0" } } },
                }),
            )
            .unwrap();

        assert!(accepted.get("clientExtensionResults").is_some());
        let serialized = accepted.to_string();
        assert!(!serialized.contains("c2VjcmV0"));
    }
}
