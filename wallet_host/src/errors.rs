use serde::{Deserialize, Serialize};
use std::fmt;

/// Wallet host error taxonomy. Every failure that reaches the parent
/// boundary is one of these kinds, serialized as `{ code, message, details? }`
/// with sensitive detail stripped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WalletError {
    /// Account ids, addresses, or envelope fields failed validation
    InvalidInput(String),
    /// User cancellation or NotAllowedError at the authenticator
    NotAuthorized(String),
    /// Network, RPC, or relay unreachable
    Unavailable(String),
    /// InvalidStateError during credential creation; unknown relay keyId
    Conflict(String),
    /// Digest mismatch between UI and requester; Shamir keyId unknown to all keys
    ProtocolMismatch(String),
    /// Worker, UI, or network exceeded its budget
    Timeout(String),
    /// AEAD failure, VRF proof failure, on-chain verification failure.
    /// Always fatal to the operation; never recovered locally.
    Integrity(String),
    /// Invariant violations (e.g. a PRF field in a signer payload)
    Internal(String),
}

impl WalletError {
    pub fn code(&self) -> &'static str {
        match self {
            WalletError::InvalidInput(_) => "invalid_input",
            WalletError::NotAuthorized(_) => "not_authorized",
            WalletError::Unavailable(_) => "unavailable",
            WalletError::Conflict(_) => "conflict",
            WalletError::ProtocolMismatch(_) => "protocol_mismatch",
            WalletError::Timeout(_) => "timeout",
            WalletError::Integrity(_) => "integrity",
            WalletError::Internal(_) => "internal",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            WalletError::InvalidInput(m)
            | WalletError::NotAuthorized(m)
            | WalletError::Unavailable(m)
            | WalletError::Conflict(m)
            | WalletError::ProtocolMismatch(m)
            | WalletError::Timeout(m)
            | WalletError::Integrity(m)
            | WalletError::Internal(m) => m,
        }
    }

    /// Boundary form: code + message only. Internal detail is dropped here,
    /// not at the call sites, so nothing sensitive leaks by omission.
    pub fn to_boundary_payload(&self) -> ErrorPayload {
        ErrorPayload {
            code: self.code().to_string(),
            message: crate::sanitize::scrub_secret_fields(self.message()),
            details: None,
        }
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        WalletError::InvalidInput(msg.into())
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        WalletError::Unavailable(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        WalletError::Timeout(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        WalletError::Internal(msg.into())
    }
}

impl fmt::Display for WalletError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code(), self.message())
    }
}

impl std::error::Error for WalletError {}

/// `{ code, message, details? }` as sent across the parent boundary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

pub type WalletResult<T> = Result<T, WalletError>;
