//! Progress message types shared (by numeric code) with the wallet host.
//!
//! Progress messages stream during long operations and never affect the
//! final result; exactly one result message completes each request.

use serde::{Deserialize, Serialize};
use wasm_bindgen::prelude::*;

/// Progress message types emitted during signer operations. Values sit above
/// the success codes of WorkerResponseType so the host can tell progress from
/// terminal responses by number alone.
#[wasm_bindgen]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProgressMessageType {
    RegistrationProgress = 18,
    RegistrationComplete = 19,
    ExecuteActionsProgress = 20,
    ExecuteActionsComplete = 21,
}

impl TryFrom<u32> for ProgressMessageType {
    type Error = String;

    fn try_from(value: u32) -> Result<Self, <Self as TryFrom<u32>>::Error> {
        match value {
            18 => Ok(ProgressMessageType::RegistrationProgress),
            19 => Ok(ProgressMessageType::RegistrationComplete),
            20 => Ok(ProgressMessageType::ExecuteActionsProgress),
            21 => Ok(ProgressMessageType::ExecuteActionsComplete),
            _ => Err(format!("Invalid ProgressMessageType value: {}", value)),
        }
    }
}

/// Progress step identifiers; values start at 100 to avoid colliding with
/// WorkerResponseType codes.
#[wasm_bindgen]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProgressStep {
    Preparation = 100,
    UserConfirmation = 101,
    WebauthnAuthentication = 102,
    AuthenticationComplete = 103,
    TransactionSigningProgress = 104,
    TransactionSigningComplete = 105,
    Error = 106,
}

impl TryFrom<u32> for ProgressStep {
    type Error = String;

    fn try_from(value: u32) -> Result<Self, <Self as TryFrom<u32>>::Error> {
        match value {
            100 => Ok(ProgressStep::Preparation),
            101 => Ok(ProgressStep::UserConfirmation),
            102 => Ok(ProgressStep::WebauthnAuthentication),
            103 => Ok(ProgressStep::AuthenticationComplete),
            104 => Ok(ProgressStep::TransactionSigningProgress),
            105 => Ok(ProgressStep::TransactionSigningComplete),
            106 => Ok(ProgressStep::Error),
            _ => Err(format!("Invalid ProgressStep value: {}", value)),
        }
    }
}

/// Type-safe helper for sending progress messages from handlers
pub fn send_progress_message<T: Serialize + ?Sized>(
    msg_type: ProgressMessageType,
    step: ProgressStep,
    log: &str,
    data: Option<&T>,
) {
    let data_js = if let Some(_d) = data {
        #[cfg(target_arch = "wasm32")]
        {
            serde_wasm_bindgen::to_value(_d).unwrap_or(JsValue::UNDEFINED)
        }
        #[cfg(not(target_arch = "wasm32"))]
        {
            JsValue::UNDEFINED
        }
    } else {
        JsValue::UNDEFINED
    };

    crate::send_progress_message(msg_type as u32, step as u32, log, data_js);
}

/// Type-safe helper for sending completion messages from handlers
pub fn send_completion_message<T: Serialize + ?Sized>(
    msg_type: ProgressMessageType,
    step: ProgressStep,
    log: &str,
    data: Option<&T>,
) {
    send_progress_message(msg_type, step, log, data);
}

pub fn progress_message_type_name(message_type: ProgressMessageType) -> &'static str {
    match message_type {
        ProgressMessageType::RegistrationProgress => "REGISTRATION_PROGRESS",
        ProgressMessageType::RegistrationComplete => "REGISTRATION_COMPLETE",
        ProgressMessageType::ExecuteActionsProgress => "EXECUTE_ACTIONS_PROGRESS",
        ProgressMessageType::ExecuteActionsComplete => "EXECUTE_ACTIONS_COMPLETE",
    }
}

pub fn progress_step_name(step: ProgressStep) -> &'static str {
    match step {
        ProgressStep::Preparation => "preparation",
        ProgressStep::UserConfirmation => "user-confirmation",
        ProgressStep::WebauthnAuthentication => "webauthn-authentication",
        ProgressStep::AuthenticationComplete => "authentication-complete",
        ProgressStep::TransactionSigningProgress => "transaction-signing-progress",
        ProgressStep::TransactionSigningComplete => "transaction-signing-complete",
        ProgressStep::Error => "error",
    }
}

/// Structured data payload for progress messages
#[derive(Debug, Clone, Serialize)]
pub struct ProgressData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_count: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub logs: Option<Vec<String>>,
}

impl ProgressData {
    pub fn new(step: u32, total: u32) -> Self {
        Self {
            step: Some(step),
            total: Some(total),
            transaction_count: None,
            success: None,
            logs: None,
        }
    }

    pub fn with_transaction_count(mut self, count: usize) -> Self {
        self.transaction_count = Some(count);
        self
    }

    pub fn with_success(mut self, success: bool) -> Self {
        self.success = Some(success);
        self
    }

    pub fn with_logs(mut self, logs: Vec<String>) -> Self {
        self.logs = Some(logs);
        self
    }
}
