//! NEAR JSON-RPC access for the host: the nonce manager and broadcast paths
//! consume this seam. Tests drive the host with in-memory providers.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{WalletError, WalletResult};

/// view_access_key result: the on-chain nonce plus the block it was read at.
/// Both pre-final and final states are accepted by consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessKeyView {
    pub nonce: u64,
    pub permission: Value,
    pub block_height: u64,
    pub block_hash: String,
}

/// view_block (finality: final) header
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockInfo {
    pub height: u64,
    pub hash: String,
}

/// view_access_key failure split: a key that does not exist (yet) is an
/// expected state right after account creation and is tolerated by callers.
#[derive(Debug, Clone, PartialEq)]
pub enum AccessKeyQueryError {
    DoesNotExist,
    Rpc(String),
}

impl From<AccessKeyQueryError> for WalletError {
    fn from(err: AccessKeyQueryError) -> Self {
        match err {
            AccessKeyQueryError::DoesNotExist => {
                WalletError::Conflict("access key does not exist".to_string())
            }
            AccessKeyQueryError::Rpc(msg) => WalletError::Unavailable(msg),
        }
    }
}

// === RELAY SERVER CONTRACT ===

/// POST /create_account_and_register_user request body. `vrf_data` and the
/// WebAuthn registration are opaque blobs assembled by the VRF worker; the
/// host never inspects them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAccountAndRegisterRequest {
    pub new_account_id: String,
    pub new_public_key: String,
    pub device_number: u8,
    pub vrf_data: Value,
    pub webauthn_registration: Value,
    pub deterministic_vrf_public_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authenticator_options: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAccountAndRegisterResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Session verification request: the relay mints a JWT or cookie-backed
/// session after verifying the VRF challenge + authentication credential.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifySessionRequest {
    /// "jwt" | "cookie"
    #[serde(rename = "sessionKind")]
    pub session_kind: String,
    pub vrf_data: Value,
    pub webauthn_authentication: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifySessionResponse {
    pub verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jwt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_credential: Option<Value>,
}

/// The relay server, as the host consumes it. HTTP wiring lives with the
/// embedder; tests use in-memory implementations.
#[async_trait(?Send)]
pub trait RelayServerClient {
    async fn create_account_and_register_user(
        &self,
        request: &CreateAccountAndRegisterRequest,
    ) -> WalletResult<CreateAccountAndRegisterResponse>;

    async fn verify_session(
        &self,
        request: &VerifySessionRequest,
    ) -> WalletResult<VerifySessionResponse>;
}

#[async_trait(?Send)]
pub trait NearRpcProvider {
    async fn view_access_key(
        &self,
        account_id: &str,
        public_key: &str,
    ) -> Result<AccessKeyView, AccessKeyQueryError>;

    async fn view_final_block(&self) -> WalletResult<BlockInfo>;

    async fn send_transaction(
        &self,
        signed_tx_b64: &str,
        wait_until: &str,
    ) -> WalletResult<Value>;
}

// === JSON-RPC PROVIDER (worker runtime) ===

#[cfg(target_arch = "wasm32")]
pub use http_provider::HttpNearRpcProvider;

#[cfg(target_arch = "wasm32")]
mod http_provider {
    use super::*;
    use wasm_bindgen::prelude::*;
    use wasm_bindgen::JsCast;
    use wasm_bindgen_futures::JsFuture;
    use web_sys::{Headers, Request, RequestInit, Response};

    pub struct HttpNearRpcProvider {
        pub rpc_url: String,
    }

    impl HttpNearRpcProvider {
        pub fn new(rpc_url: String) -> Self {
            Self { rpc_url }
        }

        async fn call(&self, method: &str, params: Value) -> WalletResult<Value> {
            let body = serde_json::json!({
                "jsonrpc": "2.0",
                "id": "wallet-host",
                "method": method,
                "params": params,
            })
            .to_string();

            let global = js_sys::global();
            let fetch_fn = js_sys::Reflect::get(&global, &JsValue::from_str("fetch"))
                .map_err(|_| WalletError::unavailable("fetch is not available"))?
                .dyn_into::<js_sys::Function>()
                .map_err(|_| WalletError::unavailable("fetch is not a function"))?;

            let opts = RequestInit::new();
            opts.set_method("POST");
            opts.set_body(&JsValue::from_str(&body));
            let headers = Headers::new()
                .map_err(|_| WalletError::internal("failed to create headers"))?;
            headers
                .set("Content-Type", "application/json")
                .map_err(|_| WalletError::internal("failed to set header"))?;
            opts.set_headers(&headers);

            let request = Request::new_with_str_and_init(&self.rpc_url, &opts)
                .map_err(|_| WalletError::internal("failed to create request"))?;

            let promise = fetch_fn
                .call1(&global, &request)
                .map_err(|e| WalletError::unavailable(format!("fetch failed: {:?}", e)))?
                .dyn_into::<js_sys::Promise>()
                .map_err(|_| WalletError::unavailable("fetch did not return a Promise"))?;

            let resp_value = JsFuture::from(promise)
                .await
                .map_err(|e| WalletError::unavailable(format!("RPC unreachable: {:?}", e)))?;
            let resp: Response = resp_value
                .dyn_into()
                .map_err(|_| WalletError::unavailable("fetch did not resolve to a Response"))?;

            let text_promise = resp
                .text()
                .map_err(|_| WalletError::unavailable("failed to read RPC response"))?;
            let text = JsFuture::from(text_promise)
                .await
                .map_err(|_| WalletError::unavailable("failed to await RPC response"))?
                .as_string()
                .unwrap_or_default();

            serde_json::from_str(&text)
                .map_err(|e| WalletError::unavailable(format!("invalid RPC JSON: {}", e)))
        }
    }

    #[async_trait(?Send)]
    impl NearRpcProvider for HttpNearRpcProvider {
        async fn view_access_key(
            &self,
            account_id: &str,
            public_key: &str,
        ) -> Result<AccessKeyView, AccessKeyQueryError> {
            let result = self
                .call(
                    "query",
                    serde_json::json!({
                        "request_type": "view_access_key",
                        "account_id": account_id,
                        "public_key": public_key,
                        "finality": "optimistic",
                    }),
                )
                .await
                .map_err(|e| AccessKeyQueryError::Rpc(e.to_string()))?;

            if let Some(error) = result.get("error") {
                return Err(AccessKeyQueryError::Rpc(error.to_string()));
            }
            let view = result
                .get("result")
                .ok_or_else(|| AccessKeyQueryError::Rpc("missing result".to_string()))?;

            // Unknown access keys surface as an error string in `result`
            if let Some(err) = view.get("error").and_then(|e| e.as_str()) {
                if err.contains("does not exist") {
                    return Err(AccessKeyQueryError::DoesNotExist);
                }
                return Err(AccessKeyQueryError::Rpc(err.to_string()));
            }

            let nonce = view
                .get("nonce")
                .and_then(|n| n.as_u64())
                .ok_or_else(|| AccessKeyQueryError::Rpc("missing nonce".to_string()))?;
            let block_height = view
                .get("block_height")
                .and_then(|h| h.as_u64())
                .unwrap_or_default();
            let block_hash = view
                .get("block_hash")
                .and_then(|h| h.as_str())
                .unwrap_or_default()
                .to_string();
            let permission = view.get("permission").cloned().unwrap_or(Value::Null);

            Ok(AccessKeyView {
                nonce,
                permission,
                block_height,
                block_hash,
            })
        }

        async fn view_final_block(&self) -> WalletResult<BlockInfo> {
            let result = self
                .call("block", serde_json::json!({ "finality": "final" }))
                .await?;

            let header = result
                .get("result")
                .and_then(|r| r.get("header"))
                .ok_or_else(|| WalletError::unavailable("missing block header"))?;

            Ok(BlockInfo {
                height: header
                    .get("height")
                    .and_then(|h| h.as_u64())
                    .ok_or_else(|| WalletError::unavailable("missing block height"))?,
                hash: header
                    .get("hash")
                    .and_then(|h| h.as_str())
                    .ok_or_else(|| WalletError::unavailable("missing block hash"))?
                    .to_string(),
            })
        }

        async fn send_transaction(
            &self,
            signed_tx_b64: &str,
            wait_until: &str,
        ) -> WalletResult<Value> {
            self.call(
                "send_tx",
                serde_json::json!({
                    "signed_tx_base64": signed_tx_b64,
                    "wait_until": wait_until,
                }),
            )
            .await
        }
    }
}
