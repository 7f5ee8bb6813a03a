use crate::errors::{ShamirError, VrfWorkerError};
use crate::fetch::{fetch_json_get, fetch_json_post};
use crate::types::http::{
    ShamirApplyServerLockHTTPRequest, ShamirApplyServerLockHTTPResponse, ShamirKeyInfoResponse,
    ShamirRemoveServerLockHTTPRequest, ShamirRemoveServerLockHTTPResponse,
};
use log::debug;

/// Join a relay base URL with a route, unless the route is already absolute.
pub(crate) fn join_relay_url(relay_url: &str, route: &str) -> String {
    let route = route.trim();
    if route.starts_with("http://") || route.starts_with("https://") {
        return route.to_string();
    }
    format!(
        "{}/{}",
        relay_url.trim().trim_end_matches('/'),
        route.trim_start_matches('/')
    )
}

/// POST apply-server-lock
/// Request: { kek_c_b64u } → Response: { kek_cs_b64u, keyId }
pub(crate) async fn post_apply_server_lock(
    endpoint_url: &str,
    kek_c_b64u: &str,
) -> Result<ShamirApplyServerLockHTTPResponse, VrfWorkerError> {
    debug!("Shamir3Pass apply-server-lock: {}", endpoint_url);

    let body = serde_json::to_string(&ShamirApplyServerLockHTTPRequest {
        kek_c_b64u: kek_c_b64u.to_string(),
    })?;

    let resp = fetch_json_post(endpoint_url, &body)
        .await
        .map_err(VrfWorkerError::Http)?;

    if resp.status >= 400 {
        return Err(VrfWorkerError::Http(format!(
            "apply-server-lock HTTP {}: {}",
            resp.status, resp.body
        )));
    }

    Ok(serde_json::from_str(&resp.body)?)
}

/// POST remove-server-lock
/// Request: { kek_st_b64u, keyId } → Response: { kek_t_b64u }
/// A 400 means the relay does not know the keyId (active or grace).
pub(crate) async fn post_remove_server_lock(
    endpoint_url: &str,
    kek_st_b64u: &str,
    key_id: String,
) -> Result<ShamirRemoveServerLockHTTPResponse, VrfWorkerError> {
    debug!("Shamir3Pass remove-server-lock: {}", endpoint_url);

    let body = serde_json::to_string(&ShamirRemoveServerLockHTTPRequest {
        kek_st_b64u: kek_st_b64u.to_string(),
        key_id: key_id.clone(),
    })?;

    let resp = fetch_json_post(endpoint_url, &body)
        .await
        .map_err(VrfWorkerError::Http)?;

    if resp.status == 400 {
        return Err(VrfWorkerError::Shamir(ShamirError::UnknownKeyId(key_id)));
    }
    if resp.status >= 400 {
        return Err(VrfWorkerError::Http(format!(
            "remove-server-lock HTTP {}: {}",
            resp.status, resp.body
        )));
    }

    Ok(serde_json::from_str(&resp.body)?)
}

/// GET /shamir/key-info
/// Response: { currentKeyId, p_b64u, graceKeyIds[] }
pub(crate) async fn get_shamir_key_info(
    endpoint_url: &str,
) -> Result<ShamirKeyInfoResponse, VrfWorkerError> {
    debug!("Shamir3Pass key-info: {}", endpoint_url);

    let resp = fetch_json_get(endpoint_url)
        .await
        .map_err(VrfWorkerError::Http)?;

    if resp.status >= 400 {
        return Err(VrfWorkerError::Http(format!(
            "key-info HTTP {}: {}",
            resp.status, resp.body
        )));
    }

    Ok(serde_json::from_str(&resp.body)?)
}
