//! Per-session WrapKeySeed handshake.
//!
//! The VRF worker delivers WrapKeySeed material (and, for registration and
//! recovery flows, PRF.first) over a MessagePort attached per signing
//! session. Handlers can arrive before the seed does; they block on a waiter
//! latch with a timeout instead of requiring main-thread synchronization.

use std::cell::RefCell;
use std::collections::HashMap;

use crate::crypto::WrapKey;
use crate::types::worker_messages::WorkerRequestType;
use wasm_bindgen::prelude::*;
#[cfg(target_arch = "wasm32")]
use wasm_bindgen::JsCast;
#[cfg(target_arch = "wasm32")]
use wasm_bindgen_futures::JsFuture;
#[cfg(target_arch = "wasm32")]
use web_sys::{MessageEvent, MessagePort};

thread_local! {
    static WRAP_KEY_SEED_SESSIONS: RefCell<HashMap<String, WrapKey>> = RefCell::new(HashMap::new());
    static SESSION_PRF_FIRST: RefCell<HashMap<String, String>> = RefCell::new(HashMap::new());
}

#[cfg(target_arch = "wasm32")]
thread_local! {
    static WRAP_KEY_SEED_WAITERS: RefCell<HashMap<String, Vec<js_sys::Function>>> = RefCell::new(HashMap::new());
    static PRF_FIRST_WAITERS: RefCell<HashMap<String, Vec<js_sys::Function>>> = RefCell::new(HashMap::new());
    static SESSION_MATERIAL_ERRORS: RefCell<HashMap<String, String>> = RefCell::new(HashMap::new());
}

#[cfg(target_arch = "wasm32")]
fn resolve_waiters(
    waiters: &'static std::thread::LocalKey<RefCell<HashMap<String, Vec<js_sys::Function>>>>,
    session_id: &str,
    value: &JsValue,
) {
    waiters.with(|waiters| {
        let mut waiters = waiters.borrow_mut();
        let Some(list) = waiters.remove(session_id) else {
            return;
        };
        for resolve in list {
            let _ = resolve.call1(&JsValue::UNDEFINED, value);
        }
    });
}

/// Attach a MessagePort for a signing session and cache delivered WrapKeySeed
/// material in Rust. The JS shim only transfers the port; parsing lives here.
#[wasm_bindgen]
pub fn attach_wrap_key_seed_port(session_id: String, port_val: JsValue) {
    #[cfg(target_arch = "wasm32")]
    {
        let Some(port) = port_val.dyn_ref::<MessagePort>() else {
            return;
        };

        let sid = session_id.clone();
        let port_for_close = port.clone();
        let on_message = move |event: MessageEvent| {
            let Ok(data) = js_sys::Reflect::get(&event, &JsValue::from_str("data")) else {
                return;
            };

            // Payload is result-like:
            // - success: { ok: true, wrap_key_seed, wrapKeySalt, prfFirst? }
            // - error:   { ok: false, error }
            let ok = js_sys::Reflect::get(&data, &JsValue::from_str("ok"))
                .ok()
                .and_then(|v| v.as_bool());
            if ok == Some(false) {
                let err = js_sys::Reflect::get(&data, &JsValue::from_str("error"))
                    .ok()
                    .and_then(|v| v.as_string())
                    .unwrap_or_else(|| "VRF worker failed to provide WrapKeySeed".to_string());

                SESSION_MATERIAL_ERRORS.with(|map| {
                    map.borrow_mut().insert(sid.clone(), err.clone());
                });

                let err_js = JsValue::from_str(&err);
                resolve_waiters(&WRAP_KEY_SEED_WAITERS, &sid, &err_js);
                resolve_waiters(&PRF_FIRST_WAITERS, &sid, &err_js);
                port_for_close.close();
                return;
            }

            let wrap_key_seed = js_sys::Reflect::get(&data, &JsValue::from_str("wrap_key_seed"))
                .ok()
                .and_then(|v| v.as_string());
            let wrap_key_salt = js_sys::Reflect::get(&data, &JsValue::from_str("wrapKeySalt"))
                .ok()
                .and_then(|v| v.as_string());
            let prf_first = js_sys::Reflect::get(&data, &JsValue::from_str("prfFirst"))
                .ok()
                .and_then(|v| v.as_string());

            if let (Some(seed), Some(salt)) = (wrap_key_seed, wrap_key_salt) {
                SESSION_MATERIAL_ERRORS.with(|map| {
                    map.borrow_mut().remove(&sid);
                });

                WRAP_KEY_SEED_SESSIONS.with(|map| {
                    map.borrow_mut().insert(sid.clone(), WrapKey::new(seed, salt));
                });
                resolve_waiters(&WRAP_KEY_SEED_WAITERS, &sid, &JsValue::TRUE);

                if let Some(prf_first_b64u) = prf_first {
                    if !prf_first_b64u.is_empty() {
                        SESSION_PRF_FIRST.with(|map| {
                            map.borrow_mut().insert(sid.clone(), prf_first_b64u);
                        });
                        resolve_waiters(&PRF_FIRST_WAITERS, &sid, &JsValue::TRUE);
                    }
                }
            }
            // One-shot semantics: the VRF worker sends one message and closes
            // its end; close ours too.
            port_for_close.close();
        };

        let closure = Closure::<dyn FnMut(MessageEvent)>::wrap(Box::new(on_message));
        port.set_onmessage(Some(closure.as_ref().unchecked_ref()));
        port.start();
        // Keep the closure alive for the lifetime of the port
        closure.forget();
    }

    #[cfg(not(target_arch = "wasm32"))]
    {
        let _ = session_id;
        let _ = port_val;
    }
}

/// Seed a session directly (native tests).
#[cfg(not(target_arch = "wasm32"))]
pub fn install_session_material(session_id: &str, wrap_key: WrapKey, prf_first_b64u: Option<String>) {
    WRAP_KEY_SEED_SESSIONS.with(|map| {
        map.borrow_mut().insert(session_id.to_string(), wrap_key);
    });
    if let Some(prf_first) = prf_first_b64u {
        SESSION_PRF_FIRST.with(|map| {
            map.borrow_mut().insert(session_id.to_string(), prf_first);
        });
    }
}

/// Drop all material for a session (terminal outcome or cancellation).
pub fn clear_session_material(session_id: &str) {
    WRAP_KEY_SEED_SESSIONS.with(|map| {
        map.borrow_mut().remove(session_id);
    });
    SESSION_PRF_FIRST.with(|map| {
        map.borrow_mut().remove(session_id);
    });
}

fn lookup_wrap_key(session_id: &str) -> Result<WrapKey, JsValue> {
    let material = WRAP_KEY_SEED_SESSIONS.with(|map| map.borrow().get(session_id).cloned());
    material.ok_or_else(|| {
        JsValue::from_str(&format!("Missing WrapKeySeed for session {}", session_id))
    })
}

fn lookup_prf_first(session_id: &str) -> Result<String, JsValue> {
    let prf_first = SESSION_PRF_FIRST.with(|map| map.borrow().get(session_id).cloned());
    prf_first.ok_or_else(|| {
        JsValue::from_str(&format!("Missing PRF.first for session {}", session_id))
    })
}

#[cfg(target_arch = "wasm32")]
fn timeout_promise(ms: u32) -> js_sys::Promise {
    js_sys::Promise::new(&mut |resolve, _reject| {
        let global = js_sys::global();
        let set_timeout = js_sys::Reflect::get(&global, &JsValue::from_str("setTimeout"))
            .ok()
            .and_then(|v| v.dyn_into::<js_sys::Function>().ok());
        let Some(set_timeout) = set_timeout else {
            let _ = resolve.call1(&JsValue::UNDEFINED, &JsValue::FALSE);
            return;
        };

        // If setTimeout fails, resolve immediately so callers never hang.
        let resolve_clone = resolve.clone();
        let cb = Closure::<dyn FnOnce()>::once(move || {
            let _ = resolve_clone.call1(&JsValue::UNDEFINED, &JsValue::FALSE);
        });
        if set_timeout
            .call2(&global, cb.as_ref(), &JsValue::from_f64(ms as f64))
            .is_ok()
        {
            cb.forget();
        } else {
            let _ = resolve.call1(&JsValue::UNDEFINED, &JsValue::FALSE);
        }
    })
}

#[cfg(target_arch = "wasm32")]
fn waiter_promise(
    waiters: &'static std::thread::LocalKey<RefCell<HashMap<String, Vec<js_sys::Function>>>>,
    session_id: &str,
) -> js_sys::Promise {
    let sid = session_id.to_string();
    js_sys::Promise::new(&mut |resolve, _reject| {
        waiters.with(|waiters| {
            waiters
                .borrow_mut()
                .entry(sid.clone())
                .or_default()
                .push(resolve);
        });
    })
}

#[cfg(target_arch = "wasm32")]
async fn await_session_value<T>(
    session_id: &str,
    timeout_ms: u32,
    waiters: &'static std::thread::LocalKey<RefCell<HashMap<String, Vec<js_sys::Function>>>>,
    lookup: impl Fn(&str) -> Result<T, JsValue>,
    what: &str,
) -> Result<T, JsValue> {
    let error = SESSION_MATERIAL_ERRORS.with(|map| map.borrow().get(session_id).cloned());
    if let Some(err) = error {
        return Err(JsValue::from_str(&err));
    }

    if let Ok(v) = lookup(session_id) {
        return Ok(v);
    }

    let waiter = waiter_promise(waiters, session_id);
    let race_inputs = js_sys::Array::new();
    race_inputs.push(&waiter);
    race_inputs.push(&timeout_promise(timeout_ms));
    let raced = js_sys::Promise::race(&race_inputs);
    let result = JsFuture::from(raced).await?;

    // The timeout promise resolves with `false`.
    if result.as_bool() == Some(false) {
        return Err(JsValue::from_str(&format!(
            "Timed out waiting for {} for session {}",
            what, session_id
        )));
    }
    if let Some(err) = result.as_string() {
        return Err(JsValue::from_str(&err));
    }

    lookup(session_id).map_err(|_| {
        JsValue::from_str(&format!(
            "Waiter resolved but {} still missing for session {}",
            what, session_id
        ))
    })
}

#[cfg(target_arch = "wasm32")]
pub(crate) async fn get_wrap_key(
    session_id: &str,
    _request_type: WorkerRequestType,
    timeout_ms: u32,
) -> Result<WrapKey, JsValue> {
    await_session_value(
        session_id,
        timeout_ms,
        &WRAP_KEY_SEED_WAITERS,
        lookup_wrap_key,
        "WrapKeySeed",
    )
    .await
}

#[cfg(not(target_arch = "wasm32"))]
pub(crate) async fn get_wrap_key(
    session_id: &str,
    _request_type: WorkerRequestType,
    _timeout_ms: u32,
) -> Result<WrapKey, JsValue> {
    lookup_wrap_key(session_id)
}

#[cfg(target_arch = "wasm32")]
pub(crate) async fn get_prf_first_b64u(
    session_id: &str,
    _request_type: WorkerRequestType,
    timeout_ms: u32,
) -> Result<String, JsValue> {
    await_session_value(
        session_id,
        timeout_ms,
        &PRF_FIRST_WAITERS,
        lookup_prf_first,
        "PRF.first",
    )
    .await
}

#[cfg(not(target_arch = "wasm32"))]
pub(crate) async fn get_prf_first_b64u(
    session_id: &str,
    _request_type: WorkerRequestType,
    _timeout_ms: u32,
) -> Result<String, JsValue> {
    lookup_prf_first(session_id)
}
