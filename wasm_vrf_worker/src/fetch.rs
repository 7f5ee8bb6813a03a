//! Minimal fetch helpers for the worker runtime.
//!
//! Returns the status code and raw body so callers can map relay status
//! codes (e.g. 400 on an unknown keyId) to protocol errors.

#[cfg(target_arch = "wasm32")]
mod imp {
    use wasm_bindgen::prelude::*;
    use wasm_bindgen::JsCast;
    use wasm_bindgen_futures::JsFuture;
    use web_sys::{Headers, Request, RequestInit, Response};

    pub struct FetchedResponse {
        pub status: u16,
        pub body: String,
    }

    async fn run_request(request: Request) -> Result<FetchedResponse, String> {
        let global = js_sys::global();
        let fetch_fn = js_sys::Reflect::get(&global, &JsValue::from_str("fetch"))
            .map_err(|_| "fetch is not available in this scope".to_string())?
            .dyn_into::<js_sys::Function>()
            .map_err(|_| "fetch is not a function".to_string())?;

        let promise = fetch_fn
            .call1(&global, &request)
            .map_err(|e| format!("fetch call failed: {:?}", e))?
            .dyn_into::<js_sys::Promise>()
            .map_err(|_| "fetch did not return a Promise".to_string())?;

        let resp_value = JsFuture::from(promise)
            .await
            .map_err(|e| format!("fetch rejected: {:?}", e))?;
        let resp: Response = resp_value
            .dyn_into()
            .map_err(|_| "fetch did not resolve to a Response".to_string())?;

        let status = resp.status();
        let text_promise = resp
            .text()
            .map_err(|e| format!("Failed to read response body: {:?}", e))?;
        let text_value = JsFuture::from(text_promise)
            .await
            .map_err(|e| format!("Failed to await response body: {:?}", e))?;
        let body = text_value.as_string().unwrap_or_default();

        Ok(FetchedResponse { status, body })
    }

    pub async fn fetch_json_post(url: &str, body: &str) -> Result<FetchedResponse, String> {
        let headers = Headers::new().map_err(|e| format!("Failed to create headers: {:?}", e))?;
        headers
            .set("Content-Type", "application/json")
            .map_err(|e| format!("Failed to set header: {:?}", e))?;

        let opts = RequestInit::new();
        opts.set_method("POST");
        opts.set_headers(&headers);
        opts.set_body(&JsValue::from_str(body));

        let request = Request::new_with_str_and_init(url, &opts)
            .map_err(|e| format!("Failed to create request: {:?}", e))?;

        run_request(request).await
    }

    pub async fn fetch_json_get(url: &str) -> Result<FetchedResponse, String> {
        let opts = RequestInit::new();
        opts.set_method("GET");

        let request = Request::new_with_str_and_init(url, &opts)
            .map_err(|e| format!("Failed to create request: {:?}", e))?;

        run_request(request).await
    }
}

#[cfg(not(target_arch = "wasm32"))]
mod imp {
    pub struct FetchedResponse {
        pub status: u16,
        pub body: String,
    }

    pub async fn fetch_json_post(_url: &str, _body: &str) -> Result<FetchedResponse, String> {
        Err("HTTP is only available in the worker runtime".to_string())
    }

    pub async fn fetch_json_get(_url: &str) -> Result<FetchedResponse, String> {
        Err("HTTP is only available in the worker runtime".to_string())
    }
}

pub use imp::{fetch_json_get, fetch_json_post, FetchedResponse};
