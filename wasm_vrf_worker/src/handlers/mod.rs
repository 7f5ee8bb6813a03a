use crate::manager::VRFKeyManager;
use crate::types::VrfWorkerResponse;
use std::cell::RefCell;
use std::rc::Rc;

pub mod handle_derive_vrf_keypair_from_prf;
pub mod handle_derive_wrap_key_seed_and_session;
pub mod handle_generate_vrf_challenge;
pub mod handle_generate_vrf_keypair_bootstrap;
pub mod handle_shamir3pass_client;
pub mod handle_shamir3pass_config;
pub mod handle_shamir3pass_server;
pub mod handle_unlock_vrf_keypair;

pub use handle_derive_vrf_keypair_from_prf::*;
pub use handle_derive_wrap_key_seed_and_session::*;
pub use handle_generate_vrf_challenge::*;
pub use handle_generate_vrf_keypair_bootstrap::*;
pub use handle_shamir3pass_client::*;
pub use handle_shamir3pass_config::*;
pub use handle_shamir3pass_server::*;
pub use handle_unlock_vrf_keypair::*;

pub fn handle_ping(message_id: Option<String>) -> VrfWorkerResponse {
    VrfWorkerResponse::success(
        message_id,
        Some(serde_json::json!({ "status": "alive" })),
    )
}

pub fn handle_check_vrf_status(
    manager: Rc<RefCell<VRFKeyManager>>,
    message_id: Option<String>,
) -> VrfWorkerResponse {
    let status = manager.borrow().get_vrf_status();
    VrfWorkerResponse::success_from(message_id, Some(status))
}

pub fn handle_clear_vrf_session(
    manager: Rc<RefCell<VRFKeyManager>>,
    message_id: Option<String>,
) -> VrfWorkerResponse {
    match manager.borrow_mut().clear_session() {
        Ok(()) => VrfWorkerResponse::success(
            message_id,
            Some(serde_json::json!({ "cleared": true })),
        ),
        Err(e) => VrfWorkerResponse::fail(message_id, e.to_string()),
    }
}
