pub mod deserializers;
pub mod handlers;
pub mod near;
pub mod progress;
pub mod wasm_to_json;
pub mod webauthn;
pub mod worker_messages;

pub use handlers::*;
pub use near::*;
pub use wasm_to_json::*;
pub use webauthn::*;
