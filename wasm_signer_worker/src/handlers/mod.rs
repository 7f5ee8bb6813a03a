pub mod handle_decrypt_private_key_with_prf;
pub mod handle_derive_near_keypair_and_encrypt;
pub mod handle_extract_cose_public_key;
pub mod handle_normalize_mpc_signature;
pub mod handle_recover_keypair_from_passkey;
pub mod handle_sign_delegate_action;
pub mod handle_sign_nep413_message;
pub mod handle_sign_transaction_with_keypair;
pub mod handle_sign_transactions_with_actions;

pub use handle_decrypt_private_key_with_prf::*;
pub use handle_derive_near_keypair_and_encrypt::*;
pub use handle_extract_cose_public_key::*;
pub use handle_normalize_mpc_signature::*;
pub use handle_recover_keypair_from_passkey::*;
pub use handle_sign_delegate_action::*;
pub use handle_sign_nep413_message::*;
pub use handle_sign_transaction_with_keypair::*;
pub use handle_sign_transactions_with_actions::*;
