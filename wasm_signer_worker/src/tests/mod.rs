// Native test suite for the signer worker. Everything here runs without a
// JS runtime; session material is installed directly instead of arriving
// over a MessagePort.

mod actions_tests;
mod cose_tests;
mod crypto_tests;
mod guard_tests;
mod mpc_tests;
mod transaction_tests;

use crate::crypto::WrapKey;
use crate::encoders::base64_url_encode;

pub(crate) fn test_wrap_key() -> WrapKey {
    WrapKey::new(
        base64_url_encode(&[0x5Au8; 32]),
        base64_url_encode(&[0x3Cu8; 32]),
    )
}

pub(crate) fn test_prf_first_b64u() -> String {
    base64_url_encode(&(0..32).map(|i| (i as u8).wrapping_mul(7)).collect::<Vec<u8>>())
}
