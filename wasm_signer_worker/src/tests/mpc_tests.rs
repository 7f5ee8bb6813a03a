use crate::encoders::base64_url_encode;
use crate::handlers::{handle_normalize_mpc_signature, NormalizeMpcSignatureRequest};
use crate::mpc_signature::NormalizedMpcSignature;
use futures::executor::block_on;

fn rs_blob() -> Vec<u8> {
    let mut blob = vec![0x11; 32];
    blob.extend(vec![0x22; 32]);
    blob
}

fn normalize(blob: &[u8]) -> Result<NormalizedMpcSignature, String> {
    block_on(handle_normalize_mpc_signature(NormalizeMpcSignatureRequest {
        signature_b64u: base64_url_encode(blob),
    }))
    .map(|result| result.signature)
}

#[test]
fn handler_resolves_65_byte_blobs() {
    let mut blob = rs_blob();
    blob.push(0);

    let signature = normalize(&blob).expect("normalization should succeed");
    assert_eq!(
        signature,
        NormalizedMpcSignature::Resolved {
            r: [0x11; 32],
            s: [0x22; 32],
            recovery_id: 0,
        }
    );
}

#[test]
fn handler_surfaces_both_candidates_for_64_byte_blobs() {
    let signature = normalize(&rs_blob()).expect("normalization should succeed");
    match signature {
        NormalizedMpcSignature::UnresolvedRecoveryId { r, s, candidates } => {
            assert_eq!(r, [0x11; 32]);
            assert_eq!(s, [0x22; 32]);
            assert_eq!(candidates, [0, 1]);
        }
        other => panic!("expected UnresolvedRecoveryId, got {:?}", other),
    }
}

#[test]
fn handler_rejects_malformed_blobs() {
    assert!(normalize(&[0u8; 63]).is_err());

    let result = block_on(handle_normalize_mpc_signature(NormalizeMpcSignatureRequest {
        signature_b64u: "not base64url!".to_string(),
    }));
    assert!(result.is_err());
}

#[test]
fn ambiguity_is_explicit_in_the_serialized_result() {
    let signature = normalize(&rs_blob()).unwrap();
    let json = serde_json::to_value(&signature).unwrap();
    // Callers branch on the kind tag; there is no implicit two-signature form
    assert_eq!(json["kind"], "unresolvedRecoveryId");
    assert_eq!(json["candidates"], serde_json::json!([0, 1]));
}
