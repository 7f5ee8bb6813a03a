use crate::cose::{
    ed25519_public_key_from_cose, extract_cose_public_key_from_attestation,
    extract_cose_public_key_from_auth_data,
};
use crate::encoders::base64_url_encode;
use ciborium::value::Value as CborValue;

fn okp_cose_key(x: [u8; 32]) -> Vec<u8> {
    let key = CborValue::Map(vec![
        (CborValue::Integer(1i64.into()), CborValue::Integer(1i64.into())), // kty: OKP
        (CborValue::Integer(3i64.into()), CborValue::Integer((-8i64).into())), // alg: EdDSA
        (CborValue::Integer((-1i64).into()), CborValue::Integer(6i64.into())), // crv: Ed25519
        (CborValue::Integer((-2i64).into()), CborValue::Bytes(x.to_vec())), // x
    ]);
    let mut out = Vec::new();
    ciborium::ser::into_writer(&key, &mut out).unwrap();
    out
}

fn auth_data_with_credential(cose_key: &[u8]) -> Vec<u8> {
    let mut auth_data = Vec::new();
    auth_data.extend_from_slice(&[0xAB; 32]); // rpIdHash
    auth_data.push(0x45); // flags: UP | UV | AT
    auth_data.extend_from_slice(&[0, 0, 0, 9]); // signCount
    auth_data.extend_from_slice(&[0xCD; 16]); // aaguid
    let cred_id = [0xEF; 20];
    auth_data.extend_from_slice(&(cred_id.len() as u16).to_be_bytes());
    auth_data.extend_from_slice(&cred_id);
    auth_data.extend_from_slice(cose_key);
    auth_data
}

fn attestation_object_b64u(auth_data: &[u8]) -> String {
    let attestation = CborValue::Map(vec![
        (
            CborValue::Text("fmt".to_string()),
            CborValue::Text("none".to_string()),
        ),
        (
            CborValue::Text("attStmt".to_string()),
            CborValue::Map(vec![]),
        ),
        (
            CborValue::Text("authData".to_string()),
            CborValue::Bytes(auth_data.to_vec()),
        ),
    ]);
    let mut out = Vec::new();
    ciborium::ser::into_writer(&attestation, &mut out).unwrap();
    base64_url_encode(&out)
}

#[test]
fn extracts_okp_cose_key_from_attestation_object() {
    let x = [0x77u8; 32];
    let cose_key = okp_cose_key(x);
    let auth_data = auth_data_with_credential(&cose_key);
    let attestation = attestation_object_b64u(&auth_data);

    let extracted = extract_cose_public_key_from_attestation(&attestation).unwrap();
    assert_eq!(extracted, cose_key);

    let ed25519 = ed25519_public_key_from_cose(&extracted).unwrap();
    assert_eq!(ed25519, Some(x));
}

#[test]
fn rejects_auth_data_without_attested_credential() {
    let mut auth_data = Vec::new();
    auth_data.extend_from_slice(&[0xAB; 32]);
    auth_data.push(0x05); // UP | UV, no AT
    auth_data.extend_from_slice(&[0, 0, 0, 1]);

    let result = extract_cose_public_key_from_auth_data(&auth_data);
    assert!(result.is_err());
    assert!(result.unwrap_err().contains("no attested credential"));
}

#[test]
fn rejects_truncated_auth_data() {
    assert!(extract_cose_public_key_from_auth_data(&[0u8; 10]).is_err());

    // Header present but credential id length points past the end
    let cose_key = okp_cose_key([1u8; 32]);
    let mut auth_data = auth_data_with_credential(&cose_key);
    auth_data.truncate(37 + 16 + 2 + 3);
    assert!(extract_cose_public_key_from_auth_data(&auth_data).is_err());
}

#[test]
fn ec2_keys_are_not_reported_as_ed25519() {
    // kty: EC2 (2)
    let key = CborValue::Map(vec![
        (CborValue::Integer(1i64.into()), CborValue::Integer(2i64.into())),
        (CborValue::Integer(3i64.into()), CborValue::Integer((-7i64).into())),
    ]);
    let mut bytes = Vec::new();
    ciborium::ser::into_writer(&key, &mut bytes).unwrap();

    assert_eq!(ed25519_public_key_from_cose(&bytes).unwrap(), None);
}
