use crate::find_forbidden_secret_field;
use serde_json::json;

#[test]
fn rejects_every_forbidden_field_name() {
    for key in [
        "prfOutput",
        "prf_output",
        "prfFirst",
        "prf_first",
        "prf",
        "vrfSk",
        "vrf_sk",
    ] {
        let payload = json!({ key: "c2VjcmV0" });
        assert_eq!(
            find_forbidden_secret_field(&payload),
            Some(key.to_string()),
            "guard must reject {}",
            key
        );
    }
}

#[test]
fn scans_nested_objects_and_arrays() {
    let payload = json!({
        "txSigningRequests": [
            { "receiverId": "bob.testnet", "actions": [] },
            { "credential": { "response": { "prfOutput": "c2VjcmV0" } } }
        ]
    });
    assert_eq!(
        find_forbidden_secret_field(&payload),
        Some("prfOutput".to_string())
    );
}

#[test]
fn accepts_clean_signing_payloads() {
    let payload = json!({
        "sessionId": "sess-1",
        "nearAccountId": "alice.testnet",
        "decryption": {
            "encryptedPrivateKeyData": "AAAA",
            "encryptedPrivateKeyChacha20NonceB64u": "BBBB"
        },
        "intentDigest": "digest",
        // similar names are fine; only exact matches are secrets
        "prfSupported": true,
        "profile": { "prefs": {} }
    });
    assert_eq!(find_forbidden_secret_field(&payload), None);
}
