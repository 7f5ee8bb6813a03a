//! Intent digest: a deterministic hash over the transaction set that proves
//! the UI rendered exactly what will be signed.

use base64ct::{Base64UrlUnpadded, Encoding};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// SHA-256 (base64url) over the alphabetized JSON of
/// `[{ receiverId, actions }, ...]`. Keys are sorted recursively so the
/// digest matches regardless of map ordering on either side of the boundary.
pub fn compute_intent_digest(tx_signing_requests: &[Value]) -> Result<String, String> {
    let value = Value::Array(tx_signing_requests.to_vec());
    let alphabetized = alphabetize_json_value(&value);
    let serialized = serde_json::to_string(&alphabetized)
        .map_err(|e| format!("Failed to serialize tx signing requests: {}", e))?;

    let hash = Sha256::digest(serialized.as_bytes());
    Ok(Base64UrlUnpadded::encode_string(&hash))
}

fn alphabetize_json_value(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut out = serde_json::Map::new();
            for k in keys {
                if let Some(child) = map.get(k) {
                    out.insert(k.clone(), alphabetize_json_value(child));
                }
            }
            Value::Object(out)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(alphabetize_json_value).collect()),
        _ => v.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn digest_is_independent_of_key_order() {
        let a = vec![json!({
            "receiverId": "bob.testnet",
            "actions": [{ "action_type": "Transfer", "deposit": "1" }]
        })];
        let b = vec![json!({
            "actions": [{ "deposit": "1", "action_type": "Transfer" }],
            "receiverId": "bob.testnet"
        })];

        assert_eq!(
            compute_intent_digest(&a).unwrap(),
            compute_intent_digest(&b).unwrap()
        );
    }

    #[test]
    fn digest_changes_with_content() {
        let a = vec![json!({ "receiverId": "bob.testnet", "actions": [] })];
        let b = vec![json!({ "receiverId": "eve.testnet", "actions": [] })];
        assert_ne!(
            compute_intent_digest(&a).unwrap(),
            compute_intent_digest(&b).unwrap()
        );
    }

    #[test]
    fn empty_request_set_still_digests() {
        let digest = compute_intent_digest(&[]).unwrap();
        assert_eq!(digest.len(), 43);
    }
}
