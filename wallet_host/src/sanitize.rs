//! Boundary sanitization for parent-visible values.
//!
//! Everything sent to the parent must survive a structured clone and carry
//! no secrets: no functions or ports (impossible in `serde_json::Value`, so
//! anything that failed conversion never gets here), no internal handle
//! fields, and no PRF output in any spelling. Stripping happens in one place
//! so no response path can forget it.

use serde_json::Value;

use crate::errors::{WalletError, WalletResult};

/// Keys holding worker-internal handles; never serialized outward.
const INTERNAL_HANDLE_PREFIX: char = '_';

/// Keys whose values are PRF or key material and must never reach the
/// parent document, under any nesting.
const SECRET_KEYS: [&str; 9] = [
    "prf",
    "prfOutput",
    "prf_output",
    "prfFirst",
    "prf_first",
    "prfSecond",
    "prf_second",
    "wrapKeySeed",
    "wrap_key_seed",
];

/// Sanitize a value for transport to the parent: internal handle fields
/// (`_confirmHandle` and friends) and PRF-bearing fields are removed
/// recursively.
pub fn sanitize_boundary_value(value: Value) -> WalletResult<Value> {
    Ok(strip(value))
}

fn strip(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (key, child) in map {
                if key.starts_with(INTERNAL_HANDLE_PREFIX) {
                    continue;
                }
                if SECRET_KEYS.contains(&key.as_str()) {
                    continue;
                }
                out.insert(key, strip(child));
            }
            Value::Object(out)
        }
        Value::Array(arr) => Value::Array(arr.into_iter().map(strip).collect()),
        other => other,
    }
}

/// Assert (rather than fix) the boundary invariant; used where a value is
/// expected to already be clean.
pub fn assert_boundary_clean(value: &Value) -> WalletResult<()> {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                if key.starts_with(INTERNAL_HANDLE_PREFIX) {
                    return Err(WalletError::internal(format!(
                        "internal handle field {} in boundary value",
                        key
                    )));
                }
                if SECRET_KEYS.contains(&key.as_str()) {
                    return Err(WalletError::internal(format!(
                        "secret field {} in boundary value",
                        key
                    )));
                }
                assert_boundary_clean(child)?;
            }
            Ok(())
        }
        Value::Array(arr) => {
            for child in arr {
                assert_boundary_clean(child)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

/// Redact secret-bearing JSON string fields inside an error message. Error
/// strings can embed whole payloads (serde errors do), so messages crossing
/// the boundary pass through here.
pub fn scrub_secret_fields(message: &str) -> String {
    let mut scrubbed = message.to_string();
    for key in SECRET_KEYS {
        let pattern = format!("\"{}\"", key);
        if let Some(start) = scrubbed.find(&pattern) {
            // Drop everything from the first secret key onward rather than
            // attempting surgical redaction of a possibly-truncated payload
            scrubbed.truncate(start);
            scrubbed.push_str("[redacted]");
            break;
        }
    }
    scrubbed
}
