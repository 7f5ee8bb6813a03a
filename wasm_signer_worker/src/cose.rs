//! COSE public key extraction from WebAuthn attestation objects.
//!
//! The attestation object is CBOR `{ fmt, attStmt, authData }`; authData is
//! a byte string: rpIdHash(32) || flags(1) || signCount(4) and, when the
//! attested-credential-data flag is set, aaguid(16) || credIdLen(2) ||
//! credId || credentialPublicKey (one CBOR map, COSE_Key).

use ciborium::value::Value as CborValue;

use crate::encoders::base64_url_decode;

/// Attested credential data present
const FLAG_AT: u8 = 0x40;

const AUTH_DATA_HEADER_LEN: usize = 37; // rpIdHash + flags + signCount
const AAGUID_LEN: usize = 16;

/// Extract the COSE credential public key bytes from a base64url attestation
/// object. Returns the canonical CBOR re-encoding of the COSE_Key map.
pub fn extract_cose_public_key_from_attestation(
    attestation_object_b64u: &str,
) -> Result<Vec<u8>, String> {
    let attestation_bytes = base64_url_decode(attestation_object_b64u)?;

    let attestation: CborValue = ciborium::de::from_reader(attestation_bytes.as_slice())
        .map_err(|e| format!("Invalid attestation object CBOR: {}", e))?;

    let CborValue::Map(entries) = attestation else {
        return Err("Attestation object must be a CBOR map".to_string());
    };

    let auth_data = entries
        .iter()
        .find_map(|(k, v)| match (k, v) {
            (CborValue::Text(key), CborValue::Bytes(bytes)) if key == "authData" => Some(bytes),
            _ => None,
        })
        .ok_or_else(|| "Attestation object missing authData".to_string())?;

    extract_cose_public_key_from_auth_data(auth_data)
}

/// Extract the COSE credential public key from raw authenticator data.
pub fn extract_cose_public_key_from_auth_data(auth_data: &[u8]) -> Result<Vec<u8>, String> {
    if auth_data.len() < AUTH_DATA_HEADER_LEN {
        return Err(format!(
            "Authenticator data too short: {} bytes",
            auth_data.len()
        ));
    }

    let flags = auth_data[32];
    if flags & FLAG_AT == 0 {
        return Err("Authenticator data has no attested credential data".to_string());
    }

    let mut offset = AUTH_DATA_HEADER_LEN;
    if auth_data.len() < offset + AAGUID_LEN + 2 {
        return Err("Authenticator data truncated before credential id".to_string());
    }
    offset += AAGUID_LEN;

    let cred_id_len = u16::from_be_bytes([auth_data[offset], auth_data[offset + 1]]) as usize;
    offset += 2;

    if auth_data.len() < offset + cred_id_len {
        return Err("Authenticator data truncated inside credential id".to_string());
    }
    offset += cred_id_len;

    // The remainder starts with the COSE_Key map. Re-encode the first CBOR
    // item to normalize away any trailing extension data.
    let cose_region = &auth_data[offset..];
    let cose_key: CborValue = ciborium::de::from_reader(cose_region)
        .map_err(|e| format!("Invalid COSE key CBOR: {}", e))?;

    if !matches!(cose_key, CborValue::Map(_)) {
        return Err("COSE key must be a CBOR map".to_string());
    }

    let mut out = Vec::new();
    ciborium::ser::into_writer(&cose_key, &mut out)
        .map_err(|e| format!("Failed to re-encode COSE key: {}", e))?;
    Ok(out)
}

/// Pull the ed25519 (OKP, crv Ed25519) public key bytes out of a COSE key,
/// when that is what the authenticator produced.
pub fn ed25519_public_key_from_cose(cose_key_bytes: &[u8]) -> Result<Option<[u8; 32]>, String> {
    let cose_key: CborValue = ciborium::de::from_reader(cose_key_bytes)
        .map_err(|e| format!("Invalid COSE key CBOR: {}", e))?;

    let CborValue::Map(entries) = cose_key else {
        return Err("COSE key must be a CBOR map".to_string());
    };

    // kty (1) == OKP (1)
    let kty = cose_integer_entry(&entries, 1);
    if kty != Some(1) {
        return Ok(None);
    }

    // x coordinate lives at label -2
    let x = entries.iter().find_map(|(k, v)| match (k, v) {
        (CborValue::Integer(label), CborValue::Bytes(bytes)) if i128::from(*label) == -2 => {
            Some(bytes.clone())
        }
        _ => None,
    });

    match x {
        Some(bytes) if bytes.len() == 32 => {
            let mut out = [0u8; 32];
            out.copy_from_slice(&bytes);
            Ok(Some(out))
        }
        Some(bytes) => Err(format!("OKP x coordinate must be 32 bytes, got {}", bytes.len())),
        None => Err("OKP COSE key missing x coordinate".to_string()),
    }
}

fn cose_integer_entry(entries: &[(CborValue, CborValue)], label: i128) -> Option<i128> {
    entries.iter().find_map(|(k, v)| match (k, v) {
        (CborValue::Integer(key), CborValue::Integer(value)) if i128::from(*key) == label => {
            Some(i128::from(*value))
        }
        _ => None,
    })
}
