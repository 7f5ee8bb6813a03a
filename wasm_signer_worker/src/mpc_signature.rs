//! Normalization of MPC relay signature blobs.
//!
//! Relays return secp256k1 signatures either as 64 bytes `(r || s)` or as
//! 65 bytes `(r || s || v)`. When the recovery id is absent the caller must
//! try both candidates against the expected key; that ambiguity is an
//! explicit variant here, never two silently-returned signatures.

use serde::{Deserialize, Serialize};

pub const MPC_SIGNATURE_RS_LEN: usize = 64;
pub const MPC_SIGNATURE_RSV_LEN: usize = 65;

/// Recovery-id candidates when the relay omits `v`
pub const RECOVERY_ID_CANDIDATES: [u8; 2] = [0, 1];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum NormalizedMpcSignature {
    /// 65-byte blob: the recovery id came with the signature
    Resolved {
        r: [u8; 32],
        s: [u8; 32],
        recovery_id: u8,
    },
    /// 64-byte blob: the recovery id must be resolved by the caller against
    /// the expected public key
    UnresolvedRecoveryId {
        r: [u8; 32],
        s: [u8; 32],
        candidates: [u8; 2],
    },
}

impl NormalizedMpcSignature {
    /// Parse a raw signature blob from an MPC relay.
    pub fn parse(blob: &[u8]) -> Result<Self, String> {
        match blob.len() {
            MPC_SIGNATURE_RS_LEN => {
                let (r, s) = split_rs(blob);
                Ok(NormalizedMpcSignature::UnresolvedRecoveryId {
                    r,
                    s,
                    candidates: RECOVERY_ID_CANDIDATES,
                })
            }
            MPC_SIGNATURE_RSV_LEN => {
                let (r, s) = split_rs(&blob[..MPC_SIGNATURE_RS_LEN]);
                let v = blob[MPC_SIGNATURE_RS_LEN];
                let recovery_id = match v {
                    0 | 1 => v,
                    // Ethereum-style v values
                    27 | 28 => v - 27,
                    other => return Err(format!("Invalid recovery id byte: {}", other)),
                };
                Ok(NormalizedMpcSignature::Resolved { r, s, recovery_id })
            }
            other => Err(format!(
                "MPC signature must be {} or {} bytes, got {}",
                MPC_SIGNATURE_RS_LEN, MPC_SIGNATURE_RSV_LEN, other
            )),
        }
    }

    pub fn r(&self) -> &[u8; 32] {
        match self {
            NormalizedMpcSignature::Resolved { r, .. } => r,
            NormalizedMpcSignature::UnresolvedRecoveryId { r, .. } => r,
        }
    }

    pub fn s(&self) -> &[u8; 32] {
        match self {
            NormalizedMpcSignature::Resolved { s, .. } => s,
            NormalizedMpcSignature::UnresolvedRecoveryId { s, .. } => s,
        }
    }
}

fn split_rs(bytes: &[u8]) -> ([u8; 32], [u8; 32]) {
    let mut r = [0u8; 32];
    let mut s = [0u8; 32];
    r.copy_from_slice(&bytes[..32]);
    s.copy_from_slice(&bytes[32..64]);
    (r, s)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rs_blob() -> Vec<u8> {
        let mut blob = vec![0xAA; 32];
        blob.extend(vec![0xBB; 32]);
        blob
    }

    #[test]
    fn parses_64_byte_blob_as_unresolved() {
        let parsed = NormalizedMpcSignature::parse(&rs_blob()).unwrap();
        match parsed {
            NormalizedMpcSignature::UnresolvedRecoveryId { r, s, candidates } => {
                assert_eq!(r, [0xAA; 32]);
                assert_eq!(s, [0xBB; 32]);
                assert_eq!(candidates, [0, 1]);
            }
            other => panic!("expected UnresolvedRecoveryId, got {:?}", other),
        }
    }

    #[test]
    fn parses_65_byte_blob_as_resolved() {
        let mut blob = rs_blob();
        blob.push(1);
        let parsed = NormalizedMpcSignature::parse(&blob).unwrap();
        assert_eq!(
            parsed,
            NormalizedMpcSignature::Resolved {
                r: [0xAA; 32],
                s: [0xBB; 32],
                recovery_id: 1,
            }
        );
    }

    #[test]
    fn normalizes_ethereum_style_v() {
        let mut blob = rs_blob();
        blob.push(28);
        let parsed = NormalizedMpcSignature::parse(&blob).unwrap();
        match parsed {
            NormalizedMpcSignature::Resolved { recovery_id, .. } => assert_eq!(recovery_id, 1),
            other => panic!("expected Resolved, got {:?}", other),
        }
    }

    #[test]
    fn rejects_other_lengths_and_bad_v() {
        assert!(NormalizedMpcSignature::parse(&[0u8; 63]).is_err());
        assert!(NormalizedMpcSignature::parse(&[0u8; 66]).is_err());

        let mut blob = rs_blob();
        blob.push(9);
        assert!(NormalizedMpcSignature::parse(&blob).is_err());
    }
}
