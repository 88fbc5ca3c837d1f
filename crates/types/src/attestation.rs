// Path: crates/types/src/attestation.rs

//! Node-key attestations.
//!
//! An attestation binds a principal to a 32-byte transport node public key
//! for a bounded interval. It is generated per handshake and never
//! persisted. The signing payload is a canonical byte encoding that must be
//! byte-identical between signer and verifier, in both identity modes:
//!
//! ```text
//! u16_be(len(domain))    || domain (ASCII)
//! u32_be(version)
//! u16_be(len(principal)) || principal (UTF-8)
//! node_public_key        (exactly 32 raw bytes)
//! u64_be(issued_at)      (seconds since epoch)
//! u64_be(expires_at)     (seconds since epoch)
//! u16_be(len(nonce))     || nonce (raw)
//! ```

use crate::principal::Principal;
use serde::{Deserialize, Serialize};

/// Domain-separation string for attestation signatures.
pub const ATTESTATION_DOMAIN: &str = "snap2p-nodekey-attestation-v1";

/// The attestation record version this implementation produces.
pub const ATTESTATION_VERSION: u32 = 1;

/// A signed binding of a principal to a transport node key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attestation {
    pub version: u32,
    pub principal: Principal,
    /// Hex of the 32-byte node public key being attested.
    pub node_public_key: String,
    /// Seconds since the Unix epoch.
    pub issued_at: u64,
    /// Seconds since the Unix epoch; strictly greater than `issued_at`.
    pub expires_at: u64,
    /// 16 to 32 random bytes, hex encoded.
    pub nonce: String,
    pub domain: String,
    /// Mode-dependent signature over the canonical payload, hex encoded.
    /// Local: 64-byte Ed25519. Stacks: 65-byte recoverable secp256k1
    /// (`recovery_id || r || s`) over SHA-256 of the payload.
    pub signature: String,
}

impl Attestation {
    /// The canonical signing payload for this attestation's fields.
    ///
    /// Returns `None` when the hex fields do not decode or the node key is
    /// not exactly 32 bytes; such a record can never verify.
    pub fn canonical_payload(&self) -> Option<Vec<u8>> {
        let node_key: [u8; 32] = hex::decode(&self.node_public_key).ok()?.try_into().ok()?;
        let nonce = hex::decode(&self.nonce).ok()?;
        Some(canonical_payload(
            &self.domain,
            self.version,
            &self.principal,
            &node_key,
            self.issued_at,
            self.expires_at,
            &nonce,
        ))
    }

    pub fn node_key_bytes(&self) -> Option<[u8; 32]> {
        hex::decode(&self.node_public_key).ok()?.try_into().ok()
    }

    pub fn nonce_len(&self) -> usize {
        hex::decode(&self.nonce).map(|n| n.len()).unwrap_or(0)
    }
}

/// Builds the canonical signing payload from raw field values.
pub fn canonical_payload(
    domain: &str,
    version: u32,
    principal: &Principal,
    node_public_key: &[u8; 32],
    issued_at: u64,
    expires_at: u64,
    nonce: &[u8],
) -> Vec<u8> {
    let principal = principal.as_str().as_bytes();
    let mut out = Vec::with_capacity(2 + domain.len() + 4 + 2 + principal.len() + 32 + 8 + 8 + 2 + nonce.len());
    out.extend_from_slice(&(domain.len() as u16).to_be_bytes());
    out.extend_from_slice(domain.as_bytes());
    out.extend_from_slice(&version.to_be_bytes());
    out.extend_from_slice(&(principal.len() as u16).to_be_bytes());
    out.extend_from_slice(principal);
    out.extend_from_slice(node_public_key);
    out.extend_from_slice(&issued_at.to_be_bytes());
    out.extend_from_slice(&expires_at.to_be_bytes());
    out.extend_from_slice(&(nonce.len() as u16).to_be_bytes());
    out.extend_from_slice(nonce);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn principal() -> Principal {
        Principal::parse(&format!("local:{}", "ab".repeat(32))).unwrap()
    }

    #[test]
    fn canonical_payload_is_deterministic_and_length_exact() {
        let node_key = [7u8; 32];
        let nonce = [9u8; 16];
        let a = canonical_payload(ATTESTATION_DOMAIN, 1, &principal(), &node_key, 100, 200, &nonce);
        let b = canonical_payload(ATTESTATION_DOMAIN, 1, &principal(), &node_key, 100, 200, &nonce);
        assert_eq!(a, b);
        let expected_len = 2 + ATTESTATION_DOMAIN.len() + 4 + 2 + principal().as_str().len() + 32 + 8 + 8 + 2 + 16;
        assert_eq!(a.len(), expected_len);
    }

    #[test]
    fn canonical_payload_separates_every_field() {
        let base = canonical_payload(ATTESTATION_DOMAIN, 1, &principal(), &[7u8; 32], 100, 200, &[9u8; 16]);
        let other_version =
            canonical_payload(ATTESTATION_DOMAIN, 2, &principal(), &[7u8; 32], 100, 200, &[9u8; 16]);
        let other_key =
            canonical_payload(ATTESTATION_DOMAIN, 1, &principal(), &[8u8; 32], 100, 200, &[9u8; 16]);
        let other_window =
            canonical_payload(ATTESTATION_DOMAIN, 1, &principal(), &[7u8; 32], 100, 201, &[9u8; 16]);
        let other_nonce =
            canonical_payload(ATTESTATION_DOMAIN, 1, &principal(), &[7u8; 32], 100, 200, &[10u8; 16]);
        for other in [other_version, other_key, other_window, other_nonce] {
            assert_ne!(base, other);
        }
    }

    #[test]
    fn struct_payload_matches_raw_payload() {
        let att = Attestation {
            version: 1,
            principal: principal(),
            node_public_key: hex::encode([7u8; 32]),
            issued_at: 100,
            expires_at: 200,
            nonce: hex::encode([9u8; 24]),
            domain: ATTESTATION_DOMAIN.to_string(),
            signature: String::new(),
        };
        let raw = canonical_payload(ATTESTATION_DOMAIN, 1, &principal(), &[7u8; 32], 100, 200, &[9u8; 24]);
        assert_eq!(att.canonical_payload().unwrap(), raw);
    }

    #[test]
    fn malformed_hex_yields_no_payload() {
        let att = Attestation {
            version: 1,
            principal: principal(),
            node_public_key: "zz".to_string(),
            issued_at: 100,
            expires_at: 200,
            nonce: hex::encode([9u8; 16]),
            domain: ATTESTATION_DOMAIN.to_string(),
            signature: String::new(),
        };
        assert!(att.canonical_payload().is_none());
    }
}
