// Path: crates/crypto/src/attestation.rs

//! Creation and verification of node-key attestations.

use crate::identity::Identity;
use claw_types::attestation::{canonical_payload, ATTESTATION_DOMAIN, ATTESTATION_VERSION};
use claw_types::error::IdentityError;
use claw_types::time::now_secs;
use claw_types::{Attestation, IdentityMode};
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use rand::RngCore;

/// Default validity window for a fresh attestation, in seconds.
pub const DEFAULT_VALIDITY_SECS: u64 = 86_400;

/// Permitted clock skew between peers, in seconds.
const CLOCK_SKEW_SECS: u64 = 300;

const NONCE_LEN: usize = 16;
const NONCE_MIN: usize = 16;
const NONCE_MAX: usize = 32;

/// Signs a binding of `identity`'s principal to `node_public_key`, valid
/// from now for `validity_secs` (default 24 h).
pub fn create_attestation(
    identity: &Identity,
    node_public_key: &[u8; 32],
    validity_secs: Option<u64>,
) -> Result<Attestation, IdentityError> {
    let issued_at = now_secs();
    let expires_at = issued_at + validity_secs.unwrap_or(DEFAULT_VALIDITY_SECS);
    let mut nonce = [0u8; NONCE_LEN];
    rand::rngs::OsRng.fill_bytes(&mut nonce);

    let principal = identity.principal();
    let payload = canonical_payload(
        ATTESTATION_DOMAIN,
        ATTESTATION_VERSION,
        &principal,
        node_public_key,
        issued_at,
        expires_at,
        &nonce,
    );
    let signature = identity.sign(&payload)?;

    Ok(Attestation {
        version: ATTESTATION_VERSION,
        principal,
        node_public_key: hex::encode(node_public_key),
        issued_at,
        expires_at,
        nonce: hex::encode(nonce),
        domain: ATTESTATION_DOMAIN.to_string(),
        signature: hex::encode(signature),
    })
}

/// Verifies an attestation against the current clock.
///
/// Checks, in order: record version, domain string, nonce length, node key
/// length, validity window (with ±300 s skew: `issued_at` may not lie in
/// the future beyond the skew, `expires_at` must not have passed beyond
/// it), principal prefix, and the mode-selected signature.
pub fn verify_attestation(att: &Attestation) -> Result<(), IdentityError> {
    verify_attestation_at(att, now_secs())
}

/// Clock-injected form of [`verify_attestation`], used by tests.
pub fn verify_attestation_at(att: &Attestation, now: u64) -> Result<(), IdentityError> {
    if att.version != ATTESTATION_VERSION {
        return Err(IdentityError::AttestationInvalid(format!(
            "unsupported version {}",
            att.version
        )));
    }
    if att.domain != ATTESTATION_DOMAIN {
        return Err(IdentityError::AttestationInvalid("wrong domain".into()));
    }
    let nonce_len = att.nonce_len();
    if !(NONCE_MIN..=NONCE_MAX).contains(&nonce_len) {
        return Err(IdentityError::AttestationInvalid(format!(
            "nonce length {nonce_len} outside [{NONCE_MIN}, {NONCE_MAX}]"
        )));
    }
    let node_key = att
        .node_key_bytes()
        .ok_or_else(|| IdentityError::AttestationInvalid("node key must be 32 bytes".into()))?;
    if att.expires_at <= att.issued_at {
        return Err(IdentityError::AttestationInvalid(
            "expires_at must be after issued_at".into(),
        ));
    }
    if att.issued_at > now + CLOCK_SKEW_SECS {
        return Err(IdentityError::AttestationInvalid("issued in the future".into()));
    }
    if att.expires_at <= now.saturating_sub(CLOCK_SKEW_SECS) {
        return Err(IdentityError::AttestationInvalid("expired".into()));
    }

    let payload = canonical_payload(
        ATTESTATION_DOMAIN,
        att.version,
        &att.principal,
        &node_key,
        att.issued_at,
        att.expires_at,
        &hex::decode(&att.nonce).unwrap_or_default(),
    );
    let signature =
        hex::decode(&att.signature).map_err(|e| IdentityError::Crypto(e.to_string()))?;

    match att.principal.mode() {
        IdentityMode::Local => {
            let key = att
                .principal
                .embedded_key()
                .ok_or_else(|| IdentityError::AttestationInvalid("bad local principal".into()))?;
            let key = VerifyingKey::from_bytes(&key)
                .map_err(|e| IdentityError::Crypto(e.to_string()))?;
            let sig_bytes: [u8; 64] = signature
                .as_slice()
                .try_into()
                .map_err(|_| IdentityError::AttestationInvalid("bad signature length".into()))?;
            key.verify(&payload, &Signature::from_bytes(&sig_bytes))
                .map_err(|_| IdentityError::AttestationInvalid("signature mismatch".into()))
        }
        IdentityMode::Stacks => {
            if !Identity::verify(&att.principal, &payload, &signature)? {
                return Err(IdentityError::AttestationInvalid(
                    "recovered address mismatch".into(),
                ));
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node_key() -> [u8; 32] {
        [0x42u8; 32]
    }

    #[test]
    fn fresh_local_attestation_verifies() {
        let id = Identity::create_local(None);
        let att = create_attestation(&id, &node_key(), None).unwrap();
        verify_attestation(&att).unwrap();
        assert_eq!(att.expires_at - att.issued_at, DEFAULT_VALIDITY_SECS);
    }

    #[cfg(feature = "stacks")]
    #[test]
    fn fresh_stacks_attestation_verifies() {
        let (id, _) = Identity::create_stacks(true, None).unwrap();
        let att = create_attestation(&id, &node_key(), None).unwrap();
        verify_attestation(&att).unwrap();
    }

    #[test]
    fn window_is_enforced_with_skew() {
        let id = Identity::create_local(None);
        let att = create_attestation(&id, &node_key(), Some(600)).unwrap();

        // Inside the window.
        verify_attestation_at(&att, att.issued_at + 1).unwrap();
        // Well before issuance: issued_at is in the caller's future.
        assert!(verify_attestation_at(&att, att.issued_at - CLOCK_SKEW_SECS - 10).is_err());
        // Just inside the skew before issuance.
        verify_attestation_at(&att, att.issued_at - CLOCK_SKEW_SECS + 1).unwrap();
        // Long after expiry.
        assert!(verify_attestation_at(&att, att.expires_at + CLOCK_SKEW_SECS + 10).is_err());
        // Just inside the skew after expiry.
        verify_attestation_at(&att, att.expires_at + CLOCK_SKEW_SECS - 1).unwrap();
    }

    #[test]
    fn byte_flips_invalidate() {
        let id = Identity::create_local(None);
        let att = create_attestation(&id, &node_key(), None).unwrap();

        let mut flipped = att.clone();
        let mut sig = hex::decode(&flipped.signature).unwrap();
        sig[10] ^= 0x01;
        flipped.signature = hex::encode(sig);
        assert!(verify_attestation(&flipped).is_err());

        let mut flipped = att.clone();
        let mut key = hex::decode(&flipped.node_public_key).unwrap();
        key[0] ^= 0x01;
        flipped.node_public_key = hex::encode(key);
        assert!(verify_attestation(&flipped).is_err());

        let mut flipped = att.clone();
        let other = Identity::create_local(None);
        flipped.principal = other.principal();
        assert!(verify_attestation(&flipped).is_err());
    }

    #[test]
    fn field_rules_are_enforced() {
        let id = Identity::create_local(None);
        let good = create_attestation(&id, &node_key(), None).unwrap();

        let mut att = good.clone();
        att.version = 2;
        assert!(verify_attestation(&att).is_err());

        let mut att = good.clone();
        att.domain = "snap2p-nodekey-attestation-v2".into();
        assert!(verify_attestation(&att).is_err());

        let mut att = good.clone();
        att.nonce = hex::encode([0u8; 8]);
        assert!(verify_attestation(&att).is_err());

        let mut att = good.clone();
        att.nonce = hex::encode([0u8; 40]);
        assert!(verify_attestation(&att).is_err());

        let mut att = good.clone();
        att.node_public_key = hex::encode([0u8; 16]);
        assert!(verify_attestation(&att).is_err());

        let mut att = good.clone();
        att.expires_at = att.issued_at;
        assert!(verify_attestation(&att).is_err());
    }

    #[test]
    fn validity_override_is_respected() {
        let id = Identity::create_local(None);
        let att = create_attestation(&id, &node_key(), Some(60)).unwrap();
        assert_eq!(att.expires_at - att.issued_at, 60);
    }
}
