// Path: crates/types/src/principal.rs

//! Principal strings and identity modes.
//!
//! A principal is the stable identifier of an actor on the mesh. The prefix
//! carries the identity mode: `local:` followed by 64 lowercase hex chars
//! (an Ed25519 public key), or `stacks:` followed by a c32check Stacks
//! address.

use crate::error::ProtocolError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How an identity's key material is produced and how its attestations are
/// verified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentityMode {
    /// A plain Ed25519 signing pair; the principal embeds the public key.
    Local,
    /// A BIP39-derived secp256k1 wallet pair plus a distinct Ed25519 node
    /// key; the principal is the wallet's Stacks address.
    Stacks,
}

impl fmt::Display for IdentityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdentityMode::Local => write!(f, "local"),
            IdentityMode::Stacks => write!(f, "stacks"),
        }
    }
}

/// A validated principal string.
///
/// `Principal -> identity` is injective within a process; the gateway keys
/// every per-identity structure (mailboxes, peer book, ACL) by this type.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Principal(String);

impl Principal {
    /// Parses and validates a principal string.
    pub fn parse(s: &str) -> Result<Self, ProtocolError> {
        if let Some(rest) = s.strip_prefix("local:") {
            if rest.len() != 64 || !rest.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
                return Err(ProtocolError::InvalidPrincipal(s.to_string()));
            }
            return Ok(Self(s.to_string()));
        }
        if let Some(rest) = s.strip_prefix("stacks:") {
            // c32 alphabet, 'S' version prefix; full checksum validation is
            // the crypto crate's job.
            if rest.is_empty() || !rest.starts_with('S') {
                return Err(ProtocolError::InvalidPrincipal(s.to_string()));
            }
            return Ok(Self(s.to_string()));
        }
        Err(ProtocolError::InvalidPrincipal(s.to_string()))
    }

    /// Builds a `local:` principal from an Ed25519 public key.
    pub fn local_from_key(public_key: &[u8; 32]) -> Self {
        Self(format!("local:{}", hex::encode(public_key)))
    }

    /// Builds a `stacks:` principal from a Stacks address.
    pub fn stacks_from_address(address: &str) -> Self {
        Self(format!("stacks:{address}"))
    }

    /// The identity mode encoded in the prefix.
    pub fn mode(&self) -> IdentityMode {
        if self.0.starts_with("local:") {
            IdentityMode::Local
        } else {
            IdentityMode::Stacks
        }
    }

    /// The part after the mode prefix.
    pub fn suffix(&self) -> &str {
        self.0.split_once(':').map(|(_, s)| s).unwrap_or("")
    }

    /// For `local:` principals, the embedded Ed25519 public key.
    pub fn embedded_key(&self) -> Option<[u8; 32]> {
        if self.mode() != IdentityMode::Local {
            return None;
        }
        let bytes = hex::decode(self.suffix()).ok()?;
        bytes.try_into().ok()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for Principal {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_local_principal() {
        let s = format!("local:{}", "ab".repeat(32));
        let p = Principal::parse(&s).unwrap();
        assert_eq!(p.mode(), IdentityMode::Local);
        assert_eq!(p.embedded_key().unwrap(), [0xabu8; 32]);
    }

    #[test]
    fn rejects_bad_local_principals() {
        assert!(Principal::parse("local:zzzz").is_err());
        assert!(Principal::parse(&format!("local:{}", "AB".repeat(32))).is_err());
        assert!(Principal::parse("local:abcd").is_err());
    }

    #[test]
    fn parses_stacks_principal() {
        let p = Principal::parse("stacks:SP2J6ZY48GV1EZ5V2V5RB9MP66SW86PYKKNRV9EJ7").unwrap();
        assert_eq!(p.mode(), IdentityMode::Stacks);
        assert!(p.embedded_key().is_none());
    }

    #[test]
    fn rejects_unknown_prefix() {
        assert!(Principal::parse("dns:example.com").is_err());
        assert!(Principal::parse("").is_err());
    }
}
