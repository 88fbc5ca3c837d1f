// Path: crates/types/src/peer.rs

//! Peer records.
//!
//! One record type serves both roles the gateway needs: the durable peer
//! book entry (`peers.json`) and the PX-1 bookkeeping (who taught us about
//! the peer, and whether we ever authenticated it first-hand).

use crate::principal::Principal;
use serde::{Deserialize, Serialize};

/// Who a peer record may be shared with over PX-1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    /// Gossipable to anyone.
    #[default]
    Public,
    /// Shared only on authenticated sessions.
    Friends,
    /// Never shared.
    Private,
}

/// An entry in an identity's peer book.
///
/// Addresses are a set kept in preference order: the most recently
/// successful dial address sits first. Learn events merge; removal is
/// explicit. `verified` is true iff this daemon itself completed an
/// authenticated session with the principal; gossip never sets it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerRecord {
    pub principal: Principal,
    /// Known multiaddrs, deduplicated, most recently successful first.
    #[serde(default)]
    pub addresses: Vec<String>,
    /// Local display name for this peer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    /// Hex of the peer's 32-byte node public key, once observed first-hand
    /// or claimed by gossip.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_public_key: Option<String>,
    /// Which principal this entry was first learned from; ourselves for
    /// entries added locally or observed first-hand.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Principal>,
    /// Milliseconds since epoch.
    #[serde(default)]
    pub first_seen: u64,
    /// Milliseconds since epoch of the last direct contact or learn event.
    #[serde(default)]
    pub last_seen: u64,
    #[serde(default)]
    pub verified: bool,
    #[serde(default)]
    pub visibility: Visibility,
}

impl PeerRecord {
    pub fn new(principal: Principal) -> Self {
        Self {
            principal,
            addresses: Vec::new(),
            alias: None,
            node_public_key: None,
            source: None,
            first_seen: 0,
            last_seen: 0,
            verified: false,
            visibility: Visibility::default(),
        }
    }

    /// Merges an address into the set. Returns true if it was new.
    pub fn merge_address(&mut self, addr: &str) -> bool {
        if self.addresses.iter().any(|a| a == addr) {
            return false;
        }
        self.addresses.push(addr.to_string());
        true
    }

    /// Moves an address to the front of the preference order, inserting it
    /// if missing.
    pub fn promote_address(&mut self, addr: &str) {
        self.addresses.retain(|a| a != addr);
        self.addresses.insert(0, addr.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> Principal {
        Principal::parse(&format!("local:{}", s.repeat(32))).unwrap()
    }

    #[test]
    fn merge_address_is_idempotent() {
        let mut rec = PeerRecord::new(p("aa"));
        assert!(rec.merge_address("/ip4/10.0.0.1/tcp/9000"));
        assert!(!rec.merge_address("/ip4/10.0.0.1/tcp/9000"));
        assert!(rec.merge_address("/ip4/10.0.0.2/tcp/9000"));
        assert_eq!(rec.addresses.len(), 2);
    }

    #[test]
    fn promote_moves_the_successful_address_first() {
        let mut rec = PeerRecord::new(p("aa"));
        rec.merge_address("/ip4/10.0.0.1/tcp/9000");
        rec.merge_address("/ip4/10.0.0.2/tcp/9000");
        rec.promote_address("/ip4/10.0.0.2/tcp/9000");
        assert_eq!(rec.addresses[0], "/ip4/10.0.0.2/tcp/9000");
        assert_eq!(rec.addresses.len(), 2);
    }

    #[test]
    fn defaults_tolerate_sparse_json() {
        let json = r#"{"principal":"local:PRINCIPAL"}"#.replace("PRINCIPAL", &"aa".repeat(32));
        let rec: PeerRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(rec.visibility, Visibility::Public);
        assert!(!rec.verified);
        assert!(rec.addresses.is_empty());
    }
}
