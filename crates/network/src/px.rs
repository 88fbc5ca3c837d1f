// Path: crates/network/src/px.rs

//! PX-1 peer-exchange logic.
//!
//! Addresses learned here are advisory only: a principal is bound to a
//! node key exclusively by its own attestation during a session handshake,
//! never by gossip. Merging therefore keeps `verified = false` for
//! anything learned through a push, no matter what the sender claims.

use crate::frames::PxPeer;
use claw_types::time::now_ms;
use claw_types::{PeerRecord, Principal, Visibility};
use std::collections::BTreeMap;

/// Cap on records per push.
pub const PX_PUSH_MAX: usize = 64;

/// Builds the wire record for one peer book entry.
pub fn to_wire(record: &PeerRecord) -> PxPeer {
    PxPeer {
        principal: record.principal.clone(),
        node_public_key: record.node_public_key.clone(),
        addresses: record.addresses.clone(),
        visibility: record.visibility,
        last_seen: record.last_seen,
    }
}

/// Selects the records a push to an authenticated session may carry: only
/// verified, first-hand entries travel; `private` never does; at most
/// [`PX_PUSH_MAX`] per push.
///
/// All PX-1 recipients hold an authenticated session by construction, so
/// `friends` visibility is satisfied.
pub fn select_for_push(book: &BTreeMap<Principal, PeerRecord>) -> Vec<PxPeer> {
    book.values()
        .filter(|r| r.verified && r.visibility != Visibility::Private)
        .take(PX_PUSH_MAX)
        .map(to_wire)
        .collect()
}

/// Merges one received record into a peer book.
///
/// Records naming one of `locals` (our own identities) are ignored.
/// Address sets union; `verified` is never set from gossip. Returns true
/// when the book changed.
pub fn merge_record(
    book: &mut BTreeMap<Principal, PeerRecord>,
    record: &PxPeer,
    source: &Principal,
    locals: &[Principal],
    now: u64,
) -> bool {
    if locals.contains(&record.principal) {
        return false;
    }
    match book.get_mut(&record.principal) {
        Some(entry) => {
            let mut changed = false;
            for addr in &record.addresses {
                changed |= entry.merge_address(addr);
            }
            if entry.node_public_key.is_none() && record.node_public_key.is_some() {
                entry.node_public_key = record.node_public_key.clone();
                changed = true;
            }
            changed
        }
        None => {
            let mut entry = PeerRecord::new(record.principal.clone());
            for addr in &record.addresses {
                entry.merge_address(addr);
            }
            entry.node_public_key = record.node_public_key.clone();
            entry.source = Some(source.clone());
            entry.first_seen = now;
            entry.last_seen = now;
            book.insert(record.principal.clone(), entry);
            true
        }
    }
}

/// Marks a principal as verified first-hand, merging fresh contact data.
/// Called on every successful session authentication.
pub fn mark_verified(
    book: &mut BTreeMap<Principal, PeerRecord>,
    principal: &Principal,
    node_public_key: [u8; 32],
    address: Option<&str>,
) {
    let now = now_ms();
    let entry = book.entry(principal.clone()).or_insert_with(|| {
        let mut rec = PeerRecord::new(principal.clone());
        rec.first_seen = now;
        rec
    });
    entry.verified = true;
    entry.node_public_key = Some(hex::encode(node_public_key));
    entry.last_seen = now;
    if let Some(addr) = address {
        entry.promote_address(addr);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(n: u8) -> Principal {
        Principal::parse(&format!("local:{}", hex::encode([n; 32]))).unwrap()
    }

    fn record(n: u8, addrs: &[&str]) -> PxPeer {
        PxPeer {
            principal: p(n),
            node_public_key: None,
            addresses: addrs.iter().map(|s| s.to_string()).collect(),
            visibility: Visibility::Public,
            last_seen: 0,
        }
    }

    #[test]
    fn push_carries_only_verified_non_private_entries() {
        let mut book = BTreeMap::new();
        for i in 0..100u8 {
            let mut rec = PeerRecord::new(p(i));
            rec.verified = i % 2 == 0;
            if i == 4 {
                rec.visibility = Visibility::Private;
            }
            if i == 6 {
                rec.visibility = Visibility::Friends;
            }
            book.insert(p(i), rec);
        }
        let out = select_for_push(&book);
        assert!(out.len() <= PX_PUSH_MAX);
        assert!(out.iter().all(|r| r.visibility != Visibility::Private));
        assert!(!out.iter().any(|r| r.principal == p(1)), "gossip must not travel");
        assert!(out.iter().any(|r| r.principal == p(6)), "friends travel on sessions");
    }

    #[test]
    fn merge_ignores_our_own_identities() {
        let mut book = BTreeMap::new();
        let locals = vec![p(1)];
        assert!(!merge_record(&mut book, &record(1, &["/ip4/1.1.1.1/tcp/1"]), &p(9), &locals, 10));
        assert!(book.is_empty());
    }

    #[test]
    fn merge_is_idempotent_and_order_insensitive() {
        let a = record(1, &["/ip4/1.1.1.1/tcp/1", "/ip4/2.2.2.2/tcp/2"]);
        let b = record(1, &["/ip4/2.2.2.2/tcp/2", "/ip4/3.3.3.3/tcp/3"]);
        let locals = vec![];

        let mut forward = BTreeMap::new();
        merge_record(&mut forward, &a, &p(9), &locals, 10);
        merge_record(&mut forward, &b, &p(9), &locals, 10);
        merge_record(&mut forward, &b, &p(9), &locals, 10);

        let mut backward = BTreeMap::new();
        merge_record(&mut backward, &b, &p(9), &locals, 10);
        merge_record(&mut backward, &a, &p(9), &locals, 10);

        let f: std::collections::BTreeSet<_> = forward[&p(1)].addresses.iter().cloned().collect();
        let g: std::collections::BTreeSet<_> = backward[&p(1)].addresses.iter().cloned().collect();
        assert_eq!(f, g);
        assert_eq!(f.len(), 3);
    }

    #[test]
    fn gossip_never_verifies() {
        let mut book = BTreeMap::new();
        merge_record(&mut book, &record(1, &["/ip4/1.1.1.1/tcp/1"]), &p(9), &[], 10);
        assert!(!book[&p(1)].verified);

        // First-hand authentication does.
        mark_verified(&mut book, &p(1), [5u8; 32], Some("/ip4/1.1.1.1/tcp/1"));
        assert!(book[&p(1)].verified);

        // And later gossip cannot unset it.
        merge_record(&mut book, &record(1, &["/ip4/4.4.4.4/tcp/4"]), &p(9), &[], 30);
        assert!(book[&p(1)].verified);
        assert_eq!(book[&p(1)].addresses.len(), 2);
    }
}
