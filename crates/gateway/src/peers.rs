// Path: crates/gateway/src/peers.rs

//! The per-identity peer book, persisted synchronously to `peers.json`.

use claw_network::px;
use claw_types::error::MailboxError;
use claw_types::time::now_ms;
use claw_types::{PeerRecord, Principal};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Known-peer records for one identity.
#[derive(Debug)]
pub struct PeerBook {
    path: PathBuf,
    records: BTreeMap<Principal, PeerRecord>,
}

impl PeerBook {
    pub fn open(path: PathBuf) -> Result<Self, MailboxError> {
        let records: Vec<PeerRecord> = match std::fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| MailboxError::Read(format!("{}: {e}", path.display())))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(MailboxError::Read(format!("{}: {e}", path.display()))),
        };
        let records = records
            .into_iter()
            .map(|r| (r.principal.clone(), r))
            .collect();
        Ok(Self { path, records })
    }

    pub fn records(&self) -> &BTreeMap<Principal, PeerRecord> {
        &self.records
    }

    pub fn get(&self, principal: &Principal) -> Option<&PeerRecord> {
        self.records.get(principal)
    }

    /// Addresses for a principal in preference order.
    pub fn addresses(&self, principal: &Principal) -> Vec<String> {
        self.records
            .get(principal)
            .map(|r| r.addresses.clone())
            .unwrap_or_default()
    }

    /// Adds or merges a peer added explicitly by the user.
    pub fn add(
        &mut self,
        principal: Principal,
        address: &str,
        alias: Option<String>,
    ) -> Result<(), MailboxError> {
        let now = now_ms();
        let entry = self.records.entry(principal.clone()).or_insert_with(|| {
            let mut rec = PeerRecord::new(principal);
            rec.first_seen = now;
            rec
        });
        entry.merge_address(address);
        if alias.is_some() {
            entry.alias = alias;
        }
        entry.last_seen = now;
        self.persist()
    }

    /// Removes a peer outright. Unknown principals are an error so the
    /// control plane can report them.
    pub fn remove(&mut self, principal: &Principal) -> Result<bool, MailboxError> {
        let removed = self.records.remove(principal).is_some();
        if removed {
            self.persist()?;
        }
        Ok(removed)
    }

    /// Records a successful session authentication with this peer.
    pub fn mark_verified(
        &mut self,
        principal: &Principal,
        node_public_key: [u8; 32],
        address: Option<&str>,
    ) -> Result<(), MailboxError> {
        px::mark_verified(&mut self.records, principal, node_public_key, address);
        self.persist()
    }

    /// Merges addresses a peer advertised for itself during a handshake.
    pub fn merge_addresses(
        &mut self,
        principal: &Principal,
        addresses: &[String],
    ) -> Result<(), MailboxError> {
        if addresses.is_empty() {
            return Ok(());
        }
        let mut changed = false;
        if let Some(rec) = self.records.get_mut(principal) {
            for addr in addresses {
                changed |= rec.merge_address(addr);
            }
        }
        if changed {
            self.persist()?;
        }
        Ok(())
    }

    /// Promotes a dial address that just worked to the front of the
    /// preference order.
    pub fn promote_address(
        &mut self,
        principal: &Principal,
        address: &str,
    ) -> Result<(), MailboxError> {
        if let Some(rec) = self.records.get_mut(principal) {
            rec.promote_address(address);
            self.persist()?;
        }
        Ok(())
    }

    /// Merges a batch of PX-1 records. Returns how many changed the book.
    pub fn merge_push(
        &mut self,
        records: &[claw_network::frames::PxPeer],
        source: &Principal,
        locals: &[Principal],
    ) -> Result<usize, MailboxError> {
        let now = now_ms();
        let mut changed = 0;
        for rec in records {
            if px::merge_record(&mut self.records, rec, source, locals, now) {
                changed += 1;
            }
        }
        if changed > 0 {
            self.persist()?;
        }
        Ok(changed)
    }

    fn persist(&self) -> Result<(), MailboxError> {
        let list: Vec<&PeerRecord> = self.records.values().collect();
        let bytes = serde_json::to_vec_pretty(&list)
            .map_err(|e| MailboxError::WriteFatal(e.to_string()))?;
        std::fs::write(&self.path, bytes)
            .map_err(|e| MailboxError::WriteFatal(format!("{}: {e}", self.path.display())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(n: u8) -> Principal {
        Principal::parse(&format!("local:{}", hex::encode([n; 32]))).unwrap()
    }

    #[test]
    fn add_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("peers.json");
        {
            let mut book = PeerBook::open(path.clone()).unwrap();
            book.add(p(1), "/ip4/10.0.0.1/tcp/9000", Some("ally".into()))
                .unwrap();
        }
        let book = PeerBook::open(path).unwrap();
        let rec = book.get(&p(1)).unwrap();
        assert_eq!(rec.alias.as_deref(), Some("ally"));
        assert_eq!(rec.addresses, vec!["/ip4/10.0.0.1/tcp/9000"]);
    }

    #[test]
    fn remove_reports_unknown() {
        let dir = tempfile::tempdir().unwrap();
        let mut book = PeerBook::open(dir.path().join("peers.json")).unwrap();
        assert!(!book.remove(&p(1)).unwrap());
        book.add(p(1), "/ip4/10.0.0.1/tcp/9000", None).unwrap();
        assert!(book.remove(&p(1)).unwrap());
        assert!(book.get(&p(1)).is_none());
    }

    #[test]
    fn verification_promotes_the_live_address() {
        let dir = tempfile::tempdir().unwrap();
        let mut book = PeerBook::open(dir.path().join("peers.json")).unwrap();
        book.add(p(1), "/ip4/10.0.0.1/tcp/9000", None).unwrap();
        book.mark_verified(&p(1), [7u8; 32], Some("/ip4/10.0.0.2/tcp/9000"))
            .unwrap();
        let rec = book.get(&p(1)).unwrap();
        assert!(rec.verified);
        assert_eq!(rec.addresses[0], "/ip4/10.0.0.2/tcp/9000");
        assert_eq!(rec.node_public_key.as_deref(), Some(hex::encode([7u8; 32]).as_str()));
    }
}
