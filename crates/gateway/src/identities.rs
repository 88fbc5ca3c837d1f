// Path: crates/gateway/src/identities.rs

//! Loaded identities and their per-identity state.
//!
//! Each identity owns its own inbox, outbox, peer book and ACL; nothing is
//! shared across identities except the transport node and the control
//! socket. The on-disk layout mirrors that isolation
//! (`identities/<principal>/{identity.enc,inbox.json,outbox.json,peers.json}`),
//! with the legacy single-identity layout keeping the same files at the
//! data-directory root.

use crate::mailbox::Mailbox;
use crate::peers::PeerBook;
use claw_crypto::{Identity, IdentityStore};
use claw_types::config::{GatewayConfig, IdentityConfig, ACL_WILDCARD};
use claw_types::error::{ConfigError, IdentityError};
use claw_types::{IdentityMode, Principal};
use std::collections::HashSet;
use std::path::Path;

/// One loaded identity plus its isolated state handles.
pub struct IdentityEntry {
    pub identity: Identity,
    pub cfg: IdentityConfig,
    pub inbox: Mailbox,
    pub outbox: Mailbox,
    pub peers: PeerBook,
}

impl IdentityEntry {
    /// Whether the per-identity ACL admits an inbound sender.
    ///
    /// The allow list holds principals verbatim, plus the `"*"` wildcard
    /// element; `allowLocal` additionally admits any `local:` principal.
    pub fn acl_allows(&self, remote: &Principal) -> bool {
        if self.cfg.allow_local && remote.mode() == IdentityMode::Local {
            return true;
        }
        self.cfg
            .allowed_remote_peers
            .iter()
            .any(|a| a == ACL_WILDCARD || a == remote.as_str())
    }
}

/// Where a caller gets identity passphrases from.
#[derive(Clone)]
pub enum Passphrases {
    /// `CLAWCHAT_PASS_<NICK>` (uppercased) per identity, falling back to
    /// `CLAWCHAT_PASS`. How service scripts feed a non-interactive daemon.
    Env,
    /// Fixed map, used by tests and by the CLI after prompting.
    Fixed(std::collections::HashMap<Principal, String>),
}

impl Passphrases {
    pub fn lookup(&self, principal: &Principal, nick: Option<&str>) -> Option<String> {
        match self {
            Passphrases::Env => {
                if let Some(nick) = nick {
                    let var = format!(
                        "CLAWCHAT_PASS_{}",
                        nick.to_ascii_uppercase().replace('-', "_")
                    );
                    if let Ok(v) = std::env::var(var) {
                        return Some(v);
                    }
                }
                std::env::var("CLAWCHAT_PASS").ok()
            }
            Passphrases::Fixed(map) => map.get(principal).cloned(),
        }
    }

    /// A passphrase for the legacy layout, where the principal is not
    /// known until the identity file decrypts.
    pub fn lookup_any(&self) -> Option<String> {
        match self {
            Passphrases::Env => std::env::var("CLAWCHAT_PASS").ok(),
            Passphrases::Fixed(map) => map.values().next().cloned(),
        }
    }
}

/// Loads every autoload identity named by the config.
///
/// Duplicate nicks across autoloaded identities were already rejected by
/// config validation; this re-checks against actually-loaded nicks so a
/// nick set inside an identity file cannot collide either.
pub fn load_all(
    store: &IdentityStore,
    config: &GatewayConfig,
    passphrases: &Passphrases,
) -> Result<Vec<IdentityEntry>, IdentityError> {
    let mut entries = Vec::new();
    let mut nicks: HashSet<String> = HashSet::new();
    for cfg in &config.identities {
        if !cfg.autoload {
            continue;
        }
        let pass = passphrases
            .lookup(&cfg.principal, cfg.nick.as_deref())
            .ok_or_else(|| {
                IdentityError::Io(format!("no passphrase for {}", cfg.principal))
            })?;
        let mut identity = store.load(&cfg.principal, &pass)?;
        if identity.nick().is_none() {
            identity.set_nick(cfg.nick.clone());
        }
        if let Some(nick) = identity.nick() {
            if !nicks.insert(nick.to_string()) {
                return Err(IdentityError::Io(
                    ConfigError::DuplicateNick(nick.to_string()).to_string(),
                ));
            }
        }
        entries.push(open_entry(store, identity, cfg.clone())?);
    }
    Ok(entries)
}

/// Opens the mailboxes and peer book for one identity under the standard
/// layout.
pub fn open_entry(
    store: &IdentityStore,
    identity: Identity,
    cfg: IdentityConfig,
) -> Result<IdentityEntry, IdentityError> {
    let dir = store.identity_dir(&identity.principal());
    open_entry_at(&dir, identity, cfg)
}

/// Opens an identity's state handles rooted at an explicit directory
/// (the legacy layout points this at the data root itself).
pub fn open_entry_at(
    dir: &Path,
    identity: Identity,
    cfg: IdentityConfig,
) -> Result<IdentityEntry, IdentityError> {
    std::fs::create_dir_all(dir).map_err(|e| IdentityError::Io(e.to_string()))?;
    let inbox = Mailbox::open(dir.join("inbox.json"))
        .map_err(|e| IdentityError::Io(e.to_string()))?;
    let outbox = Mailbox::open(dir.join("outbox.json"))
        .map_err(|e| IdentityError::Io(e.to_string()))?;
    let peers = PeerBook::open(dir.join("peers.json"))
        .map_err(|e| IdentityError::Io(e.to_string()))?;
    Ok(IdentityEntry {
        identity,
        cfg,
        inbox,
        outbox,
        peers,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(n: u8) -> Principal {
        Principal::parse(&format!("local:{}", hex::encode([n; 32]))).unwrap()
    }

    fn entry_with_acl(allowed: Vec<String>, allow_local: bool) -> IdentityEntry {
        let dir = tempfile::tempdir().unwrap();
        let identity = Identity::create_local(None);
        let cfg = IdentityConfig {
            principal: identity.principal(),
            nick: None,
            autoload: true,
            allow_local,
            allowed_remote_peers: allowed,
            openclaw_wake: false,
        };
        open_entry_at(dir.path(), identity, cfg).unwrap()
    }

    #[test]
    fn wildcard_admits_everyone() {
        let entry = entry_with_acl(vec![ACL_WILDCARD.into()], false);
        assert!(entry.acl_allows(&p(1)));
        assert!(entry.acl_allows(&p(2)));
    }

    #[test]
    fn explicit_list_is_verbatim() {
        let entry = entry_with_acl(vec![p(1).as_str().to_string()], false);
        assert!(entry.acl_allows(&p(1)));
        assert!(!entry.acl_allows(&p(2)));
    }

    #[test]
    fn empty_list_denies() {
        let entry = entry_with_acl(vec![], false);
        assert!(!entry.acl_allows(&p(1)));
    }

    #[test]
    fn allow_local_admits_local_mode_peers() {
        let entry = entry_with_acl(vec![], true);
        assert!(entry.acl_allows(&p(3)));
    }

    #[test]
    fn env_passphrase_prefers_the_nick_variable() {
        std::env::set_var("CLAWCHAT_PASS", "fallback-passphrase");
        std::env::set_var("CLAWCHAT_PASS_ALICE", "alice-passphrase");
        let source = Passphrases::Env;
        assert_eq!(
            source.lookup(&p(1), Some("alice")).as_deref(),
            Some("alice-passphrase")
        );
        assert_eq!(
            source.lookup(&p(1), Some("unset-nick")).as_deref(),
            Some("fallback-passphrase")
        );
        std::env::remove_var("CLAWCHAT_PASS");
        std::env::remove_var("CLAWCHAT_PASS_ALICE");
    }
}
