// Path: crates/gateway/src/state.rs

//! Shared daemon state.
//!
//! Everything mutable lives in [`GatewayState`] behind one `std::sync`
//! mutex held only for synchronous work (never across an await). Holding
//! the lock while appending to a mailbox and emitting the matching event
//! is what serializes mutations and keeps event order consistent with
//! mailbox order.

use crate::identities::IdentityEntry;
use crate::sessions::SessionHandle;
use claw_network::Transport;
use claw_types::config::GatewayConfig;
use claw_types::error::ControlError;
use claw_types::ipc::Event;
use claw_types::time::now_ms;
use claw_types::Principal;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, watch};

/// Cheap-to-clone handle to the running daemon's shared pieces.
#[derive(Clone)]
pub struct Gateway {
    pub state: Arc<Mutex<GatewayState>>,
    pub transport: Arc<Transport>,
    pub events: broadcast::Sender<Event>,
    pub shutdown: Arc<watch::Sender<bool>>,
}

impl Gateway {
    /// Runs a closure under the state lock.
    pub fn with_state<R>(&self, f: impl FnOnce(&mut GatewayState) -> R) -> R {
        let mut guard = self.state.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut guard)
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    pub fn begin_shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}

/// The table of live, authenticated sessions.
#[derive(Default)]
pub struct SessionTable {
    next_id: u64,
    by_id: HashMap<u64, SessionHandle>,
}

impl SessionTable {
    pub fn allocate_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    /// Inserts an authenticated session. At most one session may exist per
    /// (local, remote) pair; the older one is returned for closing.
    pub fn insert(&mut self, handle: SessionHandle) -> Option<SessionHandle> {
        let stale = self
            .by_id
            .values()
            .find(|s| s.local == handle.local && s.remote == handle.remote)
            .map(|s| s.id);
        let evicted = stale.and_then(|id| self.by_id.remove(&id));
        self.by_id.insert(handle.id, handle);
        evicted
    }

    pub fn remove(&mut self, id: u64) -> Option<SessionHandle> {
        self.by_id.remove(&id)
    }

    pub fn get(&self, id: u64) -> Option<&SessionHandle> {
        self.by_id.get(&id)
    }

    pub fn contains(&self, id: u64) -> bool {
        self.by_id.contains_key(&id)
    }

    /// The authenticated session for a (local, remote) pair, if any.
    pub fn find(&self, local: &Principal, remote: &Principal) -> Option<SessionHandle> {
        self.by_id
            .values()
            .find(|s| &s.local == local && &s.remote == remote)
            .cloned()
    }

    /// All sessions owned by `local`, most recently used first.
    pub fn sessions_for(&self, local: &Principal) -> Vec<SessionHandle> {
        let mut out: Vec<SessionHandle> = self
            .by_id
            .values()
            .filter(|s| &s.local == local)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.last_used.cmp(&a.last_used));
        out
    }

    pub fn all(&self) -> Vec<SessionHandle> {
        self.by_id.values().cloned().collect()
    }

    pub fn touch(&mut self, id: u64) {
        if let Some(s) = self.by_id.get_mut(&id) {
            s.last_used = now_ms();
        }
    }

    /// Remote principals with a live session to `local`.
    pub fn connected_peers(&self, local: &Principal) -> Vec<Principal> {
        let mut out: Vec<Principal> = self
            .by_id
            .values()
            .filter(|s| &s.local == local)
            .map(|s| s.remote.clone())
            .collect();
        out.sort();
        out.dedup();
        out
    }
}

/// All mutable daemon state.
pub struct GatewayState {
    pub root: PathBuf,
    pub config: GatewayConfig,
    pub node_public_key: [u8; 32],
    pub listen_port: u16,
    pub identities: BTreeMap<Principal, IdentityEntry>,
    pub sessions: SessionTable,
    /// Outbox entries currently being delivered, so the retry tick does
    /// not double-send them.
    pub in_flight: HashSet<String>,
    events: broadcast::Sender<Event>,
}

impl GatewayState {
    pub fn new(
        root: PathBuf,
        config: GatewayConfig,
        node_public_key: [u8; 32],
        listen_port: u16,
        events: broadcast::Sender<Event>,
    ) -> Self {
        Self {
            root,
            config,
            node_public_key,
            listen_port,
            identities: BTreeMap::new(),
            sessions: SessionTable::default(),
            in_flight: HashSet::new(),
            events,
        }
    }

    /// Emits an event while the lock is held, so event order matches
    /// state-mutation order.
    pub fn emit(&self, event: Event) {
        let _ = self.events.send(event);
    }

    /// Principals of every loaded identity.
    pub fn local_principals(&self) -> Vec<Principal> {
        self.identities.keys().cloned().collect()
    }

    /// The default identity: the first autoloaded one in config order.
    pub fn default_principal(&self) -> Result<Principal, ControlError> {
        for cfg in &self.config.identities {
            if cfg.autoload && self.identities.contains_key(&cfg.principal) {
                return Ok(cfg.principal.clone());
            }
        }
        // Legacy / ad-hoc layouts: any loaded identity.
        self.identities
            .keys()
            .next()
            .cloned()
            .ok_or_else(|| ControlError::NoSuchIdentity("no identities loaded".into()))
    }

    /// Resolves a request's `as` field: an exact principal, a nick
    /// (case-sensitive exact match), or the default identity when absent.
    pub fn resolve_identity(&self, name: Option<&str>) -> Result<Principal, ControlError> {
        let Some(name) = name else {
            return self.default_principal();
        };
        if let Ok(p) = Principal::parse(name) {
            if self.identities.contains_key(&p) {
                return Ok(p);
            }
            return Err(ControlError::NoSuchIdentity(name.to_string()));
        }
        for (principal, entry) in &self.identities {
            if entry.identity.nick() == Some(name) {
                return Ok(principal.clone());
            }
        }
        Err(ControlError::NoSuchIdentity(name.to_string()))
    }

    pub fn entry(&self, principal: &Principal) -> Result<&IdentityEntry, ControlError> {
        self.identities
            .get(principal)
            .ok_or_else(|| ControlError::NoSuchIdentity(principal.as_str().to_string()))
    }

    pub fn entry_mut(&mut self, principal: &Principal) -> Result<&mut IdentityEntry, ControlError> {
        self.identities
            .get_mut(principal)
            .ok_or_else(|| ControlError::NoSuchIdentity(principal.as_str().to_string()))
    }

    /// Unloads an identity: its sessions close, its in-memory state drops.
    /// On-disk state stays for the next load.
    pub fn unload(&mut self, principal: &Principal) -> Result<(), ControlError> {
        self.identities
            .remove(principal)
            .ok_or_else(|| ControlError::NoSuchIdentity(principal.as_str().to_string()))?;
        for session in self.sessions.all() {
            if &session.local == principal {
                session.close();
            }
        }
        Ok(())
    }

    /// Multiaddrs this daemon can be reached at.
    pub fn multiaddrs(&self) -> Vec<String> {
        vec![format!("/ip4/127.0.0.1/tcp/{}", self.listen_port)]
    }
}
