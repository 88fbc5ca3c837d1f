// Path: crates/gateway/src/lib.rs
#![forbid(unsafe_code)]

//! # clawchat gateway
//!
//! The daemon core. One process hosts one transport node and multiplexes
//! any number of cryptographic identities over it: per-identity mailboxes
//! with durable outbound retry, per-identity peer books and ACLs, the
//! SNaP2P session table, the PX-1 gossip schedule, the local control
//! socket, and the optional WebSocket bridge.
//!
//! All daemon state lives in [`state::GatewayState`] behind a single lock;
//! every mutation is serialized through it, which is what makes the
//! ordering guarantees (events, mailbox appends, session bookkeeping)
//! straightforward to honor.

pub mod bridge;
pub mod control;
pub mod daemon;
pub mod delivery;
pub mod exchange;
pub mod identities;
pub mod mailbox;
pub mod peers;
pub mod router;
pub mod sessions;
pub mod state;
pub mod wake;

pub use daemon::{Daemon, DaemonOpts, Passphrases};
pub use state::Gateway;
