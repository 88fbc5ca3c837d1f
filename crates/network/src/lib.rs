// Path: crates/network/src/lib.rs
#![forbid(unsafe_code)]

//! # clawchat networking
//!
//! Three layers, bottom up:
//!
//! 1. [`transport`]: the stand-in for the external transport stack. TCP
//!    connections whose setup mutually authenticates 32-byte Ed25519 node
//!    keys and encrypts everything after; peers are addressed by multiaddr.
//! 2. [`frames`]: SNaP2P frames, length-prefixed JSON records riding on
//!    transport records with per-type size caps.
//! 3. [`session`] and [`px`]: the SNaP2P attestation handshake binding
//!    principals to node keys, and the PX-1 peer-exchange records gossiped
//!    over authenticated sessions.

pub mod frames;
pub mod px;
pub mod session;
pub mod transport;

pub use frames::Frame;
pub use session::HandshakeOutcome;
pub use transport::{ConnReceiver, ConnSender, Transport, TransportConn};
