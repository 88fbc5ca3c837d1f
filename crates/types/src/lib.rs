// Path: crates/types/src/lib.rs
#![forbid(unsafe_code)]

//! # clawchat core types
//!
//! Data structures shared by every crate in the workspace: principals and
//! identity metadata, attestation records, messages and mailbox statuses,
//! peer records, gateway configuration, the IPC wire protocol, and the
//! error taxonomy. Keeping them in one leaf crate prevents divergent
//! serialized representations of the same data across components.

pub mod addr;
pub mod attestation;
pub mod config;
pub mod error;
pub mod ipc;
pub mod message;
pub mod peer;
pub mod principal;
pub mod time;

pub use attestation::Attestation;
pub use message::{Message, MessageStatus};
pub use peer::{PeerRecord, Visibility};
pub use principal::{IdentityMode, Principal};
