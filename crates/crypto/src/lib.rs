// Path: crates/crypto/src/lib.rs
#![forbid(unsafe_code)]

//! # clawchat identity cryptography
//!
//! The identity store: key generation for both identity modes, encrypted
//! at-rest persistence, mode-dispatched signing, and node-key attestations.
//!
//! Identity files use the construction
//! `version(1) || salt(16) || nonce(12) || ciphertext`, where the key is an
//! Argon2id hash of the passphrase and the ciphertext is ChaCha20-Poly1305
//! over a canonical JSON serialization of the identity.

pub mod attestation;
pub mod identity;
pub mod store;

#[cfg(feature = "stacks")]
pub mod stacks;

pub use attestation::{create_attestation, verify_attestation, DEFAULT_VALIDITY_SECS};
pub use identity::{Identity, IdentityDocument};
pub use store::IdentityStore;

/// A transport node keypair: Ed25519, the key that terminates sessions.
pub type NodeKeypair = ed25519_dalek::SigningKey;
