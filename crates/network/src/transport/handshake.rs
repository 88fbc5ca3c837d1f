// Path: crates/network/src/transport/handshake.rs

//! The node-key handshake run on every new TCP connection.
//!
//! Both sides exchange a hello of `node_pub(32) || eph_x25519_pub(32)`,
//! derive a shared secret from the ephemeral keys, and prove ownership of
//! their static node key by signing the transcript hash (role-separated so
//! a signature cannot be reflected back). Direction keys are derived from
//! the shared secret and the transcript:
//!
//! ```text
//! transcript = SHA-256("clawchat-transport-v1" || hello_i || hello_r)
//! k_i2r      = SHA-256(shared || transcript || "i2r")
//! k_r2i      = SHA-256(shared || transcript || "r2i")
//! ```

use super::conn::TransportConn;
use claw_types::error::TransportError;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use x25519_dalek::{EphemeralSecret, PublicKey};

const PROTOCOL_LABEL: &[u8] = b"clawchat-transport-v1";
const ROLE_INITIATOR: u8 = b'I';
const ROLE_RESPONDER: u8 = b'R';
const HELLO_LEN: usize = 64;
const SIG_LEN: usize = 64;

struct Exchange {
    remote_node_key: [u8; 32],
    key_i2r: [u8; 32],
    key_r2i: [u8; 32],
}

fn derive_key(shared: &[u8], transcript: &[u8; 32], label: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(shared);
    hasher.update(transcript);
    hasher.update(label);
    hasher.finalize().into()
}

async fn run_exchange(
    node_key: &SigningKey,
    stream: &mut TcpStream,
    initiator: bool,
) -> Result<Exchange, TransportError> {
    let eph_secret = EphemeralSecret::random_from_rng(OsRng);
    let eph_public = PublicKey::from(&eph_secret);

    let mut our_hello = [0u8; HELLO_LEN];
    our_hello[..32].copy_from_slice(&node_key.verifying_key().to_bytes());
    our_hello[32..].copy_from_slice(eph_public.as_bytes());

    stream
        .write_all(&our_hello)
        .await
        .map_err(|e| TransportError::Handshake(e.to_string()))?;
    let mut their_hello = [0u8; HELLO_LEN];
    stream
        .read_exact(&mut their_hello)
        .await
        .map_err(|e| TransportError::Handshake(e.to_string()))?;

    let remote_node_key: [u8; 32] = their_hello[..32]
        .try_into()
        .map_err(|_| TransportError::Handshake("short hello".into()))?;
    let remote_eph: [u8; 32] = their_hello[32..]
        .try_into()
        .map_err(|_| TransportError::Handshake("short hello".into()))?;
    let remote_verifying = VerifyingKey::from_bytes(&remote_node_key)
        .map_err(|_| TransportError::Handshake("invalid remote node key".into()))?;

    let shared = eph_secret.diffie_hellman(&PublicKey::from(remote_eph));

    let mut hasher = Sha256::new();
    hasher.update(PROTOCOL_LABEL);
    if initiator {
        hasher.update(our_hello);
        hasher.update(their_hello);
    } else {
        hasher.update(their_hello);
        hasher.update(our_hello);
    }
    let transcript: [u8; 32] = hasher.finalize().into();

    // Prove ownership of the static key; the role byte stops reflection.
    let our_role = if initiator { ROLE_INITIATOR } else { ROLE_RESPONDER };
    let their_role = if initiator { ROLE_RESPONDER } else { ROLE_INITIATOR };
    let mut to_sign = Vec::with_capacity(33);
    to_sign.extend_from_slice(&transcript);
    to_sign.push(our_role);
    let our_sig = node_key.sign(&to_sign);

    stream
        .write_all(&our_sig.to_bytes())
        .await
        .map_err(|e| TransportError::Handshake(e.to_string()))?;
    let mut their_sig = [0u8; SIG_LEN];
    stream
        .read_exact(&mut their_sig)
        .await
        .map_err(|e| TransportError::Handshake(e.to_string()))?;

    let mut their_signed = Vec::with_capacity(33);
    their_signed.extend_from_slice(&transcript);
    their_signed.push(their_role);
    remote_verifying
        .verify(&their_signed, &Signature::from_bytes(&their_sig))
        .map_err(|_| TransportError::Handshake("node-key signature mismatch".into()))?;

    Ok(Exchange {
        remote_node_key,
        key_i2r: derive_key(shared.as_bytes(), &transcript, b"i2r"),
        key_r2i: derive_key(shared.as_bytes(), &transcript, b"r2i"),
    })
}

/// Client side of the handshake.
pub async fn initiate(
    node_key: &SigningKey,
    mut stream: TcpStream,
) -> Result<TransportConn, TransportError> {
    stream.set_nodelay(true).ok();
    let ex = run_exchange(node_key, &mut stream, true).await?;
    let (read, write) = stream.into_split();
    Ok(TransportConn::new(
        ex.remote_node_key,
        read,
        write,
        &ex.key_i2r,
        &ex.key_r2i,
    ))
}

/// Server side of the handshake.
pub async fn accept(
    node_key: &SigningKey,
    mut stream: TcpStream,
) -> Result<TransportConn, TransportError> {
    stream.set_nodelay(true).ok();
    let ex = run_exchange(node_key, &mut stream, false).await?;
    let (read, write) = stream.into_split();
    Ok(TransportConn::new(
        ex.remote_node_key,
        read,
        write,
        &ex.key_r2i,
        &ex.key_i2r,
    ))
}
