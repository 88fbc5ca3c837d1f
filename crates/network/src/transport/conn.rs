// Path: crates/network/src/transport/conn.rs

//! Encrypted record framing over an authenticated TCP connection.
//!
//! Wire format per record: `u32_be(len) || ciphertext`, where the
//! ciphertext is ChaCha20-Poly1305 of the payload under the direction key,
//! with the record counter as nonce. Counters start at zero per direction;
//! a reordered or replayed record therefore fails authentication.

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use claw_types::error::TransportError;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};

/// Upper bound for one transport record (ciphertext length).
pub const MAX_RECORD_LEN: usize = 1024 * 1024;

/// Sending half of a connection.
pub struct ConnSender {
    write: OwnedWriteHalf,
    cipher: ChaCha20Poly1305,
    counter: u64,
}

/// Receiving half of a connection.
pub struct ConnReceiver {
    read: OwnedReadHalf,
    cipher: ChaCha20Poly1305,
    counter: u64,
}

/// An authenticated, encrypted, record-oriented connection.
pub struct TransportConn {
    remote_node_key: [u8; 32],
    dialed_addr: Option<String>,
    sender: ConnSender,
    receiver: ConnReceiver,
}

fn nonce_for(counter: u64) -> Nonce {
    let mut bytes = [0u8; 12];
    bytes[..8].copy_from_slice(&counter.to_be_bytes());
    Nonce::from(bytes)
}

impl ConnSender {
    pub(crate) fn new(write: OwnedWriteHalf, key: &[u8; 32]) -> Self {
        Self {
            write,
            cipher: ChaCha20Poly1305::new(Key::from_slice(key)),
            counter: 0,
        }
    }

    pub async fn send(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        let ciphertext = self
            .cipher
            .encrypt(&nonce_for(self.counter), payload)
            .map_err(|_| TransportError::Stream("record seal failed".into()))?;
        if ciphertext.len() > MAX_RECORD_LEN {
            return Err(TransportError::Oversize {
                got: ciphertext.len(),
                max: MAX_RECORD_LEN,
            });
        }
        self.counter += 1;
        self.write
            .write_all(&(ciphertext.len() as u32).to_be_bytes())
            .await
            .map_err(|e| TransportError::Stream(e.to_string()))?;
        self.write
            .write_all(&ciphertext)
            .await
            .map_err(|e| TransportError::Stream(e.to_string()))?;
        self.write
            .flush()
            .await
            .map_err(|e| TransportError::Stream(e.to_string()))
    }
}

impl ConnReceiver {
    pub(crate) fn new(read: OwnedReadHalf, key: &[u8; 32]) -> Self {
        Self {
            read,
            cipher: ChaCha20Poly1305::new(Key::from_slice(key)),
            counter: 0,
        }
    }

    pub async fn recv(&mut self) -> Result<Vec<u8>, TransportError> {
        let mut len_bytes = [0u8; 4];
        self.read
            .read_exact(&mut len_bytes)
            .await
            .map_err(|e| TransportError::Stream(e.to_string()))?;
        let len = u32::from_be_bytes(len_bytes) as usize;
        if len > MAX_RECORD_LEN {
            return Err(TransportError::Oversize {
                got: len,
                max: MAX_RECORD_LEN,
            });
        }
        let mut ciphertext = vec![0u8; len];
        self.read
            .read_exact(&mut ciphertext)
            .await
            .map_err(|e| TransportError::Stream(e.to_string()))?;
        let plaintext = self
            .cipher
            .decrypt(&nonce_for(self.counter), ciphertext.as_slice())
            .map_err(|_| TransportError::Stream("record authentication failed".into()))?;
        self.counter += 1;
        Ok(plaintext)
    }
}

impl TransportConn {
    pub(crate) fn new(
        remote_node_key: [u8; 32],
        read: OwnedReadHalf,
        write: OwnedWriteHalf,
        send_key: &[u8; 32],
        recv_key: &[u8; 32],
    ) -> Self {
        Self {
            remote_node_key,
            dialed_addr: None,
            sender: ConnSender::new(write, send_key),
            receiver: ConnReceiver::new(read, recv_key),
        }
    }

    /// The verified 32-byte node public key of the remote end.
    pub fn remote_node_key(&self) -> [u8; 32] {
        self.remote_node_key
    }

    /// The multiaddr this connection was dialed at, when outbound.
    pub fn dialed_addr(&self) -> Option<&str> {
        self.dialed_addr.as_deref()
    }

    pub(crate) fn set_dialed_addr(&mut self, addr: String) {
        self.dialed_addr = Some(addr);
    }

    pub async fn send(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        self.sender.send(payload).await
    }

    pub async fn recv(&mut self) -> Result<Vec<u8>, TransportError> {
        self.receiver.recv().await
    }

    /// Splits into independently owned halves for a reader task and
    /// writer handles.
    pub fn split(self) -> (ConnSender, ConnReceiver) {
        (self.sender, self.receiver)
    }
}
