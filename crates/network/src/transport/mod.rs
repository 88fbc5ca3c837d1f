// Path: crates/network/src/transport/mod.rs

//! The in-tree transport adapter.
//!
//! The session layer assumes only the external-transport contract:
//! bidirectional authenticated byte streams between peers identified by a
//! stable 32-byte node public key, addressed by multiaddr. This module is
//! the minimal adapter satisfying it: plain TCP, a mutual node-key
//! handshake on connect (X25519 ephemeral exchange signed by both static
//! Ed25519 node keys), and ChaCha20-Poly1305 record encryption after.
//! Relaying, NAT traversal and stream multiplexing stay out of scope.

mod conn;
mod handshake;

pub use conn::{ConnReceiver, ConnSender, TransportConn, MAX_RECORD_LEN};

use claw_types::addr;
use claw_types::error::TransportError;
use ed25519_dalek::SigningKey;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::Duration;

/// Deadline covering dial plus node-key handshake.
pub const DIAL_TIMEOUT: Duration = Duration::from_secs(10);

/// One transport node: a stable node keypair plus a TCP listener.
pub struct Transport {
    node_key: Arc<SigningKey>,
    local_addr: SocketAddr,
}

impl Transport {
    /// Binds the listener and starts accepting; inbound connections that
    /// complete the node-key handshake arrive on the returned channel.
    pub async fn bind(
        node_key: SigningKey,
        port: u16,
    ) -> Result<(Self, mpsc::Receiver<TransportConn>), TransportError> {
        let listener = TcpListener::bind(("0.0.0.0", port))
            .await
            .map_err(|e| TransportError::Dial(format!("bind failed: {e}")))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| TransportError::Stream(e.to_string()))?;
        let node_key = Arc::new(node_key);
        let (tx, rx) = mpsc::channel(16);

        let accept_key = node_key.clone();
        let closed_tx = tx.clone();
        tokio::spawn(async move {
            loop {
                // Dropping the inbound receiver releases the listener (and
                // the port) with it.
                let accepted = tokio::select! {
                    _ = closed_tx.closed() => break,
                    accepted = listener.accept() => accepted,
                };
                let (stream, remote) = match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        tracing::warn!(target: "transport", event = "accept_fail", error = %e);
                        continue;
                    }
                };
                let key = accept_key.clone();
                let tx = tx.clone();
                tokio::spawn(async move {
                    let res = tokio::time::timeout(
                        DIAL_TIMEOUT,
                        handshake::accept(&key, stream),
                    )
                    .await;
                    match res {
                        Ok(Ok(conn)) => {
                            tracing::debug!(target: "transport", event = "inbound", %remote, peer = %hex::encode(conn.remote_node_key()));
                            // Receiver gone means the daemon is shutting down.
                            let _ = tx.send(conn).await;
                        }
                        Ok(Err(e)) => {
                            tracing::debug!(target: "transport", event = "inbound_handshake_fail", %remote, error = %e);
                        }
                        Err(_) => {
                            tracing::debug!(target: "transport", event = "inbound_handshake_timeout", %remote);
                        }
                    }
                });
            }
        });

        Ok((
            Self {
                node_key,
                local_addr,
            },
            rx,
        ))
    }

    /// The transport node's public key.
    pub fn node_public_key(&self) -> [u8; 32] {
        self.node_key.verifying_key().to_bytes()
    }

    /// The bound listen port (useful when binding port 0 in tests).
    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// Dials a multiaddr and runs the node-key handshake, all within
    /// [`DIAL_TIMEOUT`].
    pub async fn dial(&self, multiaddr: &str) -> Result<TransportConn, TransportError> {
        let (host, port) = addr::dial_target(multiaddr)?;
        let node_key = self.node_key.clone();
        let fut = async move {
            let stream = TcpStream::connect((host.as_str(), port))
                .await
                .map_err(|e| TransportError::Dial(format!("{host}:{port}: {e}")))?;
            handshake::initiate(&node_key, stream).await
        };
        let mut conn = tokio::time::timeout(DIAL_TIMEOUT, fut)
            .await
            .map_err(|_| TransportError::Timeout)??;
        conn.set_dialed_addr(multiaddr.to_string());
        Ok(conn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    fn key() -> SigningKey {
        SigningKey::generate(&mut OsRng)
    }

    #[tokio::test]
    async fn dial_and_exchange_records() {
        let (server, mut inbound) = Transport::bind(key(), 0).await.unwrap();
        let (client, _inbound_b) = Transport::bind(key(), 0).await.unwrap();
        let server_pk = server.node_public_key();
        let client_pk = client.node_public_key();

        let addr = format!("/ip4/127.0.0.1/tcp/{}", server.port());
        let mut conn = client.dial(&addr).await.unwrap();
        assert_eq!(conn.remote_node_key(), server_pk);

        let mut accepted = inbound.recv().await.unwrap();
        assert_eq!(accepted.remote_node_key(), client_pk);

        conn.send(b"ping over the mesh").await.unwrap();
        assert_eq!(accepted.recv().await.unwrap(), b"ping over the mesh");

        accepted.send(b"pong").await.unwrap();
        assert_eq!(conn.recv().await.unwrap(), b"pong");
    }

    #[tokio::test]
    async fn records_are_not_plaintext_on_the_wire() {
        // A raw TCP peer that never speaks the handshake gets nothing
        // readable and the handshake fails.
        let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            use tokio::io::AsyncWriteExt;
            let _ = stream.write_all(&[0u8; 16]).await;
        });

        let (client, _rx) = Transport::bind(key(), 0).await.unwrap();
        let res = client.dial(&format!("/ip4/127.0.0.1/tcp/{port}")).await;
        assert!(res.is_err());
    }

    #[tokio::test]
    async fn dialing_a_dead_port_fails_fast() {
        let (client, _rx) = Transport::bind(key(), 0).await.unwrap();
        // Bind-then-drop to find a port nothing listens on.
        let port = {
            let l = std::net::TcpListener::bind(("127.0.0.1", 0)).unwrap();
            l.local_addr().unwrap().port()
        };
        let res = client.dial(&format!("/ip4/127.0.0.1/tcp/{port}")).await;
        assert!(res.is_err());
    }
}
