// Path: crates/network/src/session.rs

//! The SNaP2P attestation handshake.
//!
//! A transport connection proves only node keys. The session handshake
//! binds *principals* to those node keys: each side sends a `hello` frame
//! carrying an attestation for its own node key, verifies the peer's
//! attestation, and additionally requires that the attested node key equal
//! the node key the transport reported for the remote end. Only then is
//! the remote principal trusted, and only then do application frames flow.
//!
//! The hello also advertises the sender's listen multiaddrs (an inbound
//! connection only reveals an ephemeral source port, which nobody can
//! dial back).

use crate::frames::Frame;
use crate::transport::TransportConn;
use claw_crypto::attestation::verify_attestation;
use claw_types::error::ProtocolError;
use claw_types::{Attestation, Principal};

/// What a completed handshake established.
#[derive(Debug, Clone)]
pub struct HandshakeOutcome {
    /// The principal bound to our end of this session.
    pub local: Principal,
    /// The authenticated remote principal.
    pub remote: Principal,
    /// The remote transport node key the attestation was checked against.
    pub remote_node_key: [u8; 32],
    /// Listen multiaddrs the remote advertised for itself. Advisory, like
    /// any address: only the attestation binding is trusted.
    pub remote_addrs: Vec<String>,
}

fn check_peer_attestation(
    att: &Attestation,
    conn: &TransportConn,
) -> Result<Principal, ProtocolError> {
    verify_attestation(att).map_err(|e| ProtocolError::AttestationRejected(e.to_string()))?;
    let attested = att
        .node_key_bytes()
        .ok_or_else(|| ProtocolError::AttestationRejected("unparseable node key".into()))?;
    if attested != conn.remote_node_key() {
        return Err(ProtocolError::AttestationRejected(
            "attested node key does not match transport".into(),
        ));
    }
    Ok(att.principal.clone())
}

async fn send_frame(conn: &mut TransportConn, frame: &Frame) -> Result<(), ProtocolError> {
    let bytes = frame.encode()?;
    conn.send(&bytes)
        .await
        .map_err(|e| ProtocolError::MalformedFrame(e.to_string()))
}

async fn recv_hello(
    conn: &mut TransportConn,
) -> Result<(Attestation, Vec<String>, Option<Principal>), ProtocolError> {
    let bytes = conn.recv().await.map_err(|_| ProtocolError::PeerClosed)?;
    match Frame::decode(&bytes)? {
        Frame::Hello {
            attestation,
            listen_addrs,
            target,
        } => Ok((attestation, listen_addrs, target)),
        other => Err(ProtocolError::UnexpectedFrame {
            got: other.kind().to_string(),
            phase: "handshaking".to_string(),
        }),
    }
}

/// Dialer side: sends our attestation (and the principal we want to reach),
/// then authenticates the peer's reply.
///
/// When `expect` is set, a peer authenticating as anyone else is an error;
/// the caller closes the stream.
pub async fn initiate(
    conn: &mut TransportConn,
    our_attestation: Attestation,
    our_addrs: Vec<String>,
    target: Option<Principal>,
    expect: Option<&Principal>,
) -> Result<HandshakeOutcome, ProtocolError> {
    let local = our_attestation.principal.clone();
    send_frame(
        conn,
        &Frame::Hello {
            attestation: our_attestation,
            listen_addrs: our_addrs,
            target,
        },
    )
    .await?;

    let (their_att, their_addrs, _) = recv_hello(conn).await?;
    let remote = check_peer_attestation(&their_att, conn)?;
    if let Some(expected) = expect {
        if &remote != expected {
            return Err(ProtocolError::AttestationRejected(format!(
                "authenticated as {remote}, wanted {expected}"
            )));
        }
    }
    Ok(HandshakeOutcome {
        local,
        remote,
        remote_node_key: conn.remote_node_key(),
        remote_addrs: their_addrs,
    })
}

/// Acceptor side: reads the dialer's hello first, asks the gateway for an
/// attestation matching the requested target identity, then replies.
///
/// `select` maps the dialer's requested target (if any) to one of the
/// gateway's loaded identities; returning an error closes the stream.
pub async fn accept<F>(
    conn: &mut TransportConn,
    our_addrs: Vec<String>,
    select: F,
) -> Result<HandshakeOutcome, ProtocolError>
where
    F: FnOnce(Option<&Principal>) -> Result<Attestation, ProtocolError>,
{
    let (their_att, their_addrs, target) = recv_hello(conn).await?;
    let remote = check_peer_attestation(&their_att, conn)?;

    let our_attestation = select(target.as_ref())?;
    let local = our_attestation.principal.clone();
    send_frame(
        conn,
        &Frame::Hello {
            attestation: our_attestation,
            listen_addrs: our_addrs,
            target: None,
        },
    )
    .await?;

    Ok(HandshakeOutcome {
        local,
        remote,
        remote_node_key: conn.remote_node_key(),
        remote_addrs: their_addrs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::Transport;
    use claw_crypto::attestation::create_attestation;
    use claw_crypto::Identity;
    use ed25519_dalek::SigningKey;

    async fn pair() -> (TransportConn, TransportConn) {
        let a_id = Identity::create_local(None);
        let b_id = Identity::create_local(None);
        let (server, mut inbound) = Transport::bind(b_id.node_key().clone(), 0).await.unwrap();
        let (client, _rx) = Transport::bind(a_id.node_key().clone(), 0).await.unwrap();
        let addr = format!("/ip4/127.0.0.1/tcp/{}", server.port());
        let dialed = client.dial(&addr).await.unwrap();
        let accepted = inbound.recv().await.unwrap();
        (dialed, accepted)
    }

    fn attestation_for(identity: &Identity, transport_key: &SigningKey) -> Attestation {
        create_attestation(identity, &transport_key.verifying_key().to_bytes(), None).unwrap()
    }

    #[tokio::test]
    async fn mutual_attestation_binds_principals() {
        let alice = Identity::create_local(None);
        let bob = Identity::create_local(None);

        let (a_transport, mut a_inbound) =
            Transport::bind(alice.node_key().clone(), 0).await.unwrap();
        let (b_transport, _b_inbound) =
            Transport::bind(bob.node_key().clone(), 0).await.unwrap();

        let addr = format!("/ip4/127.0.0.1/tcp/{}", a_transport.port());
        let bob_addr = format!("/ip4/127.0.0.1/tcp/{}", b_transport.port());
        let bob_att = create_attestation(&bob, &b_transport.node_public_key(), None).unwrap();
        let alice_att = create_attestation(&alice, &a_transport.node_public_key(), None).unwrap();
        let alice_principal = alice.principal();
        let bob_principal = bob.principal();

        let dial = tokio::spawn({
            let expect = alice_principal.clone();
            let bob_addr = bob_addr.clone();
            async move {
                let mut conn = b_transport.dial(&addr).await.unwrap();
                initiate(
                    &mut conn,
                    bob_att,
                    vec![bob_addr],
                    Some(expect.clone()),
                    Some(&expect),
                )
                .await
            }
        });

        let mut accepted = a_inbound.recv().await.unwrap();
        let accept_out = accept(&mut accepted, vec![], move |target| {
            assert_eq!(target, Some(&alice_principal));
            Ok(alice_att)
        })
        .await
        .unwrap();

        let dial_out = dial.await.unwrap().unwrap();
        assert_eq!(dial_out.remote, accept_out.local);
        assert_eq!(accept_out.remote, bob_principal);
        // The acceptor learned the dialer's advertised listen address.
        assert_eq!(accept_out.remote_addrs, vec![bob_addr]);
    }

    #[tokio::test]
    async fn attestation_for_a_different_node_key_is_rejected() {
        let alice = Identity::create_local(None);
        let bob = Identity::create_local(None);

        let (a_transport, mut a_inbound) =
            Transport::bind(alice.node_key().clone(), 0).await.unwrap();
        let (b_transport, _rx) = Transport::bind(bob.node_key().clone(), 0).await.unwrap();

        // Bob attests to a node key that is not the one his transport uses.
        let wrong_key = SigningKey::generate(&mut rand::rngs::OsRng);
        let bogus_att = attestation_for(&bob, &wrong_key);
        let alice_att = create_attestation(&alice, &a_transport.node_public_key(), None).unwrap();

        let addr = format!("/ip4/127.0.0.1/tcp/{}", a_transport.port());
        let dial = tokio::spawn(async move {
            let mut conn = b_transport.dial(&addr).await.unwrap();
            initiate(&mut conn, bogus_att, vec![], None, None).await
        });

        let mut accepted = a_inbound.recv().await.unwrap();
        let res = accept(&mut accepted, vec![], move |_| Ok(alice_att)).await;
        assert!(matches!(res, Err(ProtocolError::AttestationRejected(_))));
        // The dialer sees its stream die rather than an authenticated peer.
        assert!(dial.await.unwrap().is_err());
    }

    #[tokio::test]
    async fn non_hello_first_frame_is_rejected() {
        let (mut dialed, mut accepted) = pair().await;
        let rogue = Frame::Chat {
            id: "a".repeat(32),
            content: "premature".into(),
            ts: 0,
            from_nick: None,
        };
        dialed.send(&rogue.encode().unwrap()).await.unwrap();

        let someone = Identity::create_local(None);
        let att = attestation_for(&someone, someone.node_key());
        let res = accept(&mut accepted, vec![], move |_| Ok(att)).await;
        assert!(matches!(res, Err(ProtocolError::UnexpectedFrame { .. })));
    }
}
