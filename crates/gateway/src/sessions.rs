// Path: crates/gateway/src/sessions.rs

//! Session runtime: handshakes, the per-session frame loop, and the
//! bookkeeping that keeps at most one authenticated session per
//! (local identity, remote principal) pair.

use crate::router;
use crate::state::Gateway;
use claw_crypto::attestation::create_attestation;
use claw_network::frames::PxPeer;
use claw_network::{session, ConnReceiver, ConnSender, Frame, TransportConn};
use claw_types::error::ProtocolError;
use claw_types::ipc::Event;
use claw_types::time::now_ms;
use claw_types::Principal;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{oneshot, Notify};
use tokio::time::{timeout, Duration};

/// Deadline for a dial-side or accept-side SNaP2P handshake.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Deadline for pushing one frame into a session.
pub const SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Serialized writer for one session's frames.
pub struct FrameWriter {
    sender: ConnSender,
    seq: u64,
}

impl FrameWriter {
    fn new(sender: ConnSender) -> Self {
        Self { sender, seq: 0 }
    }

    pub async fn send(&mut self, frame: &Frame) -> Result<(), ProtocolError> {
        let bytes = frame.encode()?;
        self.sender
            .send(&bytes)
            .await
            .map_err(|e| ProtocolError::MalformedFrame(e.to_string()))?;
        self.seq += 1;
        Ok(())
    }

    /// Frames sent on this session so far.
    pub fn seq(&self) -> u64 {
        self.seq
    }
}

/// Shared handle to one authenticated session.
#[derive(Clone)]
pub struct SessionHandle {
    pub id: u64,
    pub local: Principal,
    pub remote: Principal,
    pub remote_node_key: [u8; 32],
    pub created_at: u64,
    pub last_used: u64,
    pub writer: Arc<tokio::sync::Mutex<FrameWriter>>,
    pub closer: Arc<Notify>,
    /// FIFO of outstanding PX-1 resolve calls on this session; responses
    /// arrive in order because frames within a session are ordered.
    pub px_waiters: Arc<StdMutex<VecDeque<oneshot::Sender<Option<PxPeer>>>>>,
}

impl SessionHandle {
    /// Sends one frame with the session send deadline.
    pub async fn send_frame(&self, frame: &Frame) -> Result<(), ProtocolError> {
        let mut writer = self.writer.lock().await;
        timeout(SEND_TIMEOUT, writer.send(frame))
            .await
            .map_err(|_| ProtocolError::MalformedFrame("send timed out".into()))?
    }

    pub fn close(&self) {
        self.closer.notify_one();
    }
}

/// Drives an inbound transport connection: SNaP2P accept handshake, then
/// the frame loop until either side closes.
pub async fn run_inbound(gw: Gateway, mut conn: TransportConn) {
    let our_addrs = gw.with_state(|state| state.multiaddrs());
    let handshake = timeout(HANDSHAKE_TIMEOUT, session::accept(&mut conn, our_addrs, |target| {
        gw.with_state(|state| {
            let principal = match target {
                Some(t) => {
                    if !state.identities.contains_key(t) {
                        return Err(ProtocolError::AttestationRejected(format!(
                            "no such identity here: {t}"
                        )));
                    }
                    t.clone()
                }
                None => state
                    .default_principal()
                    .map_err(|e| ProtocolError::AttestationRejected(e.to_string()))?,
            };
            let entry = state
                .entry(&principal)
                .map_err(|e| ProtocolError::AttestationRejected(e.to_string()))?;
            create_attestation(&entry.identity, &state.node_public_key, None)
                .map_err(|e| ProtocolError::AttestationRejected(e.to_string()))
        })
    }))
    .await;

    let outcome = match handshake {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(e)) => {
            tracing::debug!(target: "session", event = "inbound_auth_fail", error = %e);
            return;
        }
        Err(_) => {
            tracing::debug!(target: "session", event = "inbound_handshake_timeout");
            return;
        }
    };

    let dialed_addr = conn.dialed_addr().map(str::to_string);
    let remote_node_key = conn.remote_node_key();
    let (sender, receiver) = conn.split();
    let handle = register(&gw, &outcome, dialed_addr, remote_node_key, sender);
    run_frame_loop(gw, handle, receiver).await;
}

/// Dials out as `local`, expecting to authenticate `expect` at the far
/// end. On success the session is registered and its frame loop spawned;
/// the returned handle is immediately usable for sending.
pub async fn connect_outbound(
    gw: &Gateway,
    local: &Principal,
    addr: &str,
    expect: Option<&Principal>,
) -> Result<SessionHandle, ProtocolError> {
    let (attestation, our_addrs) = gw.with_state(|state| {
        let entry = state
            .entry(local)
            .map_err(|e| ProtocolError::AttestationRejected(e.to_string()))?;
        let att = create_attestation(&entry.identity, &state.node_public_key, None)
            .map_err(|e| ProtocolError::AttestationRejected(e.to_string()))?;
        Ok::<_, ProtocolError>((att, state.multiaddrs()))
    })?;

    let mut conn = gw
        .transport
        .dial(addr)
        .await
        .map_err(|e| ProtocolError::MalformedFrame(e.to_string()))?;

    let outcome = timeout(
        HANDSHAKE_TIMEOUT,
        session::initiate(&mut conn, attestation, our_addrs, expect.cloned(), expect),
    )
    .await
    .map_err(|_| ProtocolError::MalformedFrame("handshake timed out".into()))??;

    let dialed_addr = conn.dialed_addr().map(str::to_string);
    let remote_node_key = conn.remote_node_key();
    let (sender, receiver) = conn.split();
    let handle = register(gw, &outcome, dialed_addr, remote_node_key, sender);

    let loop_gw = gw.clone();
    let loop_handle = handle.clone();
    tokio::spawn(async move {
        run_frame_loop(loop_gw, loop_handle, receiver).await;
    });
    Ok(handle)
}

/// Registers an authenticated session: evicts any older session for the
/// same pair, upgrades the peer book entry to verified, and announces the
/// connection.
fn register(
    gw: &Gateway,
    outcome: &session::HandshakeOutcome,
    dialed_addr: Option<String>,
    remote_node_key: [u8; 32],
    sender: ConnSender,
) -> SessionHandle {
    gw.with_state(|state| {
        let id = state.sessions.allocate_id();
        let now = now_ms();
        let handle = SessionHandle {
            id,
            local: outcome.local.clone(),
            remote: outcome.remote.clone(),
            remote_node_key,
            created_at: now,
            last_used: now,
            writer: Arc::new(tokio::sync::Mutex::new(FrameWriter::new(sender))),
            closer: Arc::new(Notify::new()),
            px_waiters: Arc::new(StdMutex::new(VecDeque::new())),
        };
        if let Some(older) = state.sessions.insert(handle.clone()) {
            tracing::debug!(target: "session", event = "duplicate_evicted", id = older.id, remote = %older.remote);
            older.close();
        }
        if let Ok(entry) = state.entry_mut(&outcome.local) {
            if let Err(e) = entry.peers.mark_verified(
                &outcome.remote,
                remote_node_key,
                dialed_addr.as_deref(),
            ) {
                tracing::warn!(target: "session", event = "peer_book_write_fail", error = %e);
            }
            if let Err(e) = entry
                .peers
                .merge_addresses(&outcome.remote, &outcome.remote_addrs)
            {
                tracing::warn!(target: "session", event = "peer_book_write_fail", error = %e);
            }
        }
        state.emit(Event::Connected {
            identity: outcome.local.clone(),
            peer: outcome.remote.clone(),
        });
        tracing::info!(
            target: "session",
            event = "authenticated",
            id,
            local = %outcome.local,
            remote = %outcome.remote,
        );
        handle
    })
}

/// Reads frames until close, dispatching each in arrival order.
async fn run_frame_loop(gw: Gateway, handle: SessionHandle, mut receiver: ConnReceiver) {
    // First PX push happens on every new authenticated session.
    crate::exchange::push_to_session(&gw, &handle).await;

    loop {
        tokio::select! {
            _ = handle.closer.notified() => break,
            record = receiver.recv() => {
                let bytes = match record {
                    Ok(b) => b,
                    Err(e) => {
                        tracing::debug!(target: "session", event = "read_error", id = handle.id, error = %e);
                        break;
                    }
                };
                let frame = match Frame::decode(&bytes) {
                    Ok(f) => f,
                    Err(e) => {
                        tracing::warn!(target: "session", event = "bad_frame", id = handle.id, error = %e);
                        break;
                    }
                };
                gw.with_state(|state| state.sessions.touch(handle.id));
                if let Err(e) = dispatch_frame(&gw, &handle, frame).await {
                    tracing::warn!(target: "session", event = "dispatch_fail", id = handle.id, error = %e);
                    break;
                }
            }
        }
    }

    // Flush any waiters still hoping for a PX response.
    let waiters: Vec<_> = {
        let mut guard = handle.px_waiters.lock().unwrap_or_else(|e| e.into_inner());
        guard.drain(..).collect()
    };
    for waiter in waiters {
        let _ = waiter.send(None);
    }

    gw.with_state(|state| {
        // The table may already hold a replacement session for this pair;
        // only announce the close when this one is still current.
        if state.sessions.remove(handle.id).is_some() {
            state.emit(Event::Disconnected {
                identity: handle.local.clone(),
                peer: handle.remote.clone(),
            });
        }
    });
    tracing::info!(target: "session", event = "closed", id = handle.id, remote = %handle.remote);
}

async fn dispatch_frame(
    gw: &Gateway,
    handle: &SessionHandle,
    frame: Frame,
) -> Result<(), ProtocolError> {
    match frame {
        Frame::Hello { .. } => Err(ProtocolError::UnexpectedFrame {
            got: "hello".into(),
            phase: "authenticated".into(),
        }),
        Frame::Chat {
            id,
            content,
            ts,
            from_nick,
        } => {
            router::handle_inbound(gw, handle, id, content, ts, from_nick);
            Ok(())
        }
        Frame::PxPush { peers } => {
            gw.with_state(|state| {
                let locals = state.local_principals();
                if let Ok(entry) = state.entry_mut(&handle.local) {
                    match entry.peers.merge_push(&peers, &handle.remote, &locals) {
                        Ok(changed) if changed > 0 => {
                            tracing::debug!(target: "px", event = "merged", from = %handle.remote, changed);
                        }
                        Ok(_) => {}
                        Err(e) => {
                            tracing::warn!(target: "px", event = "merge_persist_fail", error = %e);
                        }
                    }
                }
            });
            Ok(())
        }
        Frame::PxRequest { principal } => {
            let peer = gw.with_state(|state| {
                state.entry(&handle.local).ok().and_then(|entry| {
                    entry.peers.get(&principal).and_then(|rec| {
                        if rec.visibility == claw_types::Visibility::Private {
                            None
                        } else {
                            Some(claw_network::px::to_wire(rec))
                        }
                    })
                })
            });
            handle.send_frame(&Frame::PxResponse { peer }).await
        }
        Frame::PxResponse { peer } => {
            let waiter = {
                let mut guard = handle.px_waiters.lock().unwrap_or_else(|e| e.into_inner());
                guard.pop_front()
            };
            match waiter {
                Some(tx) => {
                    let _ = tx.send(peer);
                }
                None => {
                    tracing::debug!(target: "px", event = "unsolicited_response", id = handle.id);
                }
            }
            Ok(())
        }
    }
}
