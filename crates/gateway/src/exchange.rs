// Path: crates/gateway/src/exchange.rs

//! PX-1 scheduling: push on every new session, broadcast every minute,
//! and targeted resolution over live sessions.

use crate::sessions::SessionHandle;
use crate::state::Gateway;
use claw_network::frames::PxPeer;
use claw_network::px;
use claw_network::Frame;
use claw_types::Principal;
use tokio::sync::oneshot;
use tokio::time::{interval, timeout, Duration, MissedTickBehavior};

/// Period of the PX broadcast to all authenticated sessions.
pub const BROADCAST_PERIOD: Duration = Duration::from_secs(60);

/// Deadline for one targeted resolve over one session.
const RESOLVE_TIMEOUT: Duration = Duration::from_secs(10);

/// Sends one PX push to a session: the verified, shareable slice of the
/// owning identity's peer book, minus the recipient itself.
pub async fn push_to_session(gw: &Gateway, handle: &SessionHandle) {
    let peers: Vec<PxPeer> = gw.with_state(|state| {
        state
            .entry(&handle.local)
            .map(|entry| {
                px::select_for_push(entry.peers.records())
                    .into_iter()
                    .filter(|r| r.principal != handle.remote)
                    .collect()
            })
            .unwrap_or_default()
    });
    if peers.is_empty() {
        return;
    }
    let count = peers.len();
    if let Err(e) = handle.send_frame(&Frame::PxPush { peers }).await {
        tracing::debug!(target: "px", event = "push_fail", id = handle.id, error = %e);
    } else {
        tracing::debug!(target: "px", event = "pushed", id = handle.id, count);
    }
}

/// The 60-second PX broadcast loop.
pub fn spawn_broadcast(gw: Gateway) -> tokio::task::JoinHandle<()> {
    let mut shutdown = gw.shutdown_signal();
    tokio::spawn(async move {
        let mut ticker = interval(BROADCAST_PERIOD);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The immediate first tick duplicates the on-session push; skip it.
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    let sessions = gw.with_state(|state| state.sessions.all());
                    for handle in sessions {
                        push_to_session(&gw, &handle).await;
                    }
                }
            }
        }
    })
}

/// Best-effort resolution of a principal's contact record through live
/// sessions of `local`, most recently used first. `through` restricts the
/// query to the session with that remote.
pub async fn resolve(
    gw: &Gateway,
    local: &Principal,
    target: &Principal,
    through: Option<&Principal>,
) -> Option<PxPeer> {
    let sessions = gw.with_state(|state| state.sessions.sessions_for(local));
    for handle in sessions {
        if let Some(through) = through {
            if &handle.remote != through {
                continue;
            }
        } else if &handle.remote == target {
            // Without an explicit relay there is no point asking a peer
            // about itself; we already hold its session.
            continue;
        }
        let (tx, rx) = oneshot::channel();
        handle
            .px_waiters
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(tx);
        if handle
            .send_frame(&Frame::PxRequest {
                principal: target.clone(),
            })
            .await
            .is_err()
        {
            // Drop our waiter again; the send never went out.
            let _ = handle
                .px_waiters
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .pop_back();
            continue;
        }
        match timeout(RESOLVE_TIMEOUT, rx).await {
            Ok(Ok(Some(peer))) => {
                gw.with_state(|state| {
                    let locals = state.local_principals();
                    if let Ok(entry) = state.entry_mut(local) {
                        if let Err(e) =
                            entry
                                .peers
                                .merge_push(std::slice::from_ref(&peer), &handle.remote, &locals)
                        {
                            tracing::warn!(target: "px", event = "resolve_merge_fail", error = %e);
                        }
                    }
                });
                return Some(peer);
            }
            Ok(Ok(None)) | Ok(Err(_)) => continue,
            Err(_) => {
                tracing::debug!(target: "px", event = "resolve_timeout", id = handle.id);
                continue;
            }
        }
    }
    None
}
