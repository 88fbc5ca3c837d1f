// Path: crates/gateway/src/delivery.rs

//! The delivery engine: at-least-once outbound retry.
//!
//! Every five seconds each identity's pending outbox entries get one
//! attempt: an existing authenticated session first, then a dial across
//! every candidate address (peer book, then PX-1 resolution through live
//! sessions). Failures leave the entry pending for the next tick, forever;
//! `failed` is reserved for explicit administrative action.

use crate::exchange;
use crate::sessions::{self, SessionHandle};
use crate::state::Gateway;
use claw_network::Frame;
use claw_types::{Message, MessageStatus, Principal};
use tokio::time::{interval, Duration, MissedTickBehavior};

/// Period of the pending-delivery retry tick.
pub const RETRY_PERIOD: Duration = Duration::from_secs(5);

/// The background retry loop.
pub fn spawn_retry(gw: Gateway) -> tokio::task::JoinHandle<()> {
    let mut shutdown = gw.shutdown_signal();
    tokio::spawn(async move {
        let mut ticker = interval(RETRY_PERIOD);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    tick(&gw).await;
                }
            }
        }
    })
}

/// One pass over a snapshot of pending entries. New entries queued during
/// the pass are picked up next tick.
pub async fn tick(gw: &Gateway) {
    let pending: Vec<(Principal, Message)> = gw.with_state(|state| {
        let mut out = Vec::new();
        for (principal, entry) in &state.identities {
            for msg in entry.outbox.with_status(MessageStatus::Pending) {
                if !state.in_flight.contains(&msg.id) {
                    out.push((principal.clone(), msg));
                }
            }
        }
        out
    });
    for (local, message) in pending {
        deliver_now(gw, &local, message).await;
    }
}

/// Attempts delivery of one outbox entry, guarding against concurrent
/// attempts for the same id. Returns true when the entry went out.
pub async fn deliver_now(gw: &Gateway, local: &Principal, message: Message) -> bool {
    let claimed = gw.with_state(|state| state.in_flight.insert(message.id.clone()));
    if !claimed {
        return false;
    }
    // The entry may have gone out between the snapshot and the claim.
    let still_pending = gw.with_state(|state| {
        state
            .entry(local)
            .ok()
            .and_then(|e| e.outbox.get(&message.id))
            .map(|m| m.status == MessageStatus::Pending)
            .unwrap_or(false)
    });
    if !still_pending {
        gw.with_state(|state| {
            state.in_flight.remove(&message.id);
        });
        return false;
    }
    let delivered = attempt(gw, local, &message).await;
    gw.with_state(|state| {
        state.in_flight.remove(&message.id);
    });
    delivered
}

async fn attempt(gw: &Gateway, local: &Principal, message: &Message) -> bool {
    // Step 1: an existing authenticated session to the recipient.
    if let Some(handle) = gw.with_state(|state| state.sessions.find(local, &message.to)) {
        if send_chat(gw, &handle, message).await {
            return true;
        }
        // A dead session is dropped so the dial path can replace it.
        gw.with_state(|state| {
            if state.sessions.contains(handle.id) {
                handle.close();
            }
        });
    }

    // Step 2: candidate addresses from the peer book, then PX-1.
    let mut candidates =
        gw.with_state(|state| {
            state
                .entry(local)
                .map(|e| e.peers.addresses(&message.to))
                .unwrap_or_default()
        });
    if candidates.is_empty() {
        if let Some(peer) = exchange::resolve(gw, local, &message.to, None).await {
            candidates = peer.addresses;
        }
    }
    let candidates = order_candidates(candidates);

    // Step 3: dial until one address authenticates as the recipient.
    for addr in candidates {
        match sessions::connect_outbound(gw, local, &addr, Some(&message.to)).await {
            Ok(handle) => {
                if send_chat(gw, &handle, message).await {
                    promote(gw, local, &message.to, &addr);
                    return true;
                }
            }
            Err(e) => {
                tracing::debug!(
                    target: "delivery",
                    event = "dial_fail",
                    %addr,
                    to = %message.to,
                    error = %e,
                );
            }
        }
    }

    tracing::debug!(target: "delivery", event = "still_pending", id = %message.id, to = %message.to);
    false
}

/// Sends the chat frame and marks the entry `sent` on success.
async fn send_chat(gw: &Gateway, handle: &SessionHandle, message: &Message) -> bool {
    let frame = Frame::Chat {
        id: message.id.clone(),
        content: message.content.clone(),
        ts: message.timestamp,
        from_nick: message.from_nick.clone(),
    };
    match handle.send_frame(&frame).await {
        Ok(()) => {
            let fatal = gw.with_state(|state| {
                state.sessions.touch(handle.id);
                match state.entry_mut(&handle.local) {
                    Ok(entry) => entry
                        .outbox
                        .set_status(&message.id, MessageStatus::Sent)
                        .is_err(),
                    Err(_) => false,
                }
            });
            if fatal {
                tracing::error!(target: "delivery", event = "outbox_write_fatal", id = %message.id);
                gw.begin_shutdown();
            }
            tracing::info!(target: "delivery", event = "sent", id = %message.id, to = %message.to);
            true
        }
        Err(e) => {
            tracing::debug!(target: "delivery", event = "send_fail", id = handle.id, error = %e);
            false
        }
    }
}

fn promote(gw: &Gateway, local: &Principal, to: &Principal, addr: &str) {
    gw.with_state(|state| {
        if let Ok(entry) = state.entry_mut(local) {
            if let Err(e) = entry.peers.promote_address(to, addr) {
                tracing::warn!(target: "delivery", event = "promote_fail", error = %e);
            }
        }
    });
}

/// Dedupes while keeping peer book preference order (most recent success
/// first), then lexicographic for the PX-learned tail.
fn order_candidates(addresses: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut head: Vec<String> = Vec::new();
    for a in addresses {
        if seen.insert(a.clone()) {
            head.push(a);
        }
    }
    // The first entry is the stored preference; everything after it is
    // ordered lexicographically so retries are deterministic.
    if head.len() > 2 {
        head[1..].sort();
    }
    head
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidate_order_prefers_head_then_sorts() {
        let got = order_candidates(vec![
            "/ip4/9.9.9.9/tcp/1".into(),
            "/ip4/1.1.1.1/tcp/1".into(),
            "/ip4/5.5.5.5/tcp/1".into(),
            "/ip4/1.1.1.1/tcp/1".into(),
        ]);
        assert_eq!(
            got,
            vec![
                "/ip4/9.9.9.9/tcp/1".to_string(),
                "/ip4/1.1.1.1/tcp/1".to_string(),
                "/ip4/5.5.5.5/tcp/1".to_string(),
            ]
        );
    }
}
