// Path: crates/gateway/src/router.rs

//! Message routing: inbound frames to the right identity's inbox (behind
//! its ACL), outbound sends into the owning identity's outbox.

use crate::sessions::SessionHandle;
use crate::state::Gateway;
use crate::wake;
use claw_types::error::{ControlError, ErrorCode};
use claw_types::ipc::Event;
use claw_types::time::now_ms;
use claw_types::{Message, MessageStatus, Principal};

/// Handles an authenticated `chat` frame.
///
/// The sender principal is the session's remote end; the frame cannot
/// claim otherwise. ACL denies are silent to the sender and logged
/// locally. Duplicate ids leave the inbox unchanged.
pub fn handle_inbound(
    gw: &Gateway,
    session: &SessionHandle,
    id: String,
    content: String,
    ts: u64,
    from_nick: Option<String>,
) {
    let wake_request = gw.with_state(|state| {
        let entry = match state.entry_mut(&session.local) {
            Ok(e) => e,
            Err(_) => return None,
        };
        if !entry.acl_allows(&session.remote) {
            tracing::warn!(
                target: "router",
                event = "acl_deny",
                identity = %session.local,
                sender = %session.remote,
            );
            state.emit(Event::Error {
                error: format!("denied sender {}", session.remote),
            });
            return None;
        }
        let message = Message {
            id,
            from: session.remote.clone(),
            from_nick,
            to: session.local.clone(),
            content,
            timestamp: ts,
            status: MessageStatus::Delivered,
        };
        let appended = match entry.inbox.append(message.clone()) {
            Ok(appended) => appended,
            Err(e) => {
                // Mailbox write failure is fatal; the daemon shuts down
                // rather than acknowledge mail it cannot keep.
                tracing::error!(target: "router", event = "inbox_write_fatal", error = %e, code = e.code());
                state.emit(Event::Error { error: e.to_string() });
                return Some(WakeOrAbort::Abort);
            }
        };
        if !appended {
            tracing::debug!(target: "router", event = "duplicate_dropped", id = %message.id);
            return None;
        }
        let wants_wake = entry.cfg.openclaw_wake;
        state.emit(Event::Message {
            message: message.clone(),
        });
        tracing::info!(
            target: "router",
            event = "delivered",
            id = %message.id,
            from = %message.from,
            to = %message.to,
        );
        wants_wake.then(|| WakeOrAbort::Wake(message))
    });

    match wake_request {
        Some(WakeOrAbort::Wake(message)) => wake::spawn_hook(&message),
        Some(WakeOrAbort::Abort) => gw.begin_shutdown(),
        None => {}
    }
}

enum WakeOrAbort {
    Wake(Message),
    Abort,
}

/// Queues an outbound message: fresh id, `pending` status, durable outbox
/// append. Delivery is attempted immediately by the caller (and forever
/// after by the retry tick).
pub fn queue_outbound(
    gw: &Gateway,
    from: &Principal,
    to: &Principal,
    content: String,
) -> Result<Message, ControlError> {
    gw.with_state(|state| {
        let from_nick = state
            .entry(from)?
            .identity
            .nick()
            .map(str::to_string);
        let message = Message {
            id: Message::fresh_id(),
            from: from.clone(),
            from_nick,
            to: to.clone(),
            content,
            timestamp: now_ms(),
            status: MessageStatus::Pending,
        };
        let entry = state.entry_mut(from)?;
        entry
            .outbox
            .append(message.clone())
            .map_err(|e| ControlError::Internal(e.to_string()))?;
        tracing::info!(
            target: "router",
            event = "queued",
            id = %message.id,
            from = %message.from,
            to = %message.to,
        );
        Ok(message)
    })
}
