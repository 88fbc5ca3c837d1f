// Path: crates/types/src/message.rs

//! Mailbox message records.

use crate::principal::Principal;
use serde::{Deserialize, Serialize};

/// Delivery status of a message within a mailbox.
///
/// `Pending`, `Sent` and `Failed` appear only in outboxes; `Delivered`
/// only in inboxes. `Failed` is set by explicit administrative action,
/// never by a transient transport error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Pending,
    Sent,
    Delivered,
    Failed,
}

/// A single chat message as persisted in `inbox.json` / `outbox.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Random 128-bit identifier, lowercase hex. Unique within a mailbox.
    pub id: String,
    /// Sender principal. For inbox entries this equals the remote end of
    /// the authenticated session the frame arrived on.
    pub from: Principal,
    /// Display nick the sender attached to the frame, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_nick: Option<String>,
    /// Recipient principal.
    pub to: Principal,
    /// Message body, treated as UTF-8 text at the boundary.
    pub content: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
    pub status: MessageStatus,
}

impl Message {
    /// Generates a fresh random message identifier (128 bits, hex).
    pub fn fresh_id() -> String {
        uuid::Uuid::new_v4().simple().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_ids_are_32_hex_chars_and_distinct() {
        let a = Message::fresh_id();
        let b = Message::fresh_id();
        assert_eq!(a.len(), 32);
        assert!(a.bytes().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&MessageStatus::Pending).unwrap(),
            "\"pending\""
        );
        assert_eq!(
            serde_json::to_string(&MessageStatus::Delivered).unwrap(),
            "\"delivered\""
        );
    }
}
