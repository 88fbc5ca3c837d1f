// Path: crates/types/src/ipc.rs

//! The IPC wire protocol: newline-delimited JSON over the control socket.
//!
//! Each request line is `{"cmd": ..., ...args}`; the daemon answers with
//! exactly one response line `{"ok": ..., ...}`. Connections that issued
//! `subscribe` additionally receive event lines, distinguished by a `type`
//! field instead of `ok`. The WebSocket bridge reuses the same command and
//! event vocabulary under its own envelope.

use crate::message::Message;
use crate::principal::Principal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A control-plane request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum Request {
    Send {
        to: String,
        content: String,
        #[serde(rename = "as", default, skip_serializing_if = "Option::is_none")]
        as_identity: Option<String>,
    },
    Recv {
        #[serde(rename = "as", default, skip_serializing_if = "Option::is_none")]
        as_identity: Option<String>,
        /// Return messages with timestamp strictly greater than this.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        since: Option<u64>,
        /// Long-poll budget in milliseconds; 0 or absent returns at once.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout: Option<u64>,
    },
    Inbox {
        #[serde(rename = "as", default, skip_serializing_if = "Option::is_none")]
        as_identity: Option<String>,
    },
    Outbox {
        #[serde(rename = "as", default, skip_serializing_if = "Option::is_none")]
        as_identity: Option<String>,
    },
    Peers {
        #[serde(rename = "as", default, skip_serializing_if = "Option::is_none")]
        as_identity: Option<String>,
    },
    PeerAdd {
        principal: String,
        address: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        alias: Option<String>,
        #[serde(rename = "as", default, skip_serializing_if = "Option::is_none")]
        as_identity: Option<String>,
    },
    PeerRemove {
        principal: String,
        #[serde(rename = "as", default, skip_serializing_if = "Option::is_none")]
        as_identity: Option<String>,
    },
    PeerResolve {
        principal: String,
        /// Principal of the session to ask; absent asks every live session.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        through: Option<String>,
        #[serde(rename = "as", default, skip_serializing_if = "Option::is_none")]
        as_identity: Option<String>,
    },
    Status {
        #[serde(rename = "as", default, skip_serializing_if = "Option::is_none")]
        as_identity: Option<String>,
    },
    Multiaddrs,
    Connect {
        multiaddr: String,
    },
    Subscribe,
    Ping,
    Stop,
}

/// A control-plane response line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Stable machine-readable error code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl Response {
    pub fn ok(data: Value) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
            code: None,
        }
    }

    pub fn err(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(message.into()),
            code: Some(code.into()),
        }
    }
}

/// Push events delivered out-of-band on subscribed connections and to the
/// WebSocket bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    #[serde(rename = "started")]
    Started { principal: Principal },
    #[serde(rename = "message")]
    Message { message: Message },
    #[serde(rename = "p2p:connected")]
    Connected {
        /// Local identity that owns the session.
        identity: Principal,
        peer: Principal,
    },
    #[serde(rename = "p2p:disconnected")]
    Disconnected { identity: Principal, peer: Principal },
    #[serde(rename = "error")]
    Error { error: String },
}

/// Data payload for the `status` command.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusData {
    pub principal: Principal,
    /// Hex of the transport node public key.
    pub peer_id: String,
    pub p2p_port: u16,
    pub multiaddrs: Vec<String>,
    pub connected_peers: Vec<Principal>,
    pub inbox_count: usize,
    pub outbox_count: usize,
    pub loaded_identities: Vec<Principal>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requests_parse_from_wire_shape() {
        let req: Request =
            serde_json::from_str(r#"{"cmd":"send","to":"local:ab","content":"hi","as":"alice"}"#)
                .unwrap();
        match req {
            Request::Send {
                to,
                content,
                as_identity,
            } => {
                assert_eq!(to, "local:ab");
                assert_eq!(content, "hi");
                assert_eq!(as_identity.as_deref(), Some("alice"));
            }
            other => panic!("wrong variant: {other:?}"),
        }

        let req: Request = serde_json::from_str(r#"{"cmd":"multiaddrs"}"#).unwrap();
        assert!(matches!(req, Request::Multiaddrs));

        let req: Request =
            serde_json::from_str(r#"{"cmd":"recv","since":1700000000000,"timeout":30000}"#).unwrap();
        assert!(matches!(
            req,
            Request::Recv {
                since: Some(1700000000000),
                timeout: Some(30000),
                ..
            }
        ));
    }

    #[test]
    fn events_carry_a_type_tag() {
        let p = Principal::parse(&format!("local:{}", "aa".repeat(32))).unwrap();
        let line = serde_json::to_string(&Event::Connected {
            identity: p.clone(),
            peer: p,
        })
        .unwrap();
        assert!(line.contains("\"type\":\"p2p:connected\""));
    }

    #[test]
    fn unknown_command_is_a_parse_error() {
        assert!(serde_json::from_str::<Request>(r#"{"cmd":"frobnicate"}"#).is_err());
    }
}
