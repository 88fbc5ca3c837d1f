// Path: crates/network/src/frames.rs

//! SNaP2P frames.
//!
//! One frame per transport record, JSON-encoded with a `type` tag. Chat
//! frames may carry up to 256 KiB; every other type is control traffic
//! capped at 64 KiB. A peer exceeding the cap gets its session closed.

use claw_types::error::ProtocolError;
use claw_types::{Attestation, Principal, Visibility};
use serde::{Deserialize, Serialize};

/// Size cap for control frames (everything but `chat`).
pub const MAX_CONTROL_FRAME: usize = 64 * 1024;
/// Size cap for `chat` frames.
pub const MAX_CHAT_FRAME: usize = 256 * 1024;

/// A PX-1 peer record as carried on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PxPeer {
    pub principal: Principal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_public_key: Option<String>,
    #[serde(default)]
    pub addresses: Vec<String>,
    #[serde(default)]
    pub visibility: Visibility,
    /// Milliseconds since epoch when the sender last saw this peer.
    #[serde(default)]
    pub last_seen: u64,
}

/// Every frame the session protocol speaks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    /// Handshake: the sender's attestation for its transport node key, the
    /// listen multiaddrs it can be dialed back at, and (from the dialer)
    /// the principal it wants to reach on a multi-identity gateway.
    Hello {
        attestation: Attestation,
        #[serde(default)]
        listen_addrs: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target: Option<Principal>,
    },
    Chat {
        id: String,
        content: String,
        ts: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from_nick: Option<String>,
    },
    PxPush {
        peers: Vec<PxPeer>,
    },
    PxRequest {
        principal: Principal,
    },
    PxResponse {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        peer: Option<PxPeer>,
    },
}

impl Frame {
    fn is_chat(&self) -> bool {
        matches!(self, Frame::Chat { .. })
    }

    fn max_len(&self) -> usize {
        if self.is_chat() {
            MAX_CHAT_FRAME
        } else {
            MAX_CONTROL_FRAME
        }
    }

    /// Encodes the frame, enforcing its size cap.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let bytes =
            serde_json::to_vec(self).map_err(|e| ProtocolError::MalformedFrame(e.to_string()))?;
        if bytes.len() > self.max_len() {
            return Err(ProtocolError::MalformedFrame(format!(
                "frame of {} bytes exceeds cap",
                bytes.len()
            )));
        }
        Ok(bytes)
    }

    /// Decodes a received record, enforcing the per-type size cap.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() > MAX_CHAT_FRAME {
            return Err(ProtocolError::MalformedFrame(format!(
                "record of {} bytes exceeds cap",
                bytes.len()
            )));
        }
        let frame: Frame = serde_json::from_slice(bytes)
            .map_err(|e| ProtocolError::MalformedFrame(e.to_string()))?;
        if bytes.len() > frame.max_len() {
            return Err(ProtocolError::MalformedFrame(format!(
                "control frame of {} bytes exceeds cap",
                bytes.len()
            )));
        }
        Ok(frame)
    }

    /// Short tag for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Frame::Hello { .. } => "hello",
            Frame::Chat { .. } => "chat",
            Frame::PxPush { .. } => "px_push",
            Frame::PxRequest { .. } => "px_request",
            Frame::PxResponse { .. } => "px_response",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn principal() -> Principal {
        Principal::parse(&format!("local:{}", "cd".repeat(32))).unwrap()
    }

    #[test]
    fn frames_round_trip() {
        let frame = Frame::Chat {
            id: "a".repeat(32),
            content: "hello".into(),
            ts: 1_700_000_000_000,
            from_nick: Some("alice".into()),
        };
        let bytes = frame.encode().unwrap();
        match Frame::decode(&bytes).unwrap() {
            Frame::Chat { content, .. } => assert_eq!(content, "hello"),
            other => panic!("wrong frame: {}", other.kind()),
        }
    }

    #[test]
    fn type_tags_are_snake_case() {
        let frame = Frame::PxRequest {
            principal: principal(),
        };
        let raw = String::from_utf8(frame.encode().unwrap()).unwrap();
        assert!(raw.contains("\"type\":\"px_request\""));
    }

    #[test]
    fn chat_cap_allows_what_control_cap_rejects() {
        let big = "x".repeat(MAX_CONTROL_FRAME + 1);
        let chat = Frame::Chat {
            id: "a".repeat(32),
            content: big,
            ts: 0,
            from_nick: None,
        };
        let bytes = chat.encode().unwrap();
        assert!(Frame::decode(&bytes).is_ok());

        // The same payload splashed into a control frame must be refused.
        let px = Frame::PxResponse {
            peer: Some(PxPeer {
                principal: principal(),
                node_public_key: None,
                addresses: vec!["/ip4/1.2.3.4/tcp/1".repeat(4096)],
                visibility: Visibility::Public,
                last_seen: 0,
            }),
        };
        assert!(px.encode().is_err());
    }

    #[test]
    fn oversize_chat_is_rejected() {
        let chat = Frame::Chat {
            id: "a".repeat(32),
            content: "x".repeat(MAX_CHAT_FRAME + 1),
            ts: 0,
            from_nick: None,
        };
        assert!(chat.encode().is_err());
    }

    #[test]
    fn garbage_does_not_decode() {
        assert!(Frame::decode(b"{\"type\":\"warp\"}").is_err());
        assert!(Frame::decode(b"not json").is_err());
    }
}
