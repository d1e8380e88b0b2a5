//! Wire messages exchanged between peers and the relay.
//!
//! Every frame is one JSON object: `{ type, src?, dst?, payload? }`.
//! The relay never looks inside `payload`; SDP and ICE content pass
//! through verbatim.

use serde::{Deserialize, Serialize};

/// Message types recognized on the wire.
///
/// Anything else deserializes to `Unknown` and is ignored by the
/// dispatcher, so newer clients cannot break older servers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    Open,
    IdTaken,
    Error,
    Heartbeat,
    Offer,
    Answer,
    Candidate,
    Leave,
    Expire,
    #[serde(other)]
    Unknown,
}

/// Reasons a connection attempt is refused at the protocol level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    InvalidWsParameters,
    ConnectionLimitExceed,
    IdTaken,
}

impl RejectReason {
    pub fn message(self) -> &'static str {
        match self {
            RejectReason::InvalidWsParameters => "No id, or token provided to websocket server",
            RejectReason::ConnectionLimitExceed => "Server has reached its concurrent user limit",
            RejectReason::IdTaken => "ID is taken",
        }
    }
}

/// One signaling frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "type")]
    pub msg_type: MessageType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dst: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

impl Message {
    /// Registration acknowledgement. Carries an empty payload object,
    /// matching what peer clients expect from the original protocol.
    pub fn open() -> Self {
        Self::server_frame(MessageType::Open, None)
    }

    pub fn id_taken() -> Self {
        Self::server_frame(MessageType::IdTaken, Some(RejectReason::IdTaken.message()))
    }

    pub fn error(reason: RejectReason) -> Self {
        Self::server_frame(MessageType::Error, Some(reason.message()))
    }

    /// Synthetic departure notice, produced by the send-failure cascade
    /// and by self-announced leaves.
    pub fn leave(src: Option<String>, dst: Option<String>) -> Self {
        Self { msg_type: MessageType::Leave, src, dst, payload: None }
    }

    /// Synthetic delivery-failure notice, produced by the expiry sweeper
    /// with `src` and `dst` swapped relative to the undelivered message.
    pub fn expire(src: Option<String>, dst: Option<String>) -> Self {
        Self { msg_type: MessageType::Expire, src, dst, payload: None }
    }

    fn server_frame(msg_type: MessageType, msg: Option<&str>) -> Self {
        let payload = match msg {
            Some(text) => serde_json::json!({ "msg": text }),
            None => serde_json::json!({}),
        };
        Self { msg_type, src: None, dst: None, payload: Some(payload) }
    }
}
