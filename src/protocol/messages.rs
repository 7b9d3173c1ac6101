//! Client-server message protocol.
//!
//! SDP and ICE candidate payloads are carried as raw JSON values. The server
//! relays them untouched; their structure is a matter between the two peers.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Client → server messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "kebab-case")]
pub enum ClientMessage {
    /// Request a room assignment.
    Join,

    /// Leave the named room.
    Leave { room_id: String },

    // WebRTC signaling, addressed to one peer connection.
    Offer { to: String, sdp: Value },
    Answer { to: String, sdp: Value },
    Candidate { to: String, candidate: Value },
}

/// Server → client messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "kebab-case")]
pub enum ServerMessage {
    /// Sent once after a successful handshake so the client learns the
    /// connection id peers will see in `from` fields.
    Connected { connection_id: String },

    /// Join acknowledgment: the assigned room and the OTHER members'
    /// connection ids. The joiner initiates negotiation toward each of them.
    Joined {
        room_id: String,
        members: Vec<String>,
    },

    /// Join rejected. `banned` also closes the connection.
    JoinDenied { error: JoinErrorReason },

    /// A member left the room gracefully.
    PeerLeft { connection_id: String },

    /// A member's connection dropped.
    PeerDisconnected { connection_id: String },

    // WebRTC signaling, relayed verbatim.
    Offer { from: String, sdp: Value },
    Answer { from: String, sdp: Value },
    Candidate { from: String, candidate: Value },

    /// Recoverable per-event failure; the connection stays open.
    Error { code: String, message: String },
}

/// Reasons a join can be denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinErrorReason {
    Banned,
    MatchmakingFailed,
    StoreUnavailable,
}
