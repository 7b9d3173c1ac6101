//! Directed signal relay.
//!
//! Stateless: no room or presence lookups, no payload inspection. A message
//! for an unreachable connection is dropped, because by the time the sender
//! could learn about it the peer is already gone.

use crate::protocol::ServerMessage;
use crate::state::ConnectionRegistry;
use serde_json::Value;

/// The three negotiation message kinds the server relays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    Offer,
    Answer,
    Candidate,
}

impl SignalKind {
    fn label(self) -> &'static str {
        match self {
            SignalKind::Offer => "offer",
            SignalKind::Answer => "answer",
            SignalKind::Candidate => "candidate",
        }
    }
}

/// Forward `payload` to `target_connection_id`, stamped with the sender's
/// connection id so the recipient knows whom to answer.
pub fn deliver(
    registry: &ConnectionRegistry,
    kind: SignalKind,
    target_connection_id: &str,
    sender_connection_id: &str,
    payload: Value,
) {
    let from = sender_connection_id.to_string();
    let message = match kind {
        SignalKind::Offer => ServerMessage::Offer { from, sdp: payload },
        SignalKind::Answer => ServerMessage::Answer { from, sdp: payload },
        SignalKind::Candidate => ServerMessage::Candidate {
            from,
            candidate: payload,
        },
    };

    if registry.send_to(target_connection_id, message) {
        tracing::debug!(
            kind = kind.label(),
            from = %sender_connection_id,
            to = %target_connection_id,
            "relayed signal"
        );
    } else {
        tracing::debug!(
            kind = kind.label(),
            from = %sender_connection_id,
            to = %target_connection_id,
            "dropped signal for unreachable connection"
        );
    }
}
