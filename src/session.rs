//! Per-connection lifecycle.
//!
//! Each network connection is driven by exactly one `Session`, which owns the
//! state-machine progression `Idle → InRoom → Closed` and is the only code
//! that dispatches to the matchmaker, the relay, and the stores. Rooms and
//! presence are shared resources; the session only touches them through the
//! store operations.

use crate::auth::UserIdentity;
use crate::error::{MatchError, StoreError};
use crate::protocol::{ClientMessage, JoinErrorReason, ServerMessage};
use crate::relay::{self, SignalKind};
use crate::state::AppState;
use crate::store::{PresenceStore as _, RoomMember, RoomStore as _};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;

/// Where the session is in its lifecycle. `Connecting` and `Authenticating`
/// precede construction: a `Session` only exists for a verified identity.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Phase {
    Idle,
    InRoom(String),
    Closed,
}

/// What the caller should do with the connection after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Continue,
    Close,
}

/// How a member left, which decides what the remaining members are told.
enum Departure {
    Left,
    Disconnected,
}

pub struct Session {
    state: Arc<AppState>,
    connection_id: String,
    user: UserIdentity,
    sender: UnboundedSender<ServerMessage>,
    phase: Phase,
}

impl Session {
    /// Register the connection and its presence record. The `connected`
    /// message tells the client the id peers will address it by.
    pub async fn connect(
        state: Arc<AppState>,
        connection_id: String,
        user: UserIdentity,
        sender: UnboundedSender<ServerMessage>,
    ) -> Result<Self, StoreError> {
        let timeout = state.config.store_timeout;
        with_timeout(
            timeout,
            state.presence.set_online(
                &user.user_id,
                &connection_id,
                &user.username,
                user.avatar_url.as_deref(),
            ),
        )
        .await?;

        state.registry.register(&connection_id, sender.clone());
        let _ = sender.send(ServerMessage::Connected {
            connection_id: connection_id.clone(),
        });

        tracing::info!(
            connection_id = %connection_id,
            user_id = %user.user_id,
            "connection established"
        );

        Ok(Self {
            state,
            connection_id,
            user,
            sender,
            phase: Phase::Idle,
        })
    }

    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    /// Dispatch one inbound event.
    pub async fn handle(&mut self, message: ClientMessage) -> Control {
        if self.phase == Phase::Closed {
            return Control::Close;
        }
        match message {
            ClientMessage::Join => self.handle_join().await,
            ClientMessage::Leave { room_id } => {
                self.handle_leave(&room_id).await;
                Control::Continue
            }
            ClientMessage::Offer { to, sdp } => {
                relay::deliver(
                    &self.state.registry,
                    SignalKind::Offer,
                    &to,
                    &self.connection_id,
                    sdp,
                );
                Control::Continue
            }
            ClientMessage::Answer { to, sdp } => {
                relay::deliver(
                    &self.state.registry,
                    SignalKind::Answer,
                    &to,
                    &self.connection_id,
                    sdp,
                );
                Control::Continue
            }
            ClientMessage::Candidate { to, candidate } => {
                relay::deliver(
                    &self.state.registry,
                    SignalKind::Candidate,
                    &to,
                    &self.connection_id,
                    candidate,
                );
                Control::Continue
            }
        }
    }

    async fn handle_join(&mut self) -> Control {
        if let Phase::InRoom(room_id) = &self.phase {
            tracing::warn!(
                connection_id = %self.connection_id,
                room_id = %room_id,
                "join while already in a room"
            );
            self.send(ServerMessage::Error {
                code: "already_in_room".to_string(),
                message: "leave the current room before joining again".to_string(),
            });
            return Control::Continue;
        }

        if self.state.bans.is_banned(&self.user.user_id).await {
            tracing::warn!(user_id = %self.user.user_id, "banned user attempted to join");
            self.send(ServerMessage::JoinDenied {
                error: JoinErrorReason::Banned,
            });
            self.phase = Phase::Closed;
            return Control::Close;
        }

        let member = RoomMember {
            user_id: self.user.user_id.clone(),
            connection_id: self.connection_id.clone(),
        };
        let timeout = self.state.config.store_timeout;

        let room = match tokio::time::timeout(timeout, self.state.matchmaker.assign_room(member))
            .await
        {
            Ok(Ok(room)) => room,
            Ok(Err(MatchError::Exhausted(attempts))) => {
                tracing::warn!(
                    user_id = %self.user.user_id,
                    attempts,
                    "matchmaking exhausted its retry budget"
                );
                self.send(ServerMessage::JoinDenied {
                    error: JoinErrorReason::MatchmakingFailed,
                });
                return Control::Continue;
            }
            Ok(Err(MatchError::Store(e))) => {
                tracing::warn!(user_id = %self.user.user_id, error = %e, "join hit a store failure");
                self.send(ServerMessage::JoinDenied {
                    error: JoinErrorReason::StoreUnavailable,
                });
                return Control::Continue;
            }
            Err(_) => {
                tracing::warn!(user_id = %self.user.user_id, "join timed out against the store");
                self.send(ServerMessage::JoinDenied {
                    error: JoinErrorReason::StoreUnavailable,
                });
                return Control::Continue;
            }
        };

        // The ack must not go out before the presence record reflects the
        // room. If this write fails, give the seat back and report a
        // recoverable error so the client can retry.
        if let Err(e) = with_timeout(
            timeout,
            self.state
                .presence
                .set_room(&self.user.user_id, Some(room.id.as_str())),
        )
        .await
        {
            tracing::warn!(
                user_id = %self.user.user_id,
                room_id = %room.id,
                error = %e,
                "failed to record room on presence, rolling back the seat"
            );
            if let Err(e) = with_timeout(
                timeout,
                self.state.rooms.remove_member(&room.id, &self.user.user_id),
            )
            .await
            {
                tracing::warn!(room_id = %room.id, error = %e, "seat rollback failed");
            }
            self.send(ServerMessage::JoinDenied {
                error: JoinErrorReason::StoreUnavailable,
            });
            return Control::Continue;
        }

        let others: Vec<String> = room
            .members
            .iter()
            .filter(|m| m.connection_id != self.connection_id)
            .map(|m| m.connection_id.clone())
            .collect();

        self.phase = Phase::InRoom(room.id.clone());
        self.send(ServerMessage::Joined {
            room_id: room.id.clone(),
            members: others,
        });

        tracing::info!(
            connection_id = %self.connection_id,
            user_id = %self.user.user_id,
            room_id = %room.id,
            member_count = room.members.len(),
            "joined room"
        );
        Control::Continue
    }

    async fn handle_leave(&mut self, room_id: &str) {
        match &self.phase {
            Phase::InRoom(current) if current.as_str() == room_id => {}
            _ => {
                tracing::warn!(
                    connection_id = %self.connection_id,
                    room_id = %room_id,
                    "leave for a room the caller is not in"
                );
                return;
            }
        }

        match self.depart_room(room_id, Departure::Left).await {
            Ok(()) => {
                self.phase = Phase::Idle;
                tracing::info!(
                    connection_id = %self.connection_id,
                    user_id = %self.user.user_id,
                    room_id = %room_id,
                    "left room"
                );
            }
            Err(e) => {
                tracing::warn!(room_id = %room_id, error = %e, "leave hit a store failure");
                self.send(ServerMessage::Error {
                    code: "store_unavailable".to_string(),
                    message: "could not leave the room, retry".to_string(),
                });
            }
        }
    }

    /// Disconnect cleanup. Safe to call any number of times; the registry
    /// removal admits only the first caller, so the room and presence unwind
    /// run exactly once per connection however it terminated.
    pub async fn shutdown(&mut self) {
        if !self.state.registry.unregister(&self.connection_id) {
            return;
        }
        self.phase = Phase::Closed;
        let timeout = self.state.config.store_timeout;

        // Best effort from here on: a failed store call is logged and
        // skipped, never propagated. The presence TTL catches anything left.
        let room_id = match with_timeout(
            timeout,
            self.state.presence.get_by_connection(&self.connection_id),
        )
        .await
        {
            Ok(presence) => presence.and_then(|p| p.room_id),
            Err(e) => {
                tracing::warn!(
                    connection_id = %self.connection_id,
                    error = %e,
                    "presence lookup failed during disconnect cleanup"
                );
                None
            }
        };

        if let Some(room_id) = room_id {
            if let Err(e) = self.depart_room(&room_id, Departure::Disconnected).await {
                tracing::warn!(room_id = %room_id, error = %e, "room cleanup failed on disconnect");
            }
        }

        if let Err(e) = with_timeout(
            timeout,
            self.state
                .presence
                .set_offline(&self.user.user_id, &self.connection_id),
        )
        .await
        {
            tracing::warn!(
                user_id = %self.user.user_id,
                error = %e,
                "failed to mark user offline"
            );
        }

        tracing::info!(
            connection_id = %self.connection_id,
            user_id = %self.user.user_id,
            "connection closed"
        );
    }

    /// Remove this member from `room_id` and tell whoever remains. The empty
    /// room is deleted by the store itself.
    async fn depart_room(&self, room_id: &str, departure: Departure) -> Result<(), StoreError> {
        let timeout = self.state.config.store_timeout;

        with_timeout(
            timeout,
            self.state.rooms.remove_member(room_id, &self.user.user_id),
        )
        .await?;
        with_timeout(timeout, self.state.presence.set_room(&self.user.user_id, None)).await?;

        let remaining = with_timeout(timeout, self.state.rooms.get(room_id))
            .await?
            .map(|room| room.members)
            .unwrap_or_default();

        for member in remaining {
            let message = match departure {
                Departure::Left => ServerMessage::PeerLeft {
                    connection_id: self.connection_id.clone(),
                },
                Departure::Disconnected => ServerMessage::PeerDisconnected {
                    connection_id: self.connection_id.clone(),
                },
            };
            self.state.registry.send_to(&member.connection_id, message);
        }
        Ok(())
    }

    fn send(&self, message: ServerMessage) {
        let _ = self.sender.send(message);
    }
}

/// Bounded store call: elapsed time is treated as unavailability, not as
/// proof of any state change.
async fn with_timeout<T>(
    duration: Duration,
    fut: impl Future<Output = Result<T, StoreError>>,
) -> Result<T, StoreError> {
    match tokio::time::timeout(duration, fut).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Unavailable("store call timed out".to_string())),
    }
}
