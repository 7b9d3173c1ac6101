//! Application state.

use crate::auth::{Authenticator, BanList};
use crate::config::Config;
use crate::matchmaker::Matchmaker;
use crate::protocol::ServerMessage;
use crate::store::{PresenceStore, RoomStore};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;

/// Global application state shared across connection tasks.
pub struct AppState {
    pub config: Arc<Config>,
    pub presence: Arc<dyn PresenceStore>,
    pub rooms: Arc<dyn RoomStore>,
    pub registry: ConnectionRegistry,
    pub matchmaker: Matchmaker,
    pub auth: Arc<dyn Authenticator>,
    pub bans: Arc<dyn BanList>,
}

impl AppState {
    /// Wire up in-process stores and the env-backed collaborators.
    pub fn new(config: Config) -> Self {
        let rooms: Arc<dyn RoomStore> =
            Arc::new(crate::store::MemoryRoomStore::new(config.room.capacity));
        let presence: Arc<dyn PresenceStore> =
            Arc::new(crate::store::MemoryPresenceStore::new(config.presence_ttl));
        let matchmaker = Matchmaker::new(
            rooms.clone(),
            config.room.capacity,
            config.room.match_max_attempts,
        );
        let bans: Arc<dyn BanList> =
            Arc::new(crate::auth::EnvBanList::new(config.banned_users.clone()));

        Self {
            config: Arc::new(config),
            presence,
            rooms,
            registry: ConnectionRegistry::new(),
            matchmaker,
            auth: Arc::new(crate::auth::HandshakeAuthenticator),
            bans,
        }
    }
}

/// Live connections and their outbound channels. This is the only capability
/// the relay needs: look up a connection id, push a message.
pub struct ConnectionRegistry {
    senders: DashMap<String, UnboundedSender<ServerMessage>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            senders: DashMap::new(),
        }
    }

    pub fn register(&self, connection_id: &str, sender: UnboundedSender<ServerMessage>) {
        self.senders.insert(connection_id.to_string(), sender);
    }

    /// Returns true only the first time a connection is removed, which gates
    /// the exactly-once disconnect cleanup.
    pub fn unregister(&self, connection_id: &str) -> bool {
        self.senders.remove(connection_id).is_some()
    }

    /// Fire-and-forget delivery. A closed or missing channel means the peer
    /// is already gone; nothing to report to the sender.
    pub fn send_to(&self, connection_id: &str, message: ServerMessage) -> bool {
        match self.senders.get(connection_id) {
            Some(sender) => sender.send(message).is_ok(),
            None => false,
        }
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
