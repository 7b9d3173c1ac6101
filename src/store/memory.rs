//! In-process store implementations backed by DashMap.
//!
//! `add_member` and `remove_member` do their read-modify-write entirely under
//! the map's per-key entry guard, so membership mutations serialize per room
//! and a concurrent join against a full room fails with `RoomFull` instead of
//! oversubscribing the room.

use super::{unix_millis, Presence, PresenceStore, Room, RoomMember, RoomStore};
use crate::error::StoreError;
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::time::{Duration, Instant};

struct PresenceEntry {
    presence: Presence,
    expires_at: Instant,
}

/// Presence store with TTL-bounded records.
pub struct MemoryPresenceStore {
    users: DashMap<String, PresenceEntry>,
    /// connection_id → user_id secondary index.
    connections: DashMap<String, String>,
    ttl: Duration,
}

impl MemoryPresenceStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            users: DashMap::new(),
            connections: DashMap::new(),
            ttl,
        }
    }

    /// Drop expired records and any index entries left dangling by them.
    /// Records also expire lazily on read; this bounds storage if a
    /// connection's cleanup path was ever missed.
    pub fn sweep(&self) {
        let now = Instant::now();
        self.users.retain(|_, entry| entry.expires_at > now);
        self.connections
            .retain(|_, user_id| self.users.contains_key(user_id));
    }

    fn get_live(&self, user_id: &str) -> Option<Presence> {
        match self.users.entry(user_id.to_string()) {
            Entry::Occupied(occ) => {
                if occ.get().expires_at > Instant::now() {
                    Some(occ.get().presence.clone())
                } else {
                    let (_, stale) = occ.remove_entry();
                    self.connections.remove(&stale.presence.connection_id);
                    None
                }
            }
            Entry::Vacant(_) => None,
        }
    }
}

#[async_trait]
impl PresenceStore for MemoryPresenceStore {
    async fn set_online(
        &self,
        user_id: &str,
        connection_id: &str,
        username: &str,
        avatar_url: Option<&str>,
    ) -> Result<(), StoreError> {
        let presence = Presence {
            user_id: user_id.to_string(),
            connection_id: connection_id.to_string(),
            username: username.to_string(),
            avatar_url: avatar_url.map(str::to_string),
            room_id: None,
            connected_at: unix_millis(),
        };
        self.users.insert(
            user_id.to_string(),
            PresenceEntry {
                presence,
                expires_at: Instant::now() + self.ttl,
            },
        );
        self.connections
            .insert(connection_id.to_string(), user_id.to_string());
        Ok(())
    }

    async fn get(&self, user_id: &str) -> Result<Option<Presence>, StoreError> {
        Ok(self.get_live(user_id))
    }

    async fn get_by_connection(
        &self,
        connection_id: &str,
    ) -> Result<Option<Presence>, StoreError> {
        let user_id = match self.connections.get(connection_id) {
            Some(entry) => entry.value().clone(),
            None => return Ok(None),
        };
        Ok(self.get_live(&user_id))
    }

    async fn set_offline(&self, user_id: &str, connection_id: &str) -> Result<(), StoreError> {
        self.users.remove(user_id);
        self.connections.remove(connection_id);
        Ok(())
    }

    async fn set_room(&self, user_id: &str, room_id: Option<&str>) -> Result<(), StoreError> {
        if let Some(mut entry) = self.users.get_mut(user_id) {
            entry.presence.room_id = room_id.map(str::to_string);
        }
        Ok(())
    }

    async fn active_count(&self) -> Result<usize, StoreError> {
        let now = Instant::now();
        Ok(self
            .users
            .iter()
            .filter(|entry| entry.expires_at > now)
            .count())
    }

    async fn sweep_expired(&self) -> Result<(), StoreError> {
        self.sweep();
        Ok(())
    }
}

/// Room store with per-room atomic membership updates.
pub struct MemoryRoomStore {
    rooms: DashMap<String, Room>,
    capacity: usize,
}

impl MemoryRoomStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            rooms: DashMap::new(),
            capacity,
        }
    }
}

#[async_trait]
impl RoomStore for MemoryRoomStore {
    async fn create(&self, room_id: &str) -> Result<Room, StoreError> {
        match self.rooms.entry(room_id.to_string()) {
            Entry::Occupied(_) => Err(StoreError::AlreadyExists(room_id.to_string())),
            Entry::Vacant(vacant) => {
                let room = Room {
                    id: room_id.to_string(),
                    members: Vec::new(),
                    available: true,
                    created_at: unix_millis(),
                };
                vacant.insert(room.clone());
                Ok(room)
            }
        }
    }

    async fn get(&self, room_id: &str) -> Result<Option<Room>, StoreError> {
        Ok(self.rooms.get(room_id).map(|entry| entry.value().clone()))
    }

    async fn list_available(&self) -> Result<Vec<Room>, StoreError> {
        Ok(self
            .rooms
            .iter()
            .filter(|entry| entry.value().available)
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn add_member(&self, room_id: &str, member: RoomMember) -> Result<Room, StoreError> {
        match self.rooms.entry(room_id.to_string()) {
            Entry::Occupied(mut occ) => {
                let room = occ.get_mut();
                if let Some(existing) = room
                    .members
                    .iter_mut()
                    .find(|m| m.user_id == member.user_id)
                {
                    existing.connection_id = member.connection_id;
                    return Ok(room.clone());
                }
                if room.members.len() >= self.capacity {
                    return Err(StoreError::RoomFull(room_id.to_string()));
                }
                room.members.push(member);
                room.available = room.members.len() < self.capacity;
                Ok(room.clone())
            }
            Entry::Vacant(_) => Err(StoreError::NotFound(room_id.to_string())),
        }
    }

    async fn find_by_member(&self, user_id: &str) -> Result<Option<Room>, StoreError> {
        Ok(self
            .rooms
            .iter()
            .find(|entry| entry.value().members.iter().any(|m| m.user_id == user_id))
            .map(|entry| entry.value().clone()))
    }

    async fn remove_member(&self, room_id: &str, user_id: &str) -> Result<(), StoreError> {
        if let Entry::Occupied(mut occ) = self.rooms.entry(room_id.to_string()) {
            let room = occ.get_mut();
            room.members.retain(|m| m.user_id != user_id);
            if room.members.is_empty() {
                occ.remove();
            } else {
                room.available = room.members.len() < self.capacity;
            }
        }
        Ok(())
    }

    async fn count(&self) -> Result<usize, StoreError> {
        Ok(self.rooms.len())
    }
}
