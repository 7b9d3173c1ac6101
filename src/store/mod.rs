//! Shared-state store abstraction.
//!
//! Presence and room state are behind trait objects so a single-process
//! deployment can use the in-memory stores while a multi-process deployment
//! swaps in a networked backend without touching matchmaking or session logic.

pub mod memory;

pub use memory::{MemoryPresenceStore, MemoryRoomStore};

use crate::error::StoreError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A currently-connected user and how to reach them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Presence {
    pub user_id: String,
    pub connection_id: String,
    pub username: String,
    pub avatar_url: Option<String>,
    pub room_id: Option<String>,
    /// Unix millis at connect time.
    pub connected_at: u64,
}

/// One seat in a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomMember {
    pub user_id: String,
    pub connection_id: String,
}

/// The matchmaking unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    pub id: String,
    pub members: Vec<RoomMember>,
    pub available: bool,
    /// Unix millis at creation time.
    pub created_at: u64,
}

/// Tracks which users are online and through which connection.
#[async_trait]
pub trait PresenceStore: Send + Sync {
    /// Create or overwrite the presence record with `room_id = None` and
    /// establish the connection → user mapping. Idempotent per connection.
    async fn set_online(
        &self,
        user_id: &str,
        connection_id: &str,
        username: &str,
        avatar_url: Option<&str>,
    ) -> Result<(), StoreError>;

    async fn get(&self, user_id: &str) -> Result<Option<Presence>, StoreError>;

    async fn get_by_connection(&self, connection_id: &str)
        -> Result<Option<Presence>, StoreError>;

    /// Remove the record and the secondary mapping together. No-op when the
    /// record is already gone.
    async fn set_offline(&self, user_id: &str, connection_id: &str) -> Result<(), StoreError>;

    /// Update the `room_id` field of an existing record; no-op if absent.
    async fn set_room(&self, user_id: &str, room_id: Option<&str>) -> Result<(), StoreError>;

    /// Number of users currently online.
    async fn active_count(&self) -> Result<usize, StoreError>;

    /// Drop expired records. Backends with native TTL support need do
    /// nothing here.
    async fn sweep_expired(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Tracks room existence, membership and availability.
#[async_trait]
pub trait RoomStore: Send + Sync {
    /// Create an empty available room. Fails with `AlreadyExists` if taken.
    async fn create(&self, room_id: &str) -> Result<Room, StoreError>;

    async fn get(&self, room_id: &str) -> Result<Option<Room>, StoreError>;

    /// Snapshot of rooms with a free seat. Not a live view.
    async fn list_available(&self) -> Result<Vec<Room>, StoreError>;

    /// Append `member` and recompute availability, atomically with respect to
    /// concurrent callers on the same room. Fails with `RoomFull` rather than
    /// ever exceeding capacity, `NotFound` if the room is gone.
    ///
    /// A member with the same user id already in the room has their
    /// connection id refreshed instead of taking a second seat, so a join
    /// retried after a lost response cannot seat the user twice.
    async fn add_member(&self, room_id: &str, member: RoomMember) -> Result<Room, StoreError>;

    /// Room currently holding a member with this user id, full rooms
    /// included.
    async fn find_by_member(&self, user_id: &str) -> Result<Option<Room>, StoreError>;

    /// Remove the matching member if present (no-op otherwise). Deletes the
    /// room when the last member leaves.
    async fn remove_member(&self, room_id: &str, user_id: &str) -> Result<(), StoreError>;

    /// Total rooms currently in the store.
    async fn count(&self) -> Result<usize, StoreError>;
}

pub(crate) fn unix_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
