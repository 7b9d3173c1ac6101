//! Room assignment.

use crate::error::{MatchError, StoreError};
use crate::store::{Room, RoomMember, RoomStore};
use rand::seq::SliceRandom;
use std::sync::Arc;
use uuid::Uuid;

/// Decides which room an arriving user joins, biased toward completing
/// nearly-full rooms so fewer users sit waiting below capacity.
pub struct Matchmaker {
    rooms: Arc<dyn RoomStore>,
    capacity: usize,
    max_attempts: usize,
}

impl Matchmaker {
    pub fn new(rooms: Arc<dyn RoomStore>, capacity: usize, max_attempts: usize) -> Self {
        Self {
            rooms,
            capacity,
            max_attempts,
        }
    }

    /// Assign `member` to a room and return it with the member already
    /// inside; the caller never needs to re-verify capacity.
    ///
    /// A `RoomFull` from the store means another join won the race for the
    /// last seat; the whole selection runs again, up to `max_attempts` times.
    pub async fn assign_room(&self, member: RoomMember) -> Result<Room, MatchError> {
        // An earlier assignment may have committed at the store while its
        // response was lost. Reuse that seat rather than granting a second
        // one; `add_member` refreshes the connection id on the way through.
        if let Some(held) = self.rooms.find_by_member(&member.user_id).await? {
            match self.rooms.add_member(&held.id, member.clone()).await {
                Ok(room) => {
                    tracing::debug!(
                        room_id = %room.id,
                        user_id = %member.user_id,
                        "reusing an already-held seat"
                    );
                    return Ok(room);
                }
                // The seat vanished between lookup and claim; select afresh.
                Err(StoreError::NotFound(_)) | Err(StoreError::RoomFull(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }

        for attempt in 1..=self.max_attempts {
            let room_id = match self.pick_room().await? {
                Some(id) => id,
                None => self.create_room().await?.id,
            };

            match self.rooms.add_member(&room_id, member.clone()).await {
                Ok(room) => return Ok(room),
                Err(StoreError::RoomFull(_)) | Err(StoreError::NotFound(_)) => {
                    tracing::debug!(
                        room_id = %room_id,
                        user_id = %member.user_id,
                        attempt,
                        "lost the race for a seat, reselecting"
                    );
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(MatchError::Exhausted(self.max_attempts))
    }

    /// Prefer a room with exactly one seat left (uniform random among them),
    /// otherwise any room with a free seat.
    async fn pick_room(&self) -> Result<Option<String>, MatchError> {
        let open: Vec<Room> = self
            .rooms
            .list_available()
            .await?
            .into_iter()
            .filter(|r| r.members.len() < self.capacity)
            .collect();

        let nearly_full: Vec<&Room> = open
            .iter()
            .filter(|r| r.members.len() == self.capacity - 1)
            .collect();

        if let Some(room) = nearly_full.choose(&mut rand::thread_rng()) {
            return Ok(Some(room.id.clone()));
        }
        Ok(open.first().map(|r| r.id.clone()))
    }

    /// Fresh unpredictable room id; regenerate on the (negligible) collision.
    async fn create_room(&self) -> Result<Room, MatchError> {
        loop {
            let room_id = Uuid::new_v4().to_string();
            match self.rooms.create(&room_id).await {
                Ok(room) => {
                    tracing::info!(room_id = %room.id, "room created");
                    return Ok(room);
                }
                Err(StoreError::AlreadyExists(_)) => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryRoomStore;

    fn member(n: u32) -> RoomMember {
        RoomMember {
            user_id: format!("user-{n}"),
            connection_id: format!("conn-{n}"),
        }
    }

    fn matchmaker(store: &Arc<MemoryRoomStore>) -> Matchmaker {
        Matchmaker::new(store.clone() as Arc<dyn RoomStore>, 3, 4)
    }

    #[tokio::test]
    async fn sequential_joins_share_one_room_until_full() {
        let store = Arc::new(MemoryRoomStore::new(3));
        let mm = matchmaker(&store);

        let r1 = mm.assign_room(member(0)).await.unwrap();
        let r2 = mm.assign_room(member(1)).await.unwrap();
        let r3 = mm.assign_room(member(2)).await.unwrap();

        assert_eq!(r1.id, r2.id);
        assert_eq!(r2.id, r3.id);
        assert!(r1.available && r2.available);
        assert!(!r3.available);
        assert_eq!(r3.members.len(), 3);
    }

    #[tokio::test]
    async fn fourth_join_opens_a_second_room() {
        let store = Arc::new(MemoryRoomStore::new(3));
        let mm = matchmaker(&store);

        let first = mm.assign_room(member(0)).await.unwrap();
        mm.assign_room(member(1)).await.unwrap();
        mm.assign_room(member(2)).await.unwrap();

        let second = mm.assign_room(member(3)).await.unwrap();
        assert_ne!(first.id, second.id);
        assert_eq!(second.members.len(), 1);

        let untouched = store.get(&first.id).await.unwrap().unwrap();
        assert_eq!(untouched.members.len(), 3);
    }

    #[tokio::test]
    async fn prefers_the_room_one_seat_from_full() {
        let store = Arc::new(MemoryRoomStore::new(3));
        let mm = matchmaker(&store);

        // One room with two members, one with a single member.
        store.create("nearly-full").await.unwrap();
        store.add_member("nearly-full", member(0)).await.unwrap();
        store.add_member("nearly-full", member(1)).await.unwrap();
        store.create("sparse").await.unwrap();
        store.add_member("sparse", member(2)).await.unwrap();

        let room = mm.assign_room(member(3)).await.unwrap();
        assert_eq!(room.id, "nearly-full");
        assert!(!room.available);
    }

    #[tokio::test]
    async fn reuses_a_seat_the_user_already_holds() {
        let store = Arc::new(MemoryRoomStore::new(3));
        let mm = matchmaker(&store);

        let first = mm.assign_room(member(0)).await.unwrap();
        let second = mm.assign_room(member(0)).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.members.len(), 1);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn returned_room_contains_the_member() {
        let store = Arc::new(MemoryRoomStore::new(3));
        let mm = matchmaker(&store);

        let room = mm.assign_room(member(7)).await.unwrap();
        assert!(room.members.iter().any(|m| m.user_id == "user-7"));
    }

    #[tokio::test]
    async fn racing_joins_never_oversubscribe_any_room() {
        let store = Arc::new(MemoryRoomStore::new(3));
        // Generous retry budget so no interleaving can exhaust it.
        let mm = Arc::new(Matchmaker::new(store.clone() as Arc<dyn RoomStore>, 3, 16));

        // A small pool of near-full rooms for the joins to race over.
        for r in 0..4 {
            let id = format!("race-{r}");
            store.create(&id).await.unwrap();
            store
                .add_member(&id, member(100 + r))
                .await
                .unwrap();
            store
                .add_member(&id, member(200 + r))
                .await
                .unwrap();
        }

        let mut tasks = Vec::new();
        for n in 0..24 {
            let mm = mm.clone();
            tasks.push(tokio::spawn(async move { mm.assign_room(member(n)).await }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        for r in 0..4 {
            let room = store.get(&format!("race-{r}")).await.unwrap().unwrap();
            assert!(room.members.len() <= 3, "room race-{r} oversubscribed");
        }
        // Every room the store ended up with respects capacity.
        for room in store.list_available().await.unwrap() {
            assert!(room.members.len() < 3);
        }
    }
}
