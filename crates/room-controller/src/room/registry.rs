//! Process-wide map from canonical room id to room state.
//!
//! Rooms are created lazily by [`RoomRegistry::get_or_create`] and are never
//! deleted by the coordinator. The only removal path is
//! [`RoomRegistry::evict_idle`], which the controller runs when an idle TTL
//! is configured.

use super::{Room, RoomId};

use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Default)]
pub struct RoomRegistry {
    rooms: HashMap<RoomId, Room>,
}

impl RoomRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Existing room for `room_id`, or a fresh collecting room with no
    /// participants and an empty story.
    pub fn get_or_create(&mut self, room_id: &RoomId) -> &mut Room {
        self.rooms.entry(room_id.clone()).or_insert_with(|| {
            debug!(target: "rc.room", room_id = %room_id, "Room created");
            Room::new(room_id.clone())
        })
    }

    #[must_use]
    pub fn get(&self, room_id: &RoomId) -> Option<&Room> {
        self.rooms.get(room_id)
    }

    pub fn get_mut(&mut self, room_id: &RoomId) -> Option<&mut Room> {
        self.rooms.get_mut(room_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Room> {
        self.rooms.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    /// Total participants across all rooms.
    #[must_use]
    pub fn participant_count(&self) -> usize {
        self.rooms.values().map(|r| r.users().len()).sum()
    }

    /// Remove rooms that have been empty for at least `ttl`.
    ///
    /// Returns the ids of the evicted rooms.
    pub fn evict_idle(&mut self, ttl: Duration, now: Instant) -> Vec<RoomId> {
        let expired: Vec<RoomId> = self
            .rooms
            .values()
            .filter(|room| room.idle_for(now).is_some_and(|idle| idle >= ttl))
            .map(|room| room.id().clone())
            .collect();

        for room_id in &expired {
            self.rooms.remove(room_id);
            debug!(target: "rc.room", room_id = %room_id, "Idle room evicted");
        }

        expired
    }
}
