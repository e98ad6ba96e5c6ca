//! Estimation rooms: identifiers, participant records, and redacted views.
//!
//! A [`Room`] is owned by the [`RoomRegistry`] and mutated only by the
//! [`Coordinator`], which runs inside the single controller actor. Nothing in
//! this module is async or shared across tasks.
//!
//! # Redaction
//!
//! While a room is collecting, a vote value is visible only to the
//! participant who cast it. `hasVoted` is always visible. Once revealed,
//! every vote is visible to everyone. [`Room::view_for`] is the only place
//! that decision is made.

pub mod code;
pub mod coordinator;
pub mod registry;
pub mod summary;

pub use code::{allocate_room_code, generate_room_code, MAX_ROOM_CODE_ATTEMPTS};
pub use coordinator::{Coordinator, Outbound, Target};
pub use registry::RoomRegistry;
pub use summary::VoteSummary;

use crate::protocol::{ParticipantView, RoomSnapshot};

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::time::Instant;
use uuid::Uuid;

/// Canonical (uppercase) room identifier.
///
/// Any client string is accepted. Construction and deserialization both
/// canonicalize, so `"abc"` and `"ABC"` are the same room.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct RoomId(String);

impl RoomId {
    #[must_use]
    pub fn new(raw: &str) -> Self {
        Self(raw.to_uppercase())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for RoomId {
    fn from(raw: String) -> Self {
        Self::new(&raw)
    }
}

impl From<&str> for RoomId {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<RoomId> for String {
    fn from(id: RoomId) -> Self {
        id.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of one WebSocket connection, stable for its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    /// Create a new random connection ID
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Per-connection vote state within one room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub id: ConnectionId,
    /// Self-asserted display name. Not unique.
    pub name: String,
    pub vote: Option<i64>,
    pub has_voted: bool,
}

impl Participant {
    #[must_use]
    pub fn new(id: ConnectionId, name: String) -> Self {
        Self {
            id,
            name,
            vote: None,
            has_voted: false,
        }
    }

    fn view(&self, show_vote: bool) -> ParticipantView {
        ParticipantView {
            id: self.id,
            name: self.name.clone(),
            vote: if show_vote { self.vote } else { None },
            has_voted: self.has_voted,
        }
    }
}

/// Authoritative state of one room.
#[derive(Debug, Clone)]
pub struct Room {
    id: RoomId,
    /// Insertion order is seating order.
    users: Vec<Participant>,
    is_revealed: bool,
    current_story: String,
    /// When the room last became empty. `None` while occupied.
    empty_since: Option<Instant>,
}

impl Room {
    #[must_use]
    pub fn new(id: RoomId) -> Self {
        Self {
            id,
            users: Vec::new(),
            is_revealed: false,
            current_story: String::new(),
            empty_since: Some(Instant::now()),
        }
    }

    #[must_use]
    pub fn id(&self) -> &RoomId {
        &self.id
    }

    #[must_use]
    pub fn users(&self) -> &[Participant] {
        &self.users
    }

    #[must_use]
    pub fn is_revealed(&self) -> bool {
        self.is_revealed
    }

    #[must_use]
    pub fn current_story(&self) -> &str {
        &self.current_story
    }

    #[must_use]
    pub fn contains(&self, id: ConnectionId) -> bool {
        self.users.iter().any(|u| u.id == id)
    }

    #[must_use]
    pub fn participant(&self, id: ConnectionId) -> Option<&Participant> {
        self.users.iter().find(|u| u.id == id)
    }

    /// Seat a participant. Returns `false` if the connection is already seated.
    pub fn add_participant(&mut self, participant: Participant) -> bool {
        if self.contains(participant.id) {
            return false;
        }
        self.users.push(participant);
        self.empty_since = None;
        true
    }

    /// Remove the participant for `id`. Returns `false` if none was seated.
    pub fn remove_participant(&mut self, id: ConnectionId) -> bool {
        let before = self.users.len();
        self.users.retain(|u| u.id != id);
        let removed = self.users.len() != before;
        if removed && self.users.is_empty() {
            self.empty_since = Some(Instant::now());
        }
        removed
    }

    /// Record a vote. Returns `false` if `id` is not seated.
    pub fn cast_vote(&mut self, id: ConnectionId, value: i64) -> bool {
        match self.users.iter_mut().find(|u| u.id == id) {
            Some(user) => {
                user.vote = Some(value);
                user.has_voted = true;
                true
            }
            None => false,
        }
    }

    pub fn reveal(&mut self) {
        self.is_revealed = true;
    }

    /// Clear every vote and return to collecting. The story is kept.
    pub fn reset(&mut self) {
        self.is_revealed = false;
        for user in &mut self.users {
            user.vote = None;
            user.has_voted = false;
        }
    }

    pub fn set_story(&mut self, story: String) {
        self.current_story = story;
    }

    /// How long the room has been empty, if it is.
    #[must_use]
    pub fn idle_for(&self, now: Instant) -> Option<std::time::Duration> {
        self.empty_since
            .map(|since| now.saturating_duration_since(since))
    }

    /// Snapshot as seen by `viewer`.
    ///
    /// Vote values of other participants are hidden unless the room is
    /// revealed. `None` as viewer hides every vote while collecting.
    #[must_use]
    pub fn view_for(&self, viewer: Option<ConnectionId>) -> RoomSnapshot {
        let users = self
            .users
            .iter()
            .map(|u| u.view(self.is_revealed || Some(u.id) == viewer))
            .collect();

        RoomSnapshot {
            users,
            is_revealed: self.is_revealed,
            current_story: self.current_story.clone(),
            summary: self.summary(),
        }
    }

    /// Unredacted snapshot, for diagnostics and tests.
    #[must_use]
    pub fn snapshot(&self) -> RoomSnapshot {
        RoomSnapshot {
            users: self.users.iter().map(|u| u.view(true)).collect(),
            is_revealed: self.is_revealed,
            current_story: self.current_story.clone(),
            summary: self.summary(),
        }
    }

    fn summary(&self) -> Option<VoteSummary> {
        if self.is_revealed {
            VoteSummary::from_participants(&self.users)
        } else {
            None
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn test_room_id_canonicalizes() {
        assert_eq!(RoomId::new("abc"), RoomId::new("ABC"));
        assert_eq!(RoomId::from("x1y2z").as_str(), "X1Y2Z");
        assert_eq!(RoomId::new("").as_str(), "");
        assert_eq!(RoomId::new("straße").as_str(), "STRASSE");
    }

    #[test]
    fn test_room_id_deserialize_canonicalizes() {
        let id: RoomId = serde_json::from_str(r#""ab-cd""#).unwrap();
        assert_eq!(id.as_str(), "AB-CD");
        assert_eq!(serde_json::to_string(&id).unwrap(), r#""AB-CD""#);
    }

    #[test]
    fn test_connection_id_serializes_as_string() {
        let id = ConnectionId::new();
        assert_eq!(
            serde_json::to_string(&id).unwrap(),
            format!("\"{id}\"")
        );
    }

    #[test]
    fn test_add_participant_is_idempotent() {
        let mut room = Room::new(RoomId::new("R"));
        let id = ConnectionId::new();

        assert!(room.add_participant(Participant::new(id, "Ann".to_string())));
        assert!(!room.add_participant(Participant::new(id, "Ann again".to_string())));

        assert_eq!(room.users().len(), 1);
        assert_eq!(room.users()[0].name, "Ann");
    }

    #[test]
    fn test_duplicate_names_are_kept() {
        let mut room = Room::new(RoomId::new("R"));
        room.add_participant(Participant::new(ConnectionId::new(), "Sam".to_string()));
        room.add_participant(Participant::new(ConnectionId::new(), "Sam".to_string()));

        assert_eq!(room.users().len(), 2);
    }

    #[test]
    fn test_view_for_redacts_other_votes_while_collecting() {
        let mut room = Room::new(RoomId::new("R"));
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        room.add_participant(Participant::new(a, "A".to_string()));
        room.add_participant(Participant::new(b, "B".to_string()));
        room.cast_vote(a, 5);

        let a_view = room.view_for(Some(a));
        assert_eq!(a_view.users[0].vote, Some(5));
        assert!(a_view.users[0].has_voted);

        let b_view = room.view_for(Some(b));
        assert_eq!(b_view.users[0].vote, None);
        assert!(b_view.users[0].has_voted);
        assert!(!b_view.users[1].has_voted);
        assert!(b_view.summary.is_none());

        let anonymous = room.view_for(None);
        assert!(anonymous.users.iter().all(|u| u.vote.is_none()));
    }

    #[test]
    fn test_view_for_shows_everything_when_revealed() {
        let mut room = Room::new(RoomId::new("R"));
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        room.add_participant(Participant::new(a, "A".to_string()));
        room.add_participant(Participant::new(b, "B".to_string()));
        room.cast_vote(a, 5);
        room.cast_vote(b, 8);
        room.reveal();

        let b_view = room.view_for(Some(b));
        assert_eq!(b_view.users[0].vote, Some(5));
        assert_eq!(b_view.users[1].vote, Some(8));
        assert_eq!(b_view, room.view_for(None));
        assert_eq!(b_view.summary.unwrap().count, 2);
    }

    #[test]
    fn test_reset_keeps_story() {
        let mut room = Room::new(RoomId::new("R"));
        let a = ConnectionId::new();
        room.add_participant(Participant::new(a, "A".to_string()));
        room.set_story("Checkout flow".to_string());
        room.cast_vote(a, 3);
        room.reveal();

        room.reset();

        assert!(!room.is_revealed());
        assert_eq!(room.current_story(), "Checkout flow");
        assert_eq!(room.users()[0].vote, None);
        assert!(!room.users()[0].has_voted);
    }

    #[test]
    fn test_cast_vote_unknown_participant() {
        let mut room = Room::new(RoomId::new("R"));
        assert!(!room.cast_vote(ConnectionId::new(), 1));
    }

    #[test]
    fn test_vote_can_change_before_reveal() {
        let mut room = Room::new(RoomId::new("R"));
        let a = ConnectionId::new();
        room.add_participant(Participant::new(a, "A".to_string()));

        room.cast_vote(a, 3);
        room.cast_vote(a, 13);

        assert_eq!(room.participant(a).unwrap().vote, Some(13));
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_tracking() {
        let mut room = Room::new(RoomId::new("R"));
        let a = ConnectionId::new();
        assert!(room.idle_for(Instant::now()).is_some());

        room.add_participant(Participant::new(a, "A".to_string()));
        assert!(room.idle_for(Instant::now()).is_none());

        room.remove_participant(a);
        tokio::time::advance(std::time::Duration::from_secs(10)).await;
        assert_eq!(
            room.idle_for(Instant::now()),
            Some(std::time::Duration::from_secs(10))
        );
    }
}
