//! Room session coordinator.
//!
//! Applies client events to room state and computes what each recipient
//! should receive. Handlers are synchronous and never fail: an event naming
//! an unknown room or a non-member connection produces no output.
//!
//! Output is a list of [`Outbound`] deliveries in emission order. The fan-out
//! layer must deliver them in that order.
//!
//! # Room state delivery
//!
//! A `room-state` for a revealed room is identical for every member and goes
//! out as one room broadcast. While collecting, each member gets a separate
//! delivery carrying their own redacted view.

use super::{ConnectionId, Participant, Room, RoomId, RoomRegistry};
use crate::protocol::{ClientEvent, ServerEvent, VoteNotice};

use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Who a delivery is for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Exactly one connection.
    Connection(ConnectionId),
    /// Every connection subscribed to the room, minus `except`.
    Room {
        room_id: RoomId,
        except: Option<ConnectionId>,
    },
}

/// One event addressed to a target.
#[derive(Debug, Clone, PartialEq)]
pub struct Outbound {
    pub target: Target,
    pub event: ServerEvent,
}

impl Outbound {
    fn to_connection(connection_id: ConnectionId, event: ServerEvent) -> Self {
        Self {
            target: Target::Connection(connection_id),
            event,
        }
    }

    fn to_room(room_id: &RoomId, except: Option<ConnectionId>, event: ServerEvent) -> Self {
        Self {
            target: Target::Room {
                room_id: room_id.clone(),
                except,
            },
            event,
        }
    }
}

/// Session coordinator over an injected [`RoomRegistry`].
#[derive(Debug, Default)]
pub struct Coordinator {
    registry: RoomRegistry,
    /// Rooms each connection is seated in, in join order.
    memberships: HashMap<ConnectionId, Vec<RoomId>>,
}

impl Coordinator {
    #[must_use]
    pub fn new(registry: RoomRegistry) -> Self {
        Self {
            registry,
            memberships: HashMap::new(),
        }
    }

    #[must_use]
    pub fn registry(&self) -> &RoomRegistry {
        &self.registry
    }

    /// Rooms the connection is currently seated in.
    #[must_use]
    pub fn rooms_of(&self, connection_id: ConnectionId) -> &[RoomId] {
        self.memberships
            .get(&connection_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Dispatch a decoded client event.
    pub fn handle(&mut self, connection_id: ConnectionId, event: ClientEvent) -> Vec<Outbound> {
        match event {
            ClientEvent::JoinRoom { room_id, username } => {
                self.join(&room_id, connection_id, username)
            }
            ClientEvent::Vote { room_id, value } => self.vote(&room_id, connection_id, value),
            ClientEvent::RevealVotes { room_id } => self.reveal(&room_id, connection_id),
            ClientEvent::ResetVotes { room_id } => self.reset(&room_id, connection_id),
            ClientEvent::UpdateStory { room_id, story } => {
                self.update_story(&room_id, connection_id, story)
            }
        }
    }

    /// Seat `connection_id` in the room, creating the room if needed.
    ///
    /// A repeated join from the same connection keeps the existing seat and
    /// name, skips `user-joined`, and still re-sends full state.
    pub fn join(
        &mut self,
        room_id: &RoomId,
        connection_id: ConnectionId,
        name: String,
    ) -> Vec<Outbound> {
        let name_len = name.len();
        let room = self.registry.get_or_create(room_id);
        let participant = Participant::new(connection_id, name);
        let joined_view = participant.view(false);
        let is_new = room.add_participant(participant);

        let mut out = vec![Outbound::to_connection(
            connection_id,
            ServerEvent::RoomState(room.view_for(Some(connection_id))),
        )];
        if is_new {
            out.push(Outbound::to_room(
                room_id,
                Some(connection_id),
                ServerEvent::UserJoined(joined_view),
            ));
        }
        out.extend(state_for_members(room));

        debug!(
            target: "rc.room",
            room_id = %room_id,
            connection_id = %connection_id,
            name_len,
            is_new,
            participants = room.users().len(),
            "Participant joined"
        );

        if is_new {
            self.memberships
                .entry(connection_id)
                .or_default()
                .push(room_id.clone());
        }

        out
    }

    /// Record or change a vote. Non-members and unknown rooms are ignored.
    pub fn vote(
        &mut self,
        room_id: &RoomId,
        connection_id: ConnectionId,
        value: i64,
    ) -> Vec<Outbound> {
        let Some(room) = self.registry.get_mut(room_id) else {
            return Vec::new();
        };
        if !room.cast_vote(connection_id, value) {
            debug!(
                target: "rc.room",
                room_id = %room_id,
                connection_id = %connection_id,
                "Vote from non-member ignored"
            );
            return Vec::new();
        }

        let notice = VoteNotice {
            user_id: connection_id,
            vote: room.is_revealed().then_some(value),
            has_voted: true,
        };

        let mut out = vec![Outbound::to_room(
            room_id,
            Some(connection_id),
            ServerEvent::VoteReceived(notice),
        )];
        out.extend(state_for_members(room));
        out
    }

    /// Make every vote visible. Idempotent.
    pub fn reveal(&mut self, room_id: &RoomId, connection_id: ConnectionId) -> Vec<Outbound> {
        let Some(room) = self.registry.get_mut(room_id) else {
            return Vec::new();
        };
        room.reveal();

        debug!(
            target: "rc.room",
            room_id = %room_id,
            connection_id = %connection_id,
            "Votes revealed"
        );

        let mut out = vec![Outbound::to_room(room_id, None, ServerEvent::VotesRevealed)];
        out.extend(state_for_members(room));
        out
    }

    /// Clear all votes and return to collecting.
    pub fn reset(&mut self, room_id: &RoomId, connection_id: ConnectionId) -> Vec<Outbound> {
        let Some(room) = self.registry.get_mut(room_id) else {
            return Vec::new();
        };
        room.reset();

        debug!(
            target: "rc.room",
            room_id = %room_id,
            connection_id = %connection_id,
            "Votes reset"
        );

        let mut out = vec![Outbound::to_room(room_id, None, ServerEvent::VotesReset)];
        out.extend(state_for_members(room));
        out
    }

    /// Replace the story text verbatim.
    pub fn update_story(
        &mut self,
        room_id: &RoomId,
        connection_id: ConnectionId,
        story: String,
    ) -> Vec<Outbound> {
        let Some(room) = self.registry.get_mut(room_id) else {
            return Vec::new();
        };

        debug!(
            target: "rc.room",
            room_id = %room_id,
            connection_id = %connection_id,
            story_len = story.len(),
            "Story updated"
        );

        room.set_story(story.clone());

        let mut out = vec![Outbound::to_room(
            room_id,
            None,
            ServerEvent::StoryUpdated(story),
        )];
        out.extend(state_for_members(room));
        out
    }

    /// Remove the connection from every room it is seated in.
    ///
    /// Rooms where nothing was removed produce no output.
    pub fn leave(&mut self, connection_id: ConnectionId) -> Vec<Outbound> {
        let Some(room_ids) = self.memberships.remove(&connection_id) else {
            return Vec::new();
        };

        let mut out = Vec::new();
        for room_id in room_ids {
            let Some(room) = self.registry.get_mut(&room_id) else {
                continue;
            };
            if !room.remove_participant(connection_id) {
                continue;
            }

            debug!(
                target: "rc.room",
                room_id = %room_id,
                connection_id = %connection_id,
                remaining = room.users().len(),
                "Participant left"
            );

            out.push(Outbound::to_room(
                &room_id,
                Some(connection_id),
                ServerEvent::UserLeft(connection_id.to_string()),
            ));
            out.extend(state_for_members(room));
        }
        out
    }

    /// Drop rooms that have been empty for at least `ttl`.
    pub fn evict_idle(&mut self, ttl: Duration, now: Instant) -> Vec<RoomId> {
        self.registry.evict_idle(ttl, now)
    }
}

/// `room-state` deliveries for every current member of `room`.
fn state_for_members(room: &Room) -> Vec<Outbound> {
    if room.is_revealed() {
        return vec![Outbound::to_room(
            room.id(),
            None,
            ServerEvent::RoomState(room.view_for(None)),
        )];
    }

    room.users()
        .iter()
        .map(|user| {
            Outbound::to_connection(user.id, ServerEvent::RoomState(room.view_for(Some(user.id))))
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing, clippy::panic)]
mod tests {
    use super::*;
    use crate::protocol::{ParticipantView, RoomSnapshot};

    fn coordinator() -> Coordinator {
        Coordinator::new(RoomRegistry::new())
    }

    /// The last `room-state` each connection would observe from `out`.
    fn state_seen_by(out: &[Outbound], who: ConnectionId, room_id: &RoomId) -> Option<RoomSnapshot> {
        out.iter()
            .rev()
            .find_map(|o| match (&o.target, &o.event) {
                (Target::Connection(id), ServerEvent::RoomState(s)) if *id == who => {
                    Some(s.clone())
                }
                (Target::Room { room_id: r, except }, ServerEvent::RoomState(s))
                    if r == room_id && *except != Some(who) =>
                {
                    Some(s.clone())
                }
                _ => None,
            })
    }

    fn votes(snapshot: &RoomSnapshot) -> Vec<(Option<i64>, bool)> {
        snapshot.users.iter().map(|u| (u.vote, u.has_voted)).collect()
    }

    #[test]
    fn test_join_emits_private_state_notice_and_broadcast() {
        let mut c = coordinator();
        let room = RoomId::new("X1Y2Z");
        let a = ConnectionId::new();
        let b = ConnectionId::new();

        c.join(&room, a, "A".to_string());
        let out = c.join(&room, b, "B".to_string());

        assert_eq!(out[0].target, Target::Connection(b));
        assert!(matches!(out[0].event, ServerEvent::RoomState(_)));
        assert_eq!(
            out[1],
            Outbound {
                target: Target::Room {
                    room_id: room.clone(),
                    except: Some(b)
                },
                event: ServerEvent::UserJoined(ParticipantView {
                    id: b,
                    name: "B".to_string(),
                    vote: None,
                    has_voted: false,
                }),
            }
        );
        // One per-member room-state while collecting.
        assert_eq!(out.len(), 4);
        let names: Vec<_> = state_seen_by(&out, a, &room)
            .unwrap()
            .users
            .into_iter()
            .map(|u| u.name)
            .collect();
        assert_eq!(names, vec!["A", "B"]);
    }

    #[test]
    fn test_join_is_idempotent_per_connection() {
        let mut c = coordinator();
        let room = RoomId::new("R");
        let a = ConnectionId::new();

        c.join(&room, a, "A".to_string());
        let out = c.join(&room, a, "Renamed".to_string());

        let room_state = c.registry().get(&room).unwrap();
        assert_eq!(room_state.users().len(), 1);
        assert_eq!(room_state.users()[0].name, "A");
        assert!(out
            .iter()
            .all(|o| !matches!(o.event, ServerEvent::UserJoined(_))));
        assert_eq!(out[0].target, Target::Connection(a));
        assert_eq!(c.rooms_of(a), &[room]);
    }

    #[test]
    fn test_join_into_revealed_room_sees_votes() {
        let mut c = coordinator();
        let room = RoomId::new("R");
        let a = ConnectionId::new();
        let late = ConnectionId::new();

        c.join(&room, a, "A".to_string());
        c.vote(&room, a, 8);
        c.reveal(&room, a);
        let out = c.join(&room, late, "Late".to_string());

        let ServerEvent::RoomState(private) = &out[0].event else {
            panic!("expected room-state first");
        };
        assert!(private.is_revealed);
        assert_eq!(private.users[0].vote, Some(8));
        assert!(private.summary.is_some());
    }

    #[test]
    fn test_reveal_with_partial_votes() {
        let mut c = coordinator();
        let room = RoomId::new("R");
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        c.join(&room, a, "A".to_string());
        c.join(&room, b, "B".to_string());
        c.vote(&room, a, 3);

        let out = c.reveal(&room, b);

        for who in [a, b] {
            let state = state_seen_by(&out, who, &room).expect("member should see state");
            assert!(state.is_revealed);

            let voter = state.users.iter().find(|u| u.id == a).unwrap();
            assert_eq!(voter.vote, Some(3));
            assert!(voter.has_voted);

            let abstainer = state.users.iter().find(|u| u.id == b).unwrap();
            assert_eq!(abstainer.vote, None);
            assert!(!abstainer.has_voted);

            let summary = state.summary.expect("revealed room has a summary");
            assert_eq!(summary.count, 1);
        }
    }

    #[test]
    fn test_vote_redaction_per_recipient() {
        let mut c = coordinator();
        let room = RoomId::new("R");
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        c.join(&room, a, "A".to_string());
        c.join(&room, b, "B".to_string());

        let out = c.vote(&room, a, 5);

        assert_eq!(
            out[0],
            Outbound {
                target: Target::Room {
                    room_id: room.clone(),
                    except: Some(a)
                },
                event: ServerEvent::VoteReceived(VoteNotice {
                    user_id: a,
                    vote: None,
                    has_voted: true
                }),
            }
        );
        assert_eq!(
            votes(&state_seen_by(&out, a, &room).unwrap()),
            vec![(Some(5), true), (None, false)]
        );
        assert_eq!(
            votes(&state_seen_by(&out, b, &room).unwrap()),
            vec![(None, true), (None, false)]
        );
    }

    #[test]
    fn test_no_other_vote_leaks_while_collecting() {
        let mut c = coordinator();
        let room = RoomId::new("R");
        let ids: Vec<ConnectionId> = (0..4).map(|_| ConnectionId::new()).collect();
        let mut all = Vec::new();
        for (i, id) in ids.iter().enumerate() {
            all.extend(c.join(&room, *id, format!("P{i}")));
        }
        for (i, id) in ids.iter().enumerate() {
            all.extend(c.vote(&room, *id, i64::try_from(i).unwrap() + 1));
        }
        all.extend(c.update_story(&room, ids[0], "story".to_string()));

        for o in &all {
            match (&o.target, &o.event) {
                (Target::Connection(viewer), ServerEvent::RoomState(s)) => {
                    for u in &s.users {
                        if u.id != *viewer {
                            assert_eq!(u.vote, None);
                        }
                    }
                }
                (_, ServerEvent::RoomState(s)) => {
                    assert!(s.users.iter().all(|u| u.vote.is_none()));
                }
                (_, ServerEvent::VoteReceived(n)) => assert_eq!(n.vote, None),
                _ => {}
            }
        }
    }

    #[test]
    fn test_vote_after_reveal_is_visible() {
        let mut c = coordinator();
        let room = RoomId::new("R");
        let a = ConnectionId::new();
        c.join(&room, a, "A".to_string());
        c.reveal(&room, a);

        let out = c.vote(&room, a, 3);

        let ServerEvent::VoteReceived(notice) = &out[0].event else {
            panic!("expected vote-received");
        };
        assert_eq!(notice.vote, Some(3));
        assert!(matches!(
            out[1].target,
            Target::Room { except: None, .. }
        ));
    }

    #[test]
    fn test_vote_noops() {
        let mut c = coordinator();
        let room = RoomId::new("R");
        let a = ConnectionId::new();

        assert!(c.vote(&room, a, 1).is_empty());

        c.join(&room, a, "A".to_string());
        assert!(c.vote(&room, ConnectionId::new(), 1).is_empty());
        assert!(c.reveal(&RoomId::new("other"), a).is_empty());
        assert!(c.reset(&RoomId::new("other"), a).is_empty());
        assert!(c
            .update_story(&RoomId::new("other"), a, "x".to_string())
            .is_empty());
        assert!(c.registry().get(&RoomId::new("other")).is_none());
    }

    #[test]
    fn test_reveal_then_reset() {
        let mut c = coordinator();
        let room = RoomId::new("R");
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        c.join(&room, a, "A".to_string());
        c.join(&room, b, "B".to_string());
        c.update_story(&room, a, "Login".to_string());
        c.vote(&room, a, 5);
        c.vote(&room, b, 8);

        let out = c.reveal(&room, b);
        assert_eq!(out[0].event, ServerEvent::VotesRevealed);
        assert_eq!(out.len(), 2);
        let revealed = state_seen_by(&out, a, &room).unwrap();
        assert!(revealed.is_revealed);
        assert_eq!(votes(&revealed), vec![(Some(5), true), (Some(8), true)]);
        assert_eq!(revealed.summary.as_ref().unwrap().count, 2);

        // Second reveal is harmless.
        assert_eq!(c.reveal(&room, a).len(), 2);

        let out = c.reset(&room, a);
        assert_eq!(out[0].event, ServerEvent::VotesReset);
        for who in [a, b] {
            let state = state_seen_by(&out, who, &room).unwrap();
            assert!(!state.is_revealed);
            assert_eq!(state.current_story, "Login");
            assert_eq!(votes(&state), vec![(None, false), (None, false)]);
            assert!(state.summary.is_none());
        }
    }

    #[test]
    fn test_update_story_verbatim() {
        let mut c = coordinator();
        let room = RoomId::new("R");
        let a = ConnectionId::new();
        c.join(&room, a, "A".to_string());

        let story = "  <b>multi\nline</b>  ".to_string();
        let out = c.update_story(&room, a, story.clone());

        assert_eq!(out[0].event, ServerEvent::StoryUpdated(story.clone()));
        assert_eq!(c.registry().get(&room).unwrap().current_story(), story);

        let out = c.update_story(&room, a, String::new());
        assert_eq!(out[0].event, ServerEvent::StoryUpdated(String::new()));
    }

    #[test]
    fn test_leave_removes_from_every_room() {
        let mut c = coordinator();
        let one = RoomId::new("one");
        let two = RoomId::new("two");
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        c.join(&one, a, "A".to_string());
        c.join(&two, a, "A".to_string());
        c.join(&one, b, "B".to_string());

        let out = c.leave(a);

        assert_eq!(
            out[0],
            Outbound {
                target: Target::Room {
                    room_id: one.clone(),
                    except: Some(a)
                },
                event: ServerEvent::UserLeft(a.to_string()),
            }
        );
        let after = state_seen_by(&out, b, &one).unwrap();
        assert_eq!(after.users.len(), 1);
        assert_eq!(after.users[0].id, b);

        assert!(out.iter().any(|o| o.target
            == Target::Room {
                room_id: two.clone(),
                except: Some(a)
            }));
        assert!(c.registry().get(&two).unwrap().users().is_empty());
        // Empty rooms are kept.
        assert_eq!(c.registry().len(), 2);
        assert!(c.rooms_of(a).is_empty());
        assert_eq!(c.rooms_of(b), &[one]);
    }

    #[test]
    fn test_leave_unknown_connection_is_noop() {
        let mut c = coordinator();
        let room = RoomId::new("R");
        let a = ConnectionId::new();
        c.join(&room, a, "A".to_string());

        assert!(c.leave(ConnectionId::new()).is_empty());
        assert_eq!(c.registry().get(&room).unwrap().users().len(), 1);
    }

    #[test]
    fn test_case_insensitive_room_ids() {
        let mut c = coordinator();
        let a = ConnectionId::new();
        c.join(&RoomId::new("abc"), a, "A".to_string());

        let out = c.vote(&RoomId::new("ABC"), a, 2);

        assert!(!out.is_empty());
        assert_eq!(
            c.registry()
                .get(&RoomId::new("Abc"))
                .unwrap()
                .participant(a)
                .unwrap()
                .vote,
            Some(2)
        );
    }

    #[test]
    fn test_handle_dispatches_client_events() {
        let mut c = coordinator();
        let a = ConnectionId::new();

        c.handle(
            a,
            ClientEvent::JoinRoom {
                room_id: RoomId::new("r"),
                username: "A".to_string(),
            },
        );
        c.handle(
            a,
            ClientEvent::Vote {
                room_id: RoomId::new("r"),
                value: 21,
            },
        );
        let out = c.handle(a, ClientEvent::RevealVotes { room_id: RoomId::new("R") });

        let snapshot = state_seen_by(&out, a, &RoomId::new("R")).unwrap();
        assert_eq!(snapshot.users[0].vote, Some(21));
    }

    #[test]
    fn test_scenario_two_participants_full_round() {
        let mut c = coordinator();
        let room = RoomId::new("X1Y2Z");
        let a = ConnectionId::new();
        let b = ConnectionId::new();

        let out = c.join(&room, a, "A".to_string());
        let state = state_seen_by(&out, a, &room).unwrap();
        assert_eq!(state.users.len(), 1);
        assert!(!state.is_revealed);

        let out = c.join(&room, b, "B".to_string());
        for who in [a, b] {
            let ids: Vec<_> = state_seen_by(&out, who, &room)
                .unwrap()
                .users
                .iter()
                .map(|u| u.id)
                .collect();
            assert_eq!(ids, vec![a, b]);
        }

        let out = c.vote(&room, a, 5);
        assert_eq!(votes(&state_seen_by(&out, b, &room).unwrap())[0], (None, true));
        assert_eq!(votes(&state_seen_by(&out, a, &room).unwrap())[0], (Some(5), true));

        c.vote(&room, b, 8);
        let out = c.reveal(&room, a);
        for who in [a, b] {
            let state = state_seen_by(&out, who, &room).unwrap();
            assert!(state.is_revealed);
            assert_eq!(votes(&state), vec![(Some(5), true), (Some(8), true)]);
        }

        let out = c.reset(&room, b);
        for who in [a, b] {
            let state = state_seen_by(&out, who, &room).unwrap();
            assert!(!state.is_revealed);
            assert_eq!(votes(&state), vec![(None, false), (None, false)]);
        }
    }
}
