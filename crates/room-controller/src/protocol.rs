//! Wire events exchanged over the room WebSocket.
//!
//! Every text frame is a single JSON object:
//!
//! ```json
//! {"event": "vote", "data": {"roomId": "X1Y2Z", "value": 5}}
//! ```
//!
//! Events without a payload (`votes-revealed`, `votes-reset`) omit `data`.
//! Field names are camelCase on the wire.

use crate::room::summary::VoteSummary;
use crate::room::{ConnectionId, RoomId};

use serde::{Deserialize, Serialize};

/// Display name used when a join omits `username`.
pub const DEFAULT_USERNAME: &str = "Anonymous";

fn default_username() -> String {
    DEFAULT_USERNAME.to_string()
}

/// Events sent by clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum ClientEvent {
    JoinRoom {
        room_id: RoomId,
        #[serde(default = "default_username")]
        username: String,
    },
    Vote {
        room_id: RoomId,
        value: i64,
    },
    RevealVotes {
        room_id: RoomId,
    },
    ResetVotes {
        room_id: RoomId,
    },
    UpdateStory {
        room_id: RoomId,
        story: String,
    },
}

impl ClientEvent {
    /// Wire name of the event, also used as a bounded metric label.
    #[must_use]
    pub const fn event_type(&self) -> &'static str {
        match self {
            ClientEvent::JoinRoom { .. } => "join-room",
            ClientEvent::Vote { .. } => "vote",
            ClientEvent::RevealVotes { .. } => "reveal-votes",
            ClientEvent::ResetVotes { .. } => "reset-votes",
            ClientEvent::UpdateStory { .. } => "update-story",
        }
    }

    /// Canonical room the event targets.
    #[must_use]
    pub fn room_id(&self) -> &RoomId {
        match self {
            ClientEvent::JoinRoom { room_id, .. }
            | ClientEvent::Vote { room_id, .. }
            | ClientEvent::RevealVotes { room_id }
            | ClientEvent::ResetVotes { room_id }
            | ClientEvent::UpdateStory { room_id, .. } => room_id,
        }
    }

    /// Decode a text frame.
    ///
    /// # Errors
    ///
    /// Returns the serde error for unparseable JSON, unknown event names, and
    /// payloads missing required fields such as `roomId`.
    pub fn from_frame(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// Events sent to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    /// Full room snapshot, possibly redacted for the recipient.
    RoomState(RoomSnapshot),
    /// A new participant joined (sent to everyone but the joiner).
    UserJoined(ParticipantView),
    /// Connection id of the participant that left.
    UserLeft(String),
    /// A participant voted (sent to everyone but the voter).
    VoteReceived(VoteNotice),
    VotesRevealed,
    VotesReset,
    /// New story text.
    StoryUpdated(String),
}

impl ServerEvent {
    /// Wire name of the event.
    #[must_use]
    pub const fn event_type(&self) -> &'static str {
        match self {
            ServerEvent::RoomState(_) => "room-state",
            ServerEvent::UserJoined(_) => "user-joined",
            ServerEvent::UserLeft(_) => "user-left",
            ServerEvent::VoteReceived(_) => "vote-received",
            ServerEvent::VotesRevealed => "votes-revealed",
            ServerEvent::VotesReset => "votes-reset",
            ServerEvent::StoryUpdated(_) => "story-updated",
        }
    }

    /// Encode as a text frame.
    ///
    /// # Errors
    ///
    /// Only fails if a payload cannot be represented as JSON, which the types
    /// here never produce in practice.
    pub fn to_frame(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Room state as seen by one recipient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    pub users: Vec<ParticipantView>,
    pub is_revealed: bool,
    pub current_story: String,
    /// Present only for revealed rooms with at least one vote.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<VoteSummary>,
}

/// One participant inside a snapshot or a `user-joined` notice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantView {
    pub id: ConnectionId,
    pub name: String,
    pub vote: Option<i64>,
    pub has_voted: bool,
}

/// Payload of `vote-received`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteNotice {
    pub user_id: ConnectionId,
    pub vote: Option<i64>,
    pub has_voted: bool,
}
