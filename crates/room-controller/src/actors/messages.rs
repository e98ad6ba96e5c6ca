//! Message types for actor communication.
//!
//! Request/reply uses `tokio::sync::oneshot`. Client events are
//! fire-and-forget so a connection never waits on the controller.

use super::connection::ConnectionActorHandle;
use crate::errors::RcError;
use crate::protocol::{ClientEvent, RoomSnapshot, ServerEvent};
use crate::room::{ConnectionId, RoomId};

use tokio::sync::oneshot;
use tokio::time::Instant;

/// Messages sent to `RoomControllerActor`.
#[derive(Debug)]
pub enum ControllerMessage {
    /// Register a new connection so it can receive fan-out.
    Connect {
        handle: ConnectionActorHandle,
        respond_to: oneshot::Sender<Result<(), RcError>>,
    },

    /// A decoded client event.
    Event {
        connection_id: ConnectionId,
        event: ClientEvent,
        /// When the frame was read off the socket.
        received_at: Instant,
    },

    /// The connection's socket closed.
    Disconnect { connection_id: ConnectionId },

    /// Unredacted snapshot of one room.
    GetRoom {
        room_id: RoomId,
        respond_to: oneshot::Sender<Result<RoomSnapshot, RcError>>,
    },

    /// Allocate a random room code not currently in the registry.
    AllocateRoomCode {
        respond_to: oneshot::Sender<Result<RoomId, RcError>>,
    },

    GetStatus {
        respond_to: oneshot::Sender<ControllerStatus>,
    },

    /// Stop accepting events and close every connection.
    Shutdown {
        respond_to: oneshot::Sender<Result<(), RcError>>,
    },
}

/// Messages sent to `ConnectionActor`.
#[derive(Debug)]
pub enum ConnectionMessage {
    /// Write an event to the socket.
    Send { event: ServerEvent },

    /// Send a close frame and stop.
    Close { reason: String },
}

/// Controller status for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerStatus {
    pub room_count: usize,
    pub connection_count: usize,
    pub participant_count: usize,
    pub is_draining: bool,
    pub mailbox_depth: usize,
}
