//! Actor model for the Room Controller.
//!
//! ```text
//! RoomControllerActor (singleton)
//! ├── owns the room registry, session coordinator and fan-out
//! └── ConnectionActor (one per WebSocket, write half only)
//! ```
//!
//! Every client event funnels through the controller's mailbox, so room
//! mutations are serialized. Connection actors only write frames; the read
//! half of each socket lives in [`crate::transport`].

pub mod connection;
pub mod controller;
pub mod messages;
pub mod metrics;

pub use connection::{ConnectionActor, ConnectionActorHandle};
pub use controller::{ControllerSettings, RoomControllerActor, RoomControllerActorHandle};
pub use messages::{ConnectionMessage, ControllerMessage, ControllerStatus};
pub use metrics::{ActorMetrics, ActorType, MailboxLevel, MailboxMonitor};
