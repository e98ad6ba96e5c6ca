//! Room Controller (RC) Service Library
//!
//! Real-time planning-poker rooms over WebSocket. The RC is responsible for:
//!
//! - Keeping every room's participants, votes, reveal flag and story in memory
//! - Applying client events (join, vote, reveal, reset, story) in arrival order
//! - Fanning out the resulting events to the room's subscribers
//! - Hiding other participants' votes until a room is revealed
//!
//! # Architecture
//!
//! ```text
//! RoomControllerActor (singleton per RC instance)
//! ├── Coordinator (room registry + event handlers + redaction)
//! ├── Fanout (room subscriptions, per-connection delivery)
//! └── N ConnectionActors (one per WebSocket, write half)
//! ```
//!
//! # Key Design Decisions
//!
//! - **Single writer**: all room mutations happen inside the controller actor
//! - **Per-recipient snapshots**: while a room is collecting votes, each
//!   member receives its own `room-state` with only its own vote visible
//! - **Best-effort delivery**: a slow connection drops messages instead of
//!   stalling the room; the next `room-state` resynchronizes it
//! - **Lazy rooms**: a room exists from its first join; emptied rooms are kept
//!   unless idle eviction is configured
//!
//! # Modules
//!
//! - [`room`] - Room data, registry, session coordinator, vote summary
//! - [`fanout`] - Room subscriptions and delivery
//! - [`protocol`] - Wire events
//! - [`actors`] - Controller and connection actors
//! - [`transport`] - WebSocket endpoint
//! - [`routes`] - HTTP routers
//! - [`config`] - Service configuration from environment
//! - [`errors`] - Error types with appropriate error codes
//! - [`observability`] - Health probes and Prometheus metrics

pub mod actors;
pub mod config;
pub mod errors;
pub mod fanout;
pub mod observability;
pub mod protocol;
pub mod room;
pub mod routes;
pub mod transport;
