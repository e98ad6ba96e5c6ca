//! Transport fan-out: room subscriptions and best-effort delivery.
//!
//! Owned by the controller actor, so subscription changes and deliveries are
//! serialized with event processing. Every delivery is a non-blocking
//! `try_send` into the connection actor's mailbox. A full or closed mailbox
//! drops that one message and moves on; the client catches up on its next
//! `room-state`.

use crate::actors::ConnectionActorHandle;
use crate::protocol::ServerEvent;
use crate::room::{ConnectionId, Outbound, RoomId, Target};

use std::collections::HashMap;
use tracing::{debug, warn};

/// Result of delivering a batch of outbound events.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub dropped: usize,
}

impl DeliveryReport {
    fn merge(&mut self, other: DeliveryReport) {
        self.delivered += other.delivered;
        self.dropped += other.dropped;
    }
}

#[derive(Debug, Default)]
pub struct Fanout {
    /// Subscribers per room, in subscription order.
    subscriptions: HashMap<RoomId, Vec<ConnectionId>>,
    connections: HashMap<ConnectionId, ConnectionActorHandle>,
}

impl Fanout {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make a connection reachable by `send_to`.
    pub fn register(&mut self, handle: ConnectionActorHandle) {
        self.connections.insert(handle.connection_id(), handle);
    }

    #[must_use]
    pub fn is_registered(&self, connection_id: ConnectionId) -> bool {
        self.connections.contains_key(&connection_id)
    }

    /// Drop the connection and every room subscription it holds.
    pub fn unregister(&mut self, connection_id: ConnectionId) -> Option<ConnectionActorHandle> {
        self.subscriptions.retain(|_, subscribers| {
            subscribers.retain(|id| *id != connection_id);
            !subscribers.is_empty()
        });
        self.connections.remove(&connection_id)
    }

    /// Subscribe a connection to a room's broadcasts. Idempotent.
    pub fn subscribe(&mut self, connection_id: ConnectionId, room_id: &RoomId) {
        let subscribers = self.subscriptions.entry(room_id.clone()).or_default();
        if !subscribers.contains(&connection_id) {
            subscribers.push(connection_id);
        }
    }

    /// Forget a room's subscriber list (used when the room is evicted).
    pub fn remove_room(&mut self, room_id: &RoomId) {
        self.subscriptions.remove(room_id);
    }

    #[must_use]
    pub fn subscribers(&self, room_id: &RoomId) -> &[ConnectionId] {
        self.subscriptions
            .get(room_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn handles(&self) -> impl Iterator<Item = &ConnectionActorHandle> {
        self.connections.values()
    }

    /// Deliver to exactly one connection. Returns whether it was queued.
    pub fn send_to(&self, connection_id: ConnectionId, event: ServerEvent) -> bool {
        let Some(handle) = self.connections.get(&connection_id) else {
            debug!(
                target: "rc.transport",
                connection_id = %connection_id,
                event_type = event.event_type(),
                "Dropping message for unknown connection"
            );
            return false;
        };

        match handle.try_send(event) {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    target: "rc.transport",
                    connection_id = %connection_id,
                    error = %e,
                    "Message dropped"
                );
                false
            }
        }
    }

    /// Deliver to every subscriber of `room_id` except `except`.
    pub fn broadcast(
        &self,
        room_id: &RoomId,
        event: &ServerEvent,
        except: Option<ConnectionId>,
    ) -> DeliveryReport {
        let mut report = DeliveryReport::default();
        for connection_id in self.subscribers(room_id) {
            if Some(*connection_id) == except {
                continue;
            }
            if self.send_to(*connection_id, event.clone()) {
                report.delivered += 1;
            } else {
                report.dropped += 1;
            }
        }
        report
    }

    /// Deliver coordinator output in emission order.
    pub fn deliver(&self, outbound: Vec<Outbound>) -> DeliveryReport {
        let mut report = DeliveryReport::default();
        for Outbound { target, event } in outbound {
            match target {
                Target::Connection(connection_id) => {
                    if self.send_to(connection_id, event) {
                        report.delivered += 1;
                    } else {
                        report.dropped += 1;
                    }
                }
                Target::Room { room_id, except } => {
                    report.merge(self.broadcast(&room_id, &event, except));
                }
            }
        }
        report
    }
}
