//! `RoomControllerActor` - singleton owner of all room state.
//!
//! The controller is the single writer for the room registry:
//!
//! - Owns the session [`Coordinator`] and the [`Fanout`]
//! - Processes one message at a time, so each event is applied and fanned
//!   out before the next one is looked at
//! - Owns the root `CancellationToken`; connection actors run on child tokens
//! - Optionally evicts rooms that have been empty longer than a TTL
//!
//! # Graceful Shutdown
//!
//! On SIGTERM, the controller:
//! 1. Sets `accepting_new = false` (further events are dropped)
//! 2. Cancels every connection actor, which sends a close frame
//! 3. Cancels the root `CancellationToken`

use crate::config::Config;
use crate::errors::RcError;
use crate::fanout::Fanout;
use crate::observability;
use crate::protocol::{ClientEvent, RoomSnapshot};
use crate::room::{allocate_room_code, ConnectionId, Coordinator, Room, RoomId, RoomRegistry};

use super::connection::ConnectionActorHandle;
use super::messages::{ControllerMessage, ControllerStatus};
use super::metrics::{ActorMetrics, ActorType, MailboxMonitor};

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Default channel buffer size for the controller mailbox.
const CONTROLLER_CHANNEL_BUFFER: usize = 1000;

/// Upper bound on the idle sweep period.
const MAX_EVICTION_INTERVAL: Duration = Duration::from_secs(30);

/// Tunables the controller needs from [`Config`].
#[derive(Debug, Clone)]
pub struct ControllerSettings {
    /// Evict rooms empty for this long. `None` keeps rooms forever.
    pub idle_room_ttl: Option<Duration>,
    pub room_code_length: usize,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            idle_room_ttl: None,
            room_code_length: crate::config::DEFAULT_ROOM_CODE_LENGTH,
        }
    }
}

impl From<&Config> for ControllerSettings {
    fn from(config: &Config) -> Self {
        Self {
            idle_room_ttl: config.idle_room_ttl(),
            room_code_length: config.room_code_length,
        }
    }
}

/// Handle to the `RoomControllerActor`.
#[derive(Clone, Debug)]
pub struct RoomControllerActorHandle {
    sender: mpsc::Sender<ControllerMessage>,
    cancel_token: CancellationToken,
}

impl RoomControllerActorHandle {
    /// Create a new `RoomControllerActor` and return a handle to it.
    ///
    /// This spawns the actor task and returns immediately.
    #[must_use]
    pub fn new(rc_id: String, settings: ControllerSettings, metrics: Arc<ActorMetrics>) -> Self {
        let (sender, receiver) = mpsc::channel(CONTROLLER_CHANNEL_BUFFER);
        let cancel_token = CancellationToken::new();

        let actor = RoomControllerActor::new(
            rc_id,
            receiver,
            cancel_token.clone(),
            settings,
            metrics,
        );

        tokio::spawn(actor.run());

        Self {
            sender,
            cancel_token,
        }
    }

    /// Register a connection for fan-out.
    pub async fn connect(&self, handle: ConnectionActorHandle) -> Result<(), RcError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(ControllerMessage::Connect {
                handle,
                respond_to: tx,
            })
            .await
            .map_err(|e| RcError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| RcError::Internal(format!("response receive failed: {e}")))?
    }

    /// Queue a client event. Does not wait for processing.
    ///
    /// Events from one caller are processed in the order they are dispatched.
    pub async fn dispatch(
        &self,
        connection_id: ConnectionId,
        event: ClientEvent,
    ) -> Result<(), RcError> {
        if self.cancel_token.is_cancelled() {
            return Err(RcError::Draining);
        }

        self.sender
            .send(ControllerMessage::Event {
                connection_id,
                event,
                received_at: Instant::now(),
            })
            .await
            .map_err(|e| RcError::Internal(format!("channel send failed: {e}")))
    }

    /// Report that a connection's socket has closed.
    pub async fn disconnect(&self, connection_id: ConnectionId) -> Result<(), RcError> {
        self.sender
            .send(ControllerMessage::Disconnect { connection_id })
            .await
            .map_err(|e| RcError::Internal(format!("channel send failed: {e}")))
    }

    /// Unredacted snapshot of a room.
    pub async fn get_room(&self, room_id: RoomId) -> Result<RoomSnapshot, RcError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(ControllerMessage::GetRoom {
                room_id,
                respond_to: tx,
            })
            .await
            .map_err(|e| RcError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| RcError::Internal(format!("response receive failed: {e}")))?
    }

    /// Pick an unused room code. The room is created by the first join.
    pub async fn allocate_room_code(&self) -> Result<RoomId, RcError> {
        if self.cancel_token.is_cancelled() {
            return Err(RcError::Draining);
        }

        let (tx, rx) = oneshot::channel();
        self.sender
            .send(ControllerMessage::AllocateRoomCode { respond_to: tx })
            .await
            .map_err(|e| RcError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| RcError::Internal(format!("response receive failed: {e}")))?
    }

    pub async fn get_status(&self) -> Result<ControllerStatus, RcError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(ControllerMessage::GetStatus { respond_to: tx })
            .await
            .map_err(|e| RcError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| RcError::Internal(format!("response receive failed: {e}")))
    }

    /// Initiate graceful shutdown.
    pub async fn shutdown(&self) -> Result<(), RcError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(ControllerMessage::Shutdown { respond_to: tx })
            .await
            .map_err(|e| RcError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| RcError::Internal(format!("response receive failed: {e}")))?
    }

    /// Cancel the actor (for immediate shutdown).
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Get a child token for spawning connection actors and servers.
    #[must_use]
    pub fn child_token(&self) -> CancellationToken {
        self.cancel_token.child_token()
    }
}

/// The `RoomControllerActor` implementation.
pub struct RoomControllerActor {
    rc_id: String,
    receiver: mpsc::Receiver<ControllerMessage>,
    cancel_token: CancellationToken,
    coordinator: Coordinator,
    fanout: Fanout,
    settings: ControllerSettings,
    /// Whether events and new connections are accepted.
    accepting_new: bool,
    metrics: Arc<ActorMetrics>,
    mailbox: MailboxMonitor,
}

impl RoomControllerActor {
    fn new(
        rc_id: String,
        receiver: mpsc::Receiver<ControllerMessage>,
        cancel_token: CancellationToken,
        settings: ControllerSettings,
        metrics: Arc<ActorMetrics>,
    ) -> Self {
        let mailbox = MailboxMonitor::new(ActorType::Controller, &rc_id);

        Self {
            rc_id,
            receiver,
            cancel_token,
            coordinator: Coordinator::new(RoomRegistry::new()),
            fanout: Fanout::new(),
            settings,
            accepting_new: true,
            metrics,
            mailbox,
        }
    }

    #[instrument(skip_all, name = "rc.actor.controller", fields(rc_id = %self.rc_id))]
    async fn run(mut self) {
        info!(
            target: "rc.actor.controller",
            rc_id = %self.rc_id,
            idle_room_ttl_secs = self.settings.idle_room_ttl.map(|t| t.as_secs()),
            "RoomControllerActor started"
        );

        let idle_room_ttl = self.settings.idle_room_ttl;
        let mut eviction = idle_room_ttl.map(eviction_interval);

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    info!(
                        target: "rc.actor.controller",
                        rc_id = %self.rc_id,
                        "RoomControllerActor received cancellation signal"
                    );
                    self.graceful_shutdown();
                    break;
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(message) => {
                            self.mailbox.record_enqueue();
                            self.handle_message(message);
                            self.mailbox.record_dequeue();
                            self.metrics.record_message_processed();
                            observability::set_actor_mailbox_depth(
                                ActorType::Controller.as_str(),
                                self.receiver.len(),
                            );
                        }
                        None => {
                            info!(
                                target: "rc.actor.controller",
                                rc_id = %self.rc_id,
                                "RoomControllerActor channel closed, exiting"
                            );
                            break;
                        }
                    }
                }

                () = next_tick(&mut eviction) => {
                    if let Some(ttl) = idle_room_ttl {
                        self.evict_idle_rooms(ttl);
                    }
                }
            }
        }

        info!(
            target: "rc.actor.controller",
            rc_id = %self.rc_id,
            rooms_remaining = self.coordinator.registry().len(),
            messages_processed = self.mailbox.messages_processed(),
            "RoomControllerActor stopped"
        );
    }

    fn handle_message(&mut self, message: ControllerMessage) {
        match message {
            ControllerMessage::Connect { handle, respond_to } => {
                let _ = respond_to.send(self.connect(handle));
            }

            ControllerMessage::Event {
                connection_id,
                event,
                received_at,
            } => self.handle_event(connection_id, event, received_at),

            ControllerMessage::Disconnect { connection_id } => {
                self.handle_disconnect(connection_id);
            }

            ControllerMessage::GetRoom {
                room_id,
                respond_to,
            } => {
                let result = self
                    .coordinator
                    .registry()
                    .get(&room_id)
                    .map(Room::snapshot)
                    .ok_or_else(|| RcError::RoomNotFound(room_id.to_string()));
                let _ = respond_to.send(result);
            }

            ControllerMessage::AllocateRoomCode { respond_to } => {
                let result = allocate_room_code(
                    &mut rand::thread_rng(),
                    self.coordinator.registry(),
                    self.settings.room_code_length,
                );
                if let Err(e) = &result {
                    warn!(target: "rc.actor.controller", error = %e, "Room code allocation failed");
                }
                let _ = respond_to.send(result);
            }

            ControllerMessage::GetStatus { respond_to } => {
                let _ = respond_to.send(self.get_status());
            }

            ControllerMessage::Shutdown { respond_to } => {
                let _ = respond_to.send(self.initiate_shutdown());
            }
        }
    }

    fn connect(&mut self, handle: ConnectionActorHandle) -> Result<(), RcError> {
        if !self.accepting_new {
            return Err(RcError::Draining);
        }

        let connection_id = handle.connection_id();
        self.fanout.register(handle);
        observability::set_connections_active(self.fanout.connection_count());

        debug!(
            target: "rc.actor.controller",
            rc_id = %self.rc_id,
            connection_id = %connection_id,
            total_connections = self.fanout.connection_count(),
            "Connection registered"
        );

        Ok(())
    }

    fn handle_event(&mut self, connection_id: ConnectionId, event: ClientEvent, received_at: Instant) {
        let event_type = event.event_type();

        if !self.accepting_new {
            observability::record_event_rejected("draining");
            return;
        }

        if !self.fanout.is_registered(connection_id) {
            warn!(
                target: "rc.actor.controller",
                connection_id = %connection_id,
                event_type,
                "Event from unregistered connection dropped"
            );
            observability::record_event_rejected("unknown_connection");
            return;
        }

        if let ClientEvent::JoinRoom { room_id, .. } = &event {
            self.fanout.subscribe(connection_id, room_id);
        }

        let outbound = self.coordinator.handle(connection_id, event);
        let report = self.fanout.deliver(outbound);
        self.record_dropped(report.dropped);

        observability::record_event(event_type);
        observability::record_event_latency(event_type, received_at.elapsed());
        observability::set_rooms_active(self.coordinator.registry().len());
    }

    fn handle_disconnect(&mut self, connection_id: ConnectionId) {
        if self.fanout.unregister(connection_id).is_none() {
            return;
        }

        let outbound = self.coordinator.leave(connection_id);
        let report = self.fanout.deliver(outbound);
        self.record_dropped(report.dropped);

        observability::set_connections_active(self.fanout.connection_count());

        debug!(
            target: "rc.actor.controller",
            rc_id = %self.rc_id,
            connection_id = %connection_id,
            total_connections = self.fanout.connection_count(),
            "Connection removed"
        );
    }

    fn evict_idle_rooms(&mut self, ttl: Duration) {
        let evicted = self.coordinator.evict_idle(ttl, Instant::now());
        if evicted.is_empty() {
            return;
        }

        for room_id in &evicted {
            self.fanout.remove_room(room_id);
        }

        observability::record_rooms_evicted(evicted.len());
        observability::set_rooms_active(self.coordinator.registry().len());

        info!(
            target: "rc.actor.controller",
            rc_id = %self.rc_id,
            evicted = evicted.len(),
            rooms_remaining = self.coordinator.registry().len(),
            "Idle rooms evicted"
        );
    }

    fn record_dropped(&self, dropped: usize) {
        if dropped > 0 {
            self.metrics.record_dropped(dropped);
            observability::record_messages_dropped(dropped);
        }
    }

    fn get_status(&self) -> ControllerStatus {
        ControllerStatus {
            room_count: self.coordinator.registry().len(),
            connection_count: self.fanout.connection_count(),
            participant_count: self.coordinator.registry().participant_count(),
            is_draining: !self.accepting_new,
            mailbox_depth: self.receiver.len(),
        }
    }

    fn initiate_shutdown(&mut self) -> Result<(), RcError> {
        info!(
            target: "rc.actor.controller",
            rc_id = %self.rc_id,
            connection_count = self.fanout.connection_count(),
            "Initiating graceful shutdown"
        );

        self.close_connections();

        // Cancel the root token (propagates to connection actors and servers)
        self.cancel_token.cancel();

        Ok(())
    }

    fn graceful_shutdown(&mut self) {
        self.close_connections();

        info!(
            target: "rc.actor.controller",
            rc_id = %self.rc_id,
            rooms = self.coordinator.registry().len(),
            "Graceful shutdown complete"
        );
    }

    fn close_connections(&mut self) {
        self.accepting_new = false;

        for handle in self.fanout.handles() {
            debug!(
                target: "rc.actor.controller",
                rc_id = %self.rc_id,
                connection_id = %handle.connection_id(),
                "Cancelling connection actor"
            );
            handle.cancel();
        }
    }
}

fn eviction_interval(ttl: Duration) -> Interval {
    let period = ttl.min(MAX_EVICTION_INTERVAL);
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval
}

/// Next eviction tick, or never when eviction is disabled.
async fn next_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::actors::ConnectionMessage;
    use crate::protocol::ServerEvent;

    fn controller(settings: ControllerSettings) -> RoomControllerActorHandle {
        RoomControllerActorHandle::new("rc-test".to_string(), settings, ActorMetrics::new())
    }

    async fn connect(
        handle: &RoomControllerActorHandle,
    ) -> (ConnectionId, mpsc::Receiver<ConnectionMessage>) {
        let id = ConnectionId::new();
        let (conn, rx) = ConnectionActorHandle::detached(id, 64);
        handle.connect(conn).await.unwrap();
        (id, rx)
    }

    /// Wait until every queued message has been handled.
    async fn settle(handle: &RoomControllerActorHandle) {
        handle.get_status().await.unwrap();
    }

    fn events(rx: &mut mpsc::Receiver<ConnectionMessage>) -> Vec<ServerEvent> {
        let mut out = Vec::new();
        while let Ok(ConnectionMessage::Send { event }) = rx.try_recv() {
            out.push(event);
        }
        out
    }

    fn last_state(events: &[ServerEvent]) -> RoomSnapshot {
        events
            .iter()
            .rev()
            .find_map(|e| match e {
                ServerEvent::RoomState(s) => Some(s.clone()),
                _ => None,
            })
            .expect("a room-state event")
    }

    fn join(room: &str, name: &str) -> ClientEvent {
        ClientEvent::JoinRoom {
            room_id: RoomId::new(room),
            username: name.to_string(),
        }
    }

    #[tokio::test]
    async fn test_join_and_vote_are_redacted_per_connection() {
        let handle = controller(ControllerSettings::default());
        let (a, mut a_rx) = connect(&handle).await;
        let (b, mut b_rx) = connect(&handle).await;

        handle.dispatch(a, join("x1y2z", "A")).await.unwrap();
        handle.dispatch(b, join("X1Y2Z", "B")).await.unwrap();
        handle
            .dispatch(
                a,
                ClientEvent::Vote {
                    room_id: RoomId::new("x1y2z"),
                    value: 5,
                },
            )
            .await
            .unwrap();
        settle(&handle).await;

        let a_events = events(&mut a_rx);
        let b_events = events(&mut b_rx);

        assert!(a_events
            .iter()
            .any(|e| matches!(e, ServerEvent::UserJoined(p) if p.id == b)));
        assert!(b_events
            .iter()
            .any(|e| matches!(e, ServerEvent::VoteReceived(n) if n.user_id == a && n.vote.is_none())));
        assert_eq!(last_state(&a_events).users[0].vote, Some(5));
        assert_eq!(last_state(&b_events).users[0].vote, None);
        assert!(last_state(&b_events).users[0].has_voted);

        handle.cancel();
    }

    #[tokio::test]
    async fn test_get_room_is_unredacted() {
        let handle = controller(ControllerSettings::default());
        let (a, _a_rx) = connect(&handle).await;

        handle.dispatch(a, join("room", "A")).await.unwrap();
        handle
            .dispatch(
                a,
                ClientEvent::Vote {
                    room_id: RoomId::new("room"),
                    value: 3,
                },
            )
            .await
            .unwrap();

        let snapshot = handle.get_room(RoomId::new("ROOM")).await.unwrap();
        assert_eq!(snapshot.users[0].vote, Some(3));
        assert!(!snapshot.is_revealed);

        let missing = handle.get_room(RoomId::new("nope")).await;
        assert!(matches!(missing, Err(RcError::RoomNotFound(_))));

        handle.cancel();
    }

    #[tokio::test]
    async fn test_disconnect_notifies_remaining_members() {
        let handle = controller(ControllerSettings::default());
        let (a, _a_rx) = connect(&handle).await;
        let (b, mut b_rx) = connect(&handle).await;
        handle.dispatch(a, join("r", "A")).await.unwrap();
        handle.dispatch(b, join("r", "B")).await.unwrap();
        settle(&handle).await;
        events(&mut b_rx);

        handle.disconnect(a).await.unwrap();
        settle(&handle).await;

        let b_events = events(&mut b_rx);
        assert_eq!(b_events[0], ServerEvent::UserLeft(a.to_string()));
        assert_eq!(last_state(&b_events).users.len(), 1);

        let status = handle.get_status().await.unwrap();
        assert_eq!(status.connection_count, 1);
        assert_eq!(status.participant_count, 1);
        assert_eq!(status.room_count, 1);

        handle.cancel();
    }

    #[tokio::test]
    async fn test_events_from_unregistered_connection_are_dropped() {
        let handle = controller(ControllerSettings::default());

        handle
            .dispatch(ConnectionId::new(), join("ghost", "G"))
            .await
            .unwrap();

        let status = handle.get_status().await.unwrap();
        assert_eq!(status.room_count, 0);

        handle.cancel();
    }

    #[tokio::test]
    async fn test_allocate_room_code_uses_configured_length() {
        let handle = controller(ControllerSettings {
            idle_room_ttl: None,
            room_code_length: 10,
        });

        let code = handle.allocate_room_code().await.unwrap();

        assert_eq!(code.as_str().len(), 10);
        assert_eq!(code.as_str(), code.as_str().to_uppercase());
        assert_eq!(handle.get_status().await.unwrap().room_count, 0);

        handle.cancel();
    }

    #[tokio::test]
    async fn test_full_connection_mailbox_counts_drops() {
        let metrics = ActorMetrics::new();
        let handle = RoomControllerActorHandle::new(
            "rc-test".to_string(),
            ControllerSettings::default(),
            Arc::clone(&metrics),
        );
        let id = ConnectionId::new();
        let (conn, mut rx) = ConnectionActorHandle::detached(id, 1);
        handle.connect(conn).await.unwrap();

        // Join produces a private snapshot and a member snapshot.
        handle.dispatch(id, join("slow", "S")).await.unwrap();
        settle(&handle).await;

        assert_eq!(events(&mut rx).len(), 1);
        assert_eq!(metrics.dropped_count(), 1);
        handle.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_rooms_are_evicted_after_ttl() {
        let handle = controller(ControllerSettings {
            idle_room_ttl: Some(Duration::from_secs(60)),
            room_code_length: 7,
        });
        let (a, _a_rx) = connect(&handle).await;
        handle.dispatch(a, join("idle", "A")).await.unwrap();
        handle
            .dispatch(
                a,
                ClientEvent::UpdateStory {
                    room_id: RoomId::new("idle"),
                    story: "Old story".to_string(),
                },
            )
            .await
            .unwrap();
        handle
            .dispatch(
                a,
                ClientEvent::RevealVotes {
                    room_id: RoomId::new("idle"),
                },
            )
            .await
            .unwrap();
        handle.disconnect(a).await.unwrap();
        assert!(handle.get_room(RoomId::new("idle")).await.is_ok());

        tokio::time::sleep(Duration::from_secs(45)).await;
        assert!(handle.get_room(RoomId::new("idle")).await.is_ok());

        tokio::time::sleep(Duration::from_secs(46)).await;
        assert!(matches!(
            handle.get_room(RoomId::new("idle")).await,
            Err(RcError::RoomNotFound(_))
        ));

        // Rejoining the same code starts from a blank room.
        let (b, mut b_rx) = connect(&handle).await;
        handle.dispatch(b, join("idle", "B")).await.unwrap();
        settle(&handle).await;

        let state = last_state(&events(&mut b_rx));
        assert_eq!(state.current_story, "");
        assert!(!state.is_revealed);
        assert_eq!(state.users.len(), 1);
        assert_eq!(state.users[0].name, "B");
        assert!(state.summary.is_none());

        handle.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_rooms_are_kept_without_ttl() {
        let handle = controller(ControllerSettings::default());
        let (a, _a_rx) = connect(&handle).await;
        handle.dispatch(a, join("keep", "A")).await.unwrap();
        handle.disconnect(a).await.unwrap();

        tokio::time::sleep(Duration::from_secs(3600)).await;

        assert!(handle.get_room(RoomId::new("keep")).await.is_ok());
        handle.cancel();
    }

    #[tokio::test]
    async fn test_shutdown_cancels_connections_and_rejects_events() {
        let handle = controller(ControllerSettings::default());
        let id = ConnectionId::new();
        let (conn, _rx) = ConnectionActorHandle::detached(id, 8);
        handle.connect(conn.clone()).await.unwrap();

        handle.shutdown().await.unwrap();

        assert!(conn.is_cancelled());
        assert!(handle.is_cancelled());
        assert!(matches!(
            handle.dispatch(id, join("late", "L")).await,
            Err(RcError::Draining)
        ));
    }

    #[tokio::test]
    async fn test_cancellation_token_propagates_to_children() {
        let handle = controller(ControllerSettings::default());
        let child = handle.child_token();
        assert!(!child.is_cancelled());

        handle.cancel();

        assert!(handle.is_cancelled());
        assert!(child.is_cancelled());
    }
}
