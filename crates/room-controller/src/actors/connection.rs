//! `ConnectionActor` - owns the write half of one WebSocket.
//!
//! Each `ConnectionActor`:
//! - Serializes outbound [`ServerEvent`]s into JSON text frames
//! - Writes them in mailbox order, so per-connection ordering follows the
//!   order the controller queued them
//! - Sends a close frame on `Close` or when its token is cancelled
//!
//! The read half stays with the transport task, which forwards decoded
//! events to the controller.
//!
//! # Lifecycle
//!
//! 1. Spawned by the WebSocket upgrade handler
//! 2. Registered with the controller for fan-out
//! 3. Runs until closed, cancelled, the socket write fails, or every handle
//!    is dropped

use super::messages::ConnectionMessage;
use super::metrics::{ActorMetrics, ActorType, MailboxMonitor};
use crate::errors::RcError;
use crate::protocol::ServerEvent;
use crate::room::ConnectionId;

use axum::extract::ws::{close_code, CloseFrame, Message};
use futures_util::{Sink, SinkExt};
use std::fmt::Display;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use tracing::{debug, info, instrument, warn};

/// Handle to a `ConnectionActor`.
#[derive(Clone, Debug)]
pub struct ConnectionActorHandle {
    sender: mpsc::Sender<ConnectionMessage>,
    cancel_token: CancellationToken,
    connection_id: ConnectionId,
}

impl ConnectionActorHandle {
    #[must_use]
    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    /// Queue an event without waiting.
    ///
    /// Fan-out is best-effort: a full or closed mailbox is reported and the
    /// caller moves on.
    pub fn try_send(&self, event: ServerEvent) -> Result<(), RcError> {
        self.sender
            .try_send(ConnectionMessage::Send { event })
            .map_err(|e| match e {
                TrySendError::Full(_) => {
                    RcError::Transport("connection mailbox full".to_string())
                }
                TrySendError::Closed(_) => RcError::Transport("connection closed".to_string()),
            })
    }

    /// Ask the actor to send a close frame and stop.
    pub async fn close(&self, reason: String) -> Result<(), RcError> {
        self.sender
            .send(ConnectionMessage::Close { reason })
            .await
            .map_err(|e| RcError::Internal(format!("channel send failed: {e}")))
    }

    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Resolves when the actor is cancelled.
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.cancel_token.cancelled()
    }

    /// A handle with no actor behind it, for exercising fan-out directly.
    #[cfg(test)]
    pub(crate) fn detached(
        connection_id: ConnectionId,
        buffer: usize,
    ) -> (Self, mpsc::Receiver<ConnectionMessage>) {
        let (sender, receiver) = mpsc::channel(buffer);
        let handle = Self {
            sender,
            cancel_token: CancellationToken::new(),
            connection_id,
        };
        (handle, receiver)
    }
}

/// The `ConnectionActor` implementation, generic over the socket's write half.
pub struct ConnectionActor<S> {
    connection_id: ConnectionId,
    sink: S,
    receiver: mpsc::Receiver<ConnectionMessage>,
    /// Child of the controller's token.
    cancel_token: CancellationToken,
    metrics: Arc<ActorMetrics>,
    mailbox: MailboxMonitor,
    is_closing: bool,
}

impl<S> ConnectionActor<S>
where
    S: Sink<Message> + Unpin + Send + 'static,
    S::Error: Display,
{
    /// Spawn a new connection actor writing to `sink`.
    ///
    /// Returns a handle and the task join handle.
    pub fn spawn(
        connection_id: ConnectionId,
        sink: S,
        cancel_token: CancellationToken,
        buffer: usize,
        metrics: Arc<ActorMetrics>,
    ) -> (ConnectionActorHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(buffer);

        metrics.connection_created();

        let actor = Self {
            connection_id,
            sink,
            receiver,
            cancel_token: cancel_token.clone(),
            metrics,
            mailbox: MailboxMonitor::new(ActorType::Connection, connection_id.to_string()),
            is_closing: false,
        };

        let task_handle = tokio::spawn(actor.run());

        let handle = ConnectionActorHandle {
            sender,
            cancel_token,
            connection_id,
        };

        (handle, task_handle)
    }

    #[instrument(
        skip_all,
        name = "rc.actor.connection",
        fields(connection_id = %self.connection_id)
    )]
    async fn run(mut self) {
        debug!(
            target: "rc.actor.connection",
            connection_id = %self.connection_id,
            "ConnectionActor started"
        );

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    debug!(
                        target: "rc.actor.connection",
                        connection_id = %self.connection_id,
                        "ConnectionActor received cancellation signal"
                    );
                    self.graceful_close("server shutting down").await;
                    break;
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(message) => {
                            self.mailbox.record_enqueue();
                            let should_exit = self.handle_message(message).await;
                            self.mailbox.record_dequeue();
                            self.metrics.record_message_processed();

                            if should_exit {
                                break;
                            }
                        }
                        None => {
                            debug!(
                                target: "rc.actor.connection",
                                connection_id = %self.connection_id,
                                "ConnectionActor channel closed, exiting"
                            );
                            break;
                        }
                    }
                }
            }
        }

        self.metrics.connection_closed();

        info!(
            target: "rc.actor.connection",
            connection_id = %self.connection_id,
            messages_processed = self.mailbox.messages_processed(),
            "ConnectionActor stopped"
        );
    }

    /// Handle a single message. Returns true if the actor should exit.
    async fn handle_message(&mut self, message: ConnectionMessage) -> bool {
        match message {
            ConnectionMessage::Send { event } => self.handle_send(&event).await.is_err(),

            ConnectionMessage::Close { reason } => {
                self.graceful_close(&reason).await;
                true
            }
        }
    }

    async fn handle_send(&mut self, event: &ServerEvent) -> Result<(), RcError> {
        if self.is_closing {
            warn!(
                target: "rc.actor.connection",
                connection_id = %self.connection_id,
                "Attempted to send message while closing"
            );
            return Ok(());
        }

        let frame = event.to_frame().map_err(|e| {
            warn!(
                target: "rc.actor.connection",
                connection_id = %self.connection_id,
                event_type = event.event_type(),
                error = %e,
                "Failed to encode event"
            );
            RcError::Internal(format!("encode failed: {e}"))
        })?;

        self.sink.send(Message::Text(frame)).await.map_err(|e| {
            debug!(
                target: "rc.actor.connection",
                connection_id = %self.connection_id,
                event_type = event.event_type(),
                error = %e,
                "Socket write failed"
            );
            RcError::Transport(e.to_string())
        })
    }

    async fn graceful_close(&mut self, reason: &str) {
        if self.is_closing {
            return;
        }
        self.is_closing = true;

        debug!(
            target: "rc.actor.connection",
            connection_id = %self.connection_id,
            reason = %reason,
            "Closing connection"
        );

        let frame = CloseFrame {
            code: close_code::AWAY,
            reason: reason.to_string().into(),
        };
        if let Err(e) = self.sink.send(Message::Close(Some(frame))).await {
            debug!(
                target: "rc.actor.connection",
                connection_id = %self.connection_id,
                error = %e,
                "Close frame not sent, socket already gone"
            );
        }
        let _ = self.sink.close().await;
    }
}
