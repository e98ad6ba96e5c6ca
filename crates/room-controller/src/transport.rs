//! WebSocket transport.
//!
//! Each upgraded socket is split in two:
//!
//! - the write half goes to a [`ConnectionActor`], which the controller
//!   reaches through fan-out
//! - the read half stays in this task, which decodes frames and forwards
//!   them to the controller
//!
//! A frame that fails to decode is logged and skipped. The connection stays
//! open.

use crate::actors::{ActorType, ConnectionActor};
use crate::observability;
use crate::protocol::ClientEvent;
use crate::room::ConnectionId;
use crate::routes::AppState;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// How long to wait for the connection actor to flush its close frame.
const CONNECTION_STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// `GET /ws`
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

#[instrument(skip_all, name = "rc.transport.socket", fields(connection_id))]
async fn handle_socket(socket: WebSocket, state: AppState) {
    let connection_id = ConnectionId::new();
    tracing::Span::current().record("connection_id", tracing::field::display(connection_id));

    let (sink, mut stream) = socket.split();

    let (handle, task) = ConnectionActor::spawn(
        connection_id,
        sink,
        state.controller.child_token(),
        state.connection_buffer,
        Arc::clone(&state.metrics),
    );

    if let Err(e) = state.controller.connect(handle.clone()).await {
        warn!(
            target: "rc.transport",
            connection_id = %connection_id,
            error = %e,
            "Connection refused"
        );
        let _ = handle.close(e.client_message()).await;
        let _ = tokio::time::timeout(CONNECTION_STOP_TIMEOUT, task).await;
        return;
    }

    info!(target: "rc.transport", connection_id = %connection_id, "Connection opened");

    loop {
        tokio::select! {
            () = handle.cancelled() => break,

            frame = stream.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        let event = match ClientEvent::from_frame(&text) {
                            Ok(event) => event,
                            Err(e) => {
                                warn!(
                                    target: "rc.transport",
                                    connection_id = %connection_id,
                                    error = %e,
                                    frame_len = text.len(),
                                    "Malformed frame ignored"
                                );
                                observability::record_event_rejected("malformed");
                                continue;
                            }
                        };

                        if let Err(e) = state.controller.dispatch(connection_id, event).await {
                            debug!(
                                target: "rc.transport",
                                connection_id = %connection_id,
                                error = %e,
                                "Controller no longer accepting events"
                            );
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    // Binary frames carry nothing; ping/pong is answered by the socket.
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(
                            target: "rc.transport",
                            connection_id = %connection_id,
                            error = %e,
                            "Socket read failed"
                        );
                        break;
                    }
                }
            }
        }
    }

    if let Err(e) = state.controller.disconnect(connection_id).await {
        debug!(
            target: "rc.transport",
            connection_id = %connection_id,
            error = %e,
            "Disconnect not delivered"
        );
    }
    handle.cancel();

    match tokio::time::timeout(CONNECTION_STOP_TIMEOUT, task).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) if e.is_panic() => {
            warn!(
                target: "rc.transport",
                connection_id = %connection_id,
                "ConnectionActor panicked"
            );
            state.metrics.record_panic(ActorType::Connection);
        }
        Ok(Err(_)) => {}
        Err(_) => {
            warn!(
                target: "rc.transport",
                connection_id = %connection_id,
                "ConnectionActor did not stop in time"
            );
        }
    }

    info!(target: "rc.transport", connection_id = %connection_id, "Connection closed");
}
