//! WebSocket test client speaking the room event protocol.

use futures_util::{SinkExt, StreamExt};
use room_controller::protocol::{ClientEvent, RoomSnapshot, ServerEvent};
use room_controller::room::RoomId;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

/// How long `recv_*` waits for the next frame before failing the test.
pub const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// One client connection.
///
/// Receive helpers skip ping/pong and fail on close or timeout, so tests can
/// assert on the event sequence directly.
pub struct TestClient {
    socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl TestClient {
    pub async fn connect(url: &str) -> Result<Self, anyhow::Error> {
        let (socket, _response) = connect_async(url)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to connect to {}: {}", url, e))?;
        Ok(Self { socket })
    }

    pub async fn send_event(&mut self, event: &ClientEvent) -> Result<(), anyhow::Error> {
        let frame = serde_json::to_string(event)?;
        self.send_raw(&frame).await
    }

    /// Send an arbitrary text frame (for malformed-input tests).
    pub async fn send_raw(&mut self, text: &str) -> Result<(), anyhow::Error> {
        self.socket
            .send(Message::text(text.to_string()))
            .await
            .map_err(|e| anyhow::anyhow!("Failed to send frame: {}", e))
    }

    pub async fn join(&mut self, room: &str, username: &str) -> Result<(), anyhow::Error> {
        self.send_event(&ClientEvent::JoinRoom {
            room_id: RoomId::new(room),
            username: username.to_string(),
        })
        .await
    }

    pub async fn vote(&mut self, room: &str, value: i64) -> Result<(), anyhow::Error> {
        self.send_event(&ClientEvent::Vote {
            room_id: RoomId::new(room),
            value,
        })
        .await
    }

    pub async fn reveal(&mut self, room: &str) -> Result<(), anyhow::Error> {
        self.send_event(&ClientEvent::RevealVotes {
            room_id: RoomId::new(room),
        })
        .await
    }

    pub async fn reset(&mut self, room: &str) -> Result<(), anyhow::Error> {
        self.send_event(&ClientEvent::ResetVotes {
            room_id: RoomId::new(room),
        })
        .await
    }

    pub async fn update_story(&mut self, room: &str, story: &str) -> Result<(), anyhow::Error> {
        self.send_event(&ClientEvent::UpdateStory {
            room_id: RoomId::new(room),
            story: story.to_string(),
        })
        .await
    }

    /// Next server event.
    pub async fn recv_event(&mut self) -> Result<ServerEvent, anyhow::Error> {
        loop {
            let frame = tokio::time::timeout(RECV_TIMEOUT, self.socket.next())
                .await
                .map_err(|_| anyhow::anyhow!("Timed out waiting for server event"))?;

            match frame {
                Some(Ok(Message::Text(text))) => {
                    return serde_json::from_str(text.as_str()).map_err(|e| {
                        anyhow::anyhow!("Undecodable server frame {}: {}", text.as_str(), e)
                    });
                }
                Some(Ok(Message::Close(frame))) => {
                    anyhow::bail!("Connection closed by server: {:?}", frame);
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => anyhow::bail!("Socket error: {}", e),
                None => anyhow::bail!("Socket ended"),
            }
        }
    }

    /// Skip events until one named `event_type` arrives.
    pub async fn recv_until(&mut self, event_type: &str) -> Result<ServerEvent, anyhow::Error> {
        loop {
            let event = self.recv_event().await?;
            if event.event_type() == event_type {
                return Ok(event);
            }
        }
    }

    /// Skip events until the next `room-state`.
    pub async fn recv_room_state(&mut self) -> Result<RoomSnapshot, anyhow::Error> {
        match self.recv_until("room-state").await? {
            ServerEvent::RoomState(snapshot) => Ok(snapshot),
            other => anyhow::bail!("Expected room-state, got {:?}", other),
        }
    }

    /// Fail if any event arrives within `window`.
    pub async fn expect_silence(&mut self, window: Duration) -> Result<(), anyhow::Error> {
        match tokio::time::timeout(window, self.socket.next()).await {
            Err(_) => Ok(()),
            Ok(Some(Ok(Message::Text(text)))) => {
                anyhow::bail!("Expected no events, got {}", text.as_str())
            }
            Ok(other) => anyhow::bail!("Expected no events, got {:?}", other),
        }
    }

    /// Wait for the server's close frame.
    pub async fn recv_close(&mut self) -> Result<(), anyhow::Error> {
        loop {
            let frame = tokio::time::timeout(RECV_TIMEOUT, self.socket.next())
                .await
                .map_err(|_| anyhow::anyhow!("Timed out waiting for close"))?;

            match frame {
                Some(Ok(Message::Close(_))) | None => return Ok(()),
                Some(Ok(_)) => {}
                Some(Err(e)) => anyhow::bail!("Socket error: {}", e),
            }
        }
    }

    pub async fn close(mut self) -> Result<(), anyhow::Error> {
        self.socket
            .close(None)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to close socket: {}", e))
    }
}
