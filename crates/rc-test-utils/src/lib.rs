//! # RC Test Utilities
//!
//! Shared test utilities for the Room Controller (RC) service.
//!
//! ## Modules
//!
//! - `server_harness` - Spawns a real RC server on an ephemeral port
//! - `ws_client` - WebSocket client speaking the room event protocol
//!
//! ## Usage
//!
//! ```rust,ignore
//! use rc_test_utils::{TestClient, TestRcServer};
//!
//! #[tokio::test]
//! async fn test_example() -> Result<(), anyhow::Error> {
//!     let server = TestRcServer::spawn().await?;
//!     let mut alice = TestClient::connect(&server.ws_url()).await?;
//!
//!     alice.join("X1Y2Z", "Alice").await?;
//!     let state = alice.recv_room_state().await?;
//!     assert_eq!(state.users.len(), 1);
//!     Ok(())
//! }
//! ```

pub mod server_harness;
pub mod ws_client;

pub use server_harness::TestRcServer;
pub use ws_client::{TestClient, RECV_TIMEOUT};
