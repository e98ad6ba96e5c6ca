//! Test server harness for E2E testing
//!
//! Provides `TestRcServer` for spawning real RC server instances in tests.

use room_controller::actors::{ActorMetrics, ControllerSettings, RoomControllerActorHandle};
use room_controller::config::Config;
use room_controller::routes::{self, AppState};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Test harness for spawning the Room Controller server in E2E tests.
///
/// # Example
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_create_room_e2e() -> Result<(), anyhow::Error> {
///     let server = TestRcServer::spawn().await?;
///
///     let response = reqwest::Client::new()
///         .post(format!("{}/v1/rooms", server.url()))
///         .send()
///         .await?;
///
///     assert_eq!(response.status(), 201);
///     Ok(())
/// }
/// ```
pub struct TestRcServer {
    addr: SocketAddr,
    config: Config,
    controller: Arc<RoomControllerActorHandle>,
    metrics: Arc<ActorMetrics>,
    _handle: JoinHandle<()>,
}

impl TestRcServer {
    /// Spawn a server with default settings.
    pub async fn spawn() -> Result<Self, anyhow::Error> {
        Self::spawn_with_vars(HashMap::new()).await
    }

    /// Spawn a server with extra `RC_*` variables.
    ///
    /// The server will:
    /// - Bind to a random available port (127.0.0.1:0)
    /// - Start its own controller actor
    /// - Serve the real RC routes in the background
    pub async fn spawn_with_vars(mut vars: HashMap<String, String>) -> Result<Self, anyhow::Error> {
        vars.entry("RC_BIND_ADDRESS".to_string())
            .or_insert_with(|| "127.0.0.1:0".to_string());
        vars.entry("RC_ID".to_string())
            .or_insert_with(|| "rc-test".to_string());

        let config = Config::from_vars(&vars)
            .map_err(|e| anyhow::anyhow!("Failed to create config: {}", e))?;

        let metrics = ActorMetrics::new();
        let controller = Arc::new(RoomControllerActorHandle::new(
            config.rc_id.clone(),
            ControllerSettings::from(&config),
            Arc::clone(&metrics),
        ));

        let app = routes::build_routes(AppState {
            controller: Arc::clone(&controller),
            metrics: Arc::clone(&metrics),
            connection_buffer: config.connection_buffer,
        });

        let listener = tokio::net::TcpListener::bind(&config.bind_address)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;

        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                eprintln!("Test server error: {}", e);
            }
        });

        Ok(Self {
            addr,
            config,
            controller,
            metrics,
            _handle: handle,
        })
    }

    /// Base HTTP URL of the test server.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// WebSocket endpoint URL.
    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Controller handle, for inspecting rooms directly.
    pub fn controller(&self) -> &RoomControllerActorHandle {
        &self.controller
    }

    pub fn metrics(&self) -> &ActorMetrics {
        &self.metrics
    }
}

impl Drop for TestRcServer {
    fn drop(&mut self) {
        self.controller.cancel();
        self._handle.abort();
    }
}
