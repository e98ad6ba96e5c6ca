//! Room Controller
//!
//! In-memory planning-poker room server speaking JSON events over WebSocket.
//!
//! # Servers
//!
//! The Room Controller runs two servers:
//! - HTTP server for `/ws` and `POST /v1/rooms` (default: 0.0.0.0:3000)
//! - HTTP server for health endpoints and `/metrics` (default: 0.0.0.0:8081)
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment
//! 2. Initialize Prometheus metrics recorder
//! 3. Initialize actor system (`RoomControllerActorHandle`)
//! 4. Start health HTTP server (liveness, readiness, metrics)
//! 5. Start public HTTP server and mark ready
//! 6. Wait for shutdown signal

#![warn(clippy::pedantic)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use room_controller::actors::{ActorMetrics, ControllerSettings, RoomControllerActorHandle};
use room_controller::config::Config;
use room_controller::observability::{init_metrics_recorder, HealthState};
use room_controller::routes::{build_health_routes, build_routes, AppState};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Time given to connection actors to flush close frames.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "room_controller=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Room Controller");

    // Load configuration
    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        rc_id = %config.rc_id,
        bind_address = %config.bind_address,
        health_bind_address = %config.health_bind_address,
        connection_buffer = config.connection_buffer,
        idle_room_ttl_seconds = config.idle_room_ttl_seconds,
        room_code_length = config.room_code_length,
        "Configuration loaded successfully"
    );

    // This must happen before any metrics are recorded
    info!("Initializing Prometheus metrics recorder...");
    let prometheus_handle = init_metrics_recorder().map_err(|e| {
        error!(error = %e, "Failed to install Prometheus metrics recorder");
        e
    })?;
    info!("Prometheus metrics recorder initialized");

    let health_state = Arc::new(HealthState::new());

    // Initialize actor system
    info!("Initializing actor system...");
    let actor_metrics = ActorMetrics::new();
    let controller_handle = Arc::new(RoomControllerActorHandle::new(
        config.rc_id.clone(),
        ControllerSettings::from(&config),
        Arc::clone(&actor_metrics),
    ));
    info!("Actor system initialized");

    // Child of the controller's token: servers stop when the controller does
    let shutdown_token = controller_handle.child_token();

    // Start health HTTP server (MUST succeed - fail startup if it doesn't)
    let health_addr: SocketAddr = config.health_bind_address.parse().map_err(|e| {
        error!(error = %e, addr = %config.health_bind_address, "Invalid health bind address");
        format!("Invalid health bind address: {e}")
    })?;

    let health_app = build_health_routes(Arc::clone(&health_state), Some(prometheus_handle));

    // Bind listener BEFORE spawning to fail fast on bind errors
    let health_listener = tokio::net::TcpListener::bind(health_addr)
        .await
        .map_err(|e| {
            error!(error = %e, addr = %health_addr, "Failed to bind health server");
            format!("Failed to bind health server to {health_addr}: {e}")
        })?;
    info!(addr = %health_addr, "Health server bound successfully");

    let health_shutdown_token = shutdown_token.child_token();
    tokio::spawn(async move {
        info!(addr = %health_addr, "Health server starting");
        let server = axum::serve(health_listener, health_app).with_graceful_shutdown(async move {
            health_shutdown_token.cancelled().await;
            info!("Health server shutting down");
        });
        if let Err(e) = server.await {
            error!(error = %e, "Health server failed");
        }
    });

    // Start public HTTP + WebSocket server
    let bind_addr: SocketAddr = config.bind_address.parse().map_err(|e| {
        error!(error = %e, addr = %config.bind_address, "Invalid bind address");
        format!("Invalid bind address: {e}")
    })?;

    let app = build_routes(AppState {
        controller: Arc::clone(&controller_handle),
        metrics: Arc::clone(&actor_metrics),
        connection_buffer: config.connection_buffer,
    });

    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .map_err(|e| {
            error!(error = %e, addr = %bind_addr, "Failed to bind server");
            format!("Failed to bind server to {bind_addr}: {e}")
        })?;
    info!(addr = %bind_addr, "Server bound successfully");

    let server_shutdown_token = shutdown_token.child_token();
    let server_task = tokio::spawn(async move {
        info!(addr = %bind_addr, "Server starting");
        let server = axum::serve(listener, app).with_graceful_shutdown(async move {
            server_shutdown_token.cancelled().await;
            info!("Server shutting down");
        });
        if let Err(e) = server.await {
            error!(error = %e, "Server failed");
        }
    });

    health_state.mark_listening();

    info!("Room Controller running - press Ctrl+C to shutdown");
    shutdown_signal().await;

    info!("Shutdown signal received, initiating graceful shutdown...");

    // Fail readiness first so the load balancer stops routing new clients
    health_state.begin_drain();

    // Closes every connection and cancels the root token, which stops both servers
    if let Err(e) = controller_handle.shutdown().await {
        warn!(error = %e, "Actor system shutdown error");
        shutdown_token.cancel();
    }

    if tokio::time::timeout(SHUTDOWN_GRACE, server_task).await.is_err() {
        warn!(
            grace_secs = SHUTDOWN_GRACE.as_secs(),
            "Server did not stop within grace period"
        );
    }

    info!("Room Controller shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
///
/// # Panics
///
/// Panics if signal handlers cannot be installed. This is acceptable because
/// without signal handlers, we cannot gracefully shut down the service.
async fn shutdown_signal() {
    let ctrl_c = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation is critical - panic is appropriate if it fails"
        )]
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation is critical - panic is appropriate if it fails"
        )]
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
