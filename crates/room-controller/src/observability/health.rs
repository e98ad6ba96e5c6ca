//! `/health` and `/ready` for the Room Controller.
//!
//! Liveness is unconditional once the process serves HTTP. Readiness needs
//! the WebSocket listener bound and no drain in progress; a 503 from `/ready`
//! carries the reason as plain text so operators can tell the two apart.

use axum::{extract::State, http::StatusCode, routing::get, Router};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Listener and drain flags shared between `main` and the handlers.
#[derive(Debug, Default)]
pub struct HealthState {
    listening: AtomicBool,
    draining: AtomicBool,
}

impl HealthState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The WebSocket listener is bound and accepting upgrades.
    pub fn mark_listening(&self) {
        self.listening.store(true, Ordering::SeqCst);
    }

    /// Shutdown has started. Readiness never comes back after this.
    pub fn begin_drain(&self) {
        self.draining.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::SeqCst)
    }

    /// Why new clients should not be routed here, if anything.
    #[must_use]
    pub fn not_ready_reason(&self) -> Option<&'static str> {
        if self.is_draining() {
            Some("draining")
        } else if !self.listening.load(Ordering::SeqCst) {
            Some("listener not bound")
        } else {
            None
        }
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.not_ready_reason().is_none()
    }
}

pub fn health_router(health_state: Arc<HealthState>) -> Router {
    Router::new()
        .route("/health", get(|| async { StatusCode::OK }))
        .route("/ready", get(readiness_handler))
        .with_state(health_state)
}

async fn readiness_handler(State(state): State<Arc<HealthState>>) -> (StatusCode, &'static str) {
    match state.not_ready_reason() {
        None => (StatusCode::OK, "ready"),
        Some(reason) => (StatusCode::SERVICE_UNAVAILABLE, reason),
    }
}
