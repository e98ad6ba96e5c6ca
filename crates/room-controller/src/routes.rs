//! HTTP routes for the Room Controller.
//!
//! Defines the Axum routers and application state.

use crate::actors::{ActorMetrics, RoomControllerActorHandle};
use crate::errors::RcError;
use crate::observability::{health_router, HealthState};
use crate::transport;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<RoomControllerActorHandle>,
    pub metrics: Arc<ActorMetrics>,
    /// Outbound mailbox size for each connection actor.
    pub connection_buffer: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateRoomResponse {
    room_id: String,
}

/// Build the public routes.
///
/// - `GET /ws` - WebSocket upgrade for the room event protocol
/// - `POST /v1/rooms` - allocate an unused room code
///
/// Only the REST routes get the 30 second timeout; sockets are long-lived.
pub fn build_routes(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/v1/rooms", post(create_room))
        .layer(TimeoutLayer::new(Duration::from_secs(30)));

    Router::new()
        .route("/ws", get(transport::ws_handler))
        .merge(api_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Build the health listener's routes: `/health`, `/ready` and, when a
/// recorder is installed, `/metrics`.
pub fn build_health_routes(
    health_state: Arc<HealthState>,
    prometheus_handle: Option<PrometheusHandle>,
) -> Router {
    let router = health_router(health_state);

    match prometheus_handle {
        Some(handle) => router.route(
            "/metrics",
            get(move || {
                let handle = handle.clone();
                async move { handle.render() }
            }),
        ),
        None => router,
    }
}

async fn create_room(State(state): State<AppState>) -> Result<Response, RcError> {
    let room_id = state.controller.allocate_room_code().await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateRoomResponse {
            room_id: room_id.to_string(),
        }),
    )
        .into_response())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::actors::ControllerSettings;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::util::ServiceExt;

    fn test_state() -> AppState {
        let metrics = ActorMetrics::new();
        let controller = RoomControllerActorHandle::new(
            "rc-routes-test".to_string(),
            ControllerSettings::default(),
            Arc::clone(&metrics),
        );
        AppState {
            controller: Arc::new(controller),
            metrics,
            connection_buffer: 16,
        }
    }

    #[test]
    fn test_app_state_is_clone() {
        fn assert_clone<T: Clone>() {}
        assert_clone::<AppState>();
    }

    #[tokio::test]
    async fn test_create_room_returns_code() {
        let state = test_state();
        let app = build_routes(state.clone());

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/v1/rooms")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        let code = json["roomId"].as_str().unwrap();
        assert_eq!(code.len(), crate::config::DEFAULT_ROOM_CODE_LENGTH);
        assert_eq!(code, code.to_uppercase());

        state.controller.cancel();
    }

    #[tokio::test]
    async fn test_create_room_while_draining() {
        let state = test_state();
        state.controller.shutdown().await.unwrap();
        let app = build_routes(state);

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/v1/rooms")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"]["code"], "SERVICE_UNAVAILABLE");
    }

    #[tokio::test]
    async fn test_ws_route_requires_upgrade() {
        let state = test_state();
        let app = build_routes(state.clone());

        let response = app
            .oneshot(Request::builder().uri("/ws").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert!(response.status().is_client_error());
        state.controller.cancel();
    }

    #[tokio::test]
    async fn test_health_routes_without_metrics() {
        let health = Arc::new(HealthState::new());
        health.mark_listening();
        let app = build_health_routes(health, None);

        let ready = app
            .clone()
            .oneshot(Request::builder().uri("/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let metrics = app
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(ready.status(), StatusCode::OK);
        assert_eq!(metrics.status(), StatusCode::NOT_FOUND);
    }
}
