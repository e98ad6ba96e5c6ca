//! Room Controller error types.
//!
//! The session coordinator never surfaces errors for referential no-ops
//! (unknown room, unknown participant). These types cover the plumbing around
//! it: actor channels, socket writes, room lookups and the HTTP surface. Internal details are logged server-side but not exposed to clients.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Room Controller error type.
///
/// Maps to HTTP status codes:
/// - `Internal`, `Transport`: 500 Internal Server Error
/// - `RoomNotFound`: 404 Not Found
/// - `Draining`, `RoomCodeExhausted`: 503 Service Unavailable
#[derive(Debug, Error)]
pub enum RcError {
    /// Actor channel or task failure.
    #[error("Internal error: {0}")]
    Internal(String),

    /// Room does not exist in the registry.
    #[error("Room not found: {0}")]
    RoomNotFound(String),

    /// WebSocket send/receive failure.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Controller is shutting down and no longer accepts events.
    #[error("Room controller is draining")]
    Draining,

    /// Could not find an unused room code.
    #[error("Room code space exhausted after {0} attempts")]
    RoomCodeExhausted(usize),
}

impl RcError {
    /// Returns the HTTP status code for this error.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            RcError::Internal(_) | RcError::Transport(_) => StatusCode::INTERNAL_SERVER_ERROR,
            RcError::RoomNotFound(_) => StatusCode::NOT_FOUND,
            RcError::Draining | RcError::RoomCodeExhausted(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Returns a stable machine-readable error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            RcError::Internal(_) | RcError::Transport(_) => "INTERNAL_ERROR",
            RcError::RoomNotFound(_) => "NOT_FOUND",
            RcError::Draining | RcError::RoomCodeExhausted(_) => "SERVICE_UNAVAILABLE",
        }
    }

    /// Returns a client-safe error message (no internal details).
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            RcError::Internal(_) | RcError::Transport(_) => {
                "An internal error occurred".to_string()
            }
            RcError::RoomNotFound(_) => "Room not found".to_string(),
            RcError::Draining => "Server is shutting down, please reconnect".to_string(),
            RcError::RoomCodeExhausted(_) => {
                "Could not allocate a room code, please try again".to_string()
            }
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

impl IntoResponse for RcError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(target: "rc.errors", error = %self, "Request failed");
        } else {
            tracing::debug!(target: "rc.errors", error = %self, "Request rejected");
        }

        let body = ErrorResponse {
            error: ErrorDetail {
                code: self.code(),
                message: self.client_message(),
            },
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_status_code_mapping() {
        assert_eq!(
            RcError::Internal("channel closed".to_string()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            RcError::RoomNotFound("ABC".to_string()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            RcError::Draining.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            RcError::RoomCodeExhausted(16).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_client_messages_hide_internal_details() {
        let err = RcError::Internal("send to 10.0.0.7 failed".to_string());
        assert!(!err.client_message().contains("10.0.0.7"));
        assert_eq!(err.client_message(), "An internal error occurred");

        let err = RcError::Transport("broken pipe".to_string());
        assert_eq!(err.client_message(), "An internal error occurred");
    }

    #[test]
    fn test_display_formatting() {
        assert_eq!(
            format!("{}", RcError::RoomNotFound("X1Y2Z".to_string())),
            "Room not found: X1Y2Z"
        );
        assert_eq!(
            format!("{}", RcError::RoomCodeExhausted(16)),
            "Room code space exhausted after 16 attempts"
        );
    }

    #[tokio::test]
    async fn test_into_response_body_shape() {
        use http_body_util::BodyExt;

        let response = RcError::RoomNotFound("ABC".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"]["code"], "NOT_FOUND");
        assert_eq!(body["error"]["message"], "Room not found");
    }
}
