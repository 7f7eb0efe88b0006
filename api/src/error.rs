use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

/// Machine-readable error codes returned by the HTTP layer.
pub mod codes {
    pub const MISSING_SESSION_ID: &str = "missing_session_id";
    pub const INVALID_SESSION_ID: &str = "invalid_session_id";
    pub const SESSION_NOT_FOUND: &str = "session_not_found";
    pub const INVALID_MESSAGE: &str = "invalid_message";
}

/// Structured error body for the posted-message endpoint.
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    pub message: String,
    /// Hint about what the correct usage looks like
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docs_hint: Option<String>,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("session_id query parameter is required")]
    MissingSessionId,
    #[error("session_id is not a valid session identifier")]
    InvalidSessionId,
    /// Unknown id, or the session already closed.
    #[error("Could not find session")]
    SessionNotFound,
    #[error("Could not parse message: {0}")]
    InvalidMessage(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let message = self.to_string();
        let (status, code, docs_hint) = match &self {
            AppError::MissingSessionId => (
                StatusCode::BAD_REQUEST,
                codes::MISSING_SESSION_ID,
                Some("Use the endpoint URL announced on the /sse stream."),
            ),
            AppError::InvalidSessionId => (
                StatusCode::BAD_REQUEST,
                codes::INVALID_SESSION_ID,
                Some("Use the endpoint URL announced on the /sse stream."),
            ),
            AppError::SessionNotFound => (
                StatusCode::NOT_FOUND,
                codes::SESSION_NOT_FOUND,
                Some("Open a new session with GET /sse."),
            ),
            AppError::InvalidMessage(_) => (
                StatusCode::BAD_REQUEST,
                codes::INVALID_MESSAGE,
                Some("Body must be a JSON-RPC 2.0 message."),
            ),
        };

        tracing::warn!(
            event = "mcp_message_rejected",
            error = code,
            status = status.as_u16(),
            message = %message,
            "Posted message rejected"
        );

        (
            status,
            Json(ApiError {
                error: code.to_string(),
                message,
                docs_hint: docs_hint.map(str::to_string),
            }),
        )
            .into_response()
    }
}
