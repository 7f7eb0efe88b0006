use std::convert::Infallible;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::{
    Router,
    routing::{get, post},
};
use gems_mcp_runtime::McpSession;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{Stream, StreamExt};
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

pub const SSE_PATH: &str = "/sse";
pub const MESSAGES_PATH: &str = "/messages/";

const OUTBOUND_CAPACITY: usize = 32;

pub fn router() -> Router<AppState> {
    Router::new()
        .route(SSE_PATH, get(open_stream))
        .route(MESSAGES_PATH, post(post_message))
        .route("/messages", post(post_message))
}

/// URL the client must POST its messages to, announced as the first event.
pub fn message_endpoint(session_id: Uuid) -> String {
    format!("{MESSAGES_PATH}?session_id={}", session_id.simple())
}

/// GET /sse
///
/// Opens a session: one `endpoint` event, then one `message` event per
/// JSON-RPC response. Dropping the stream closes the session.
pub async fn open_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (session_id, inbound, guard) = state.sessions.open();
    let (outbound_tx, outbound_rx) = mpsc::channel::<Value>(OUTBOUND_CAPACITY);

    let session = McpSession::new(session_id.simple().to_string(), state.dispatcher.clone());
    tokio::spawn(async move {
        // The session logs its own close reason.
        let _ = session.run(inbound, outbound_tx).await;
    });

    let endpoint = Event::default()
        .event("endpoint")
        .data(message_endpoint(session_id));
    let messages = ReceiverStream::new(outbound_rx).map(move |message| {
        // Held by the stream so the session unregisters when the client goes away.
        let _session = &guard;
        Ok(Event::default().event("message").data(message.to_string()))
    });

    Sse::new(tokio_stream::once(Ok(endpoint)).chain(messages)).keep_alive(KeepAlive::default())
}

#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    session_id: Option<String>,
}

/// POST /messages/?session_id=...
///
/// Accepts one JSON-RPC message (or batch) for the session. The reply
/// travels back over that session's event stream, never in this response.
pub async fn post_message(
    State(state): State<AppState>,
    Query(query): Query<MessageQuery>,
    body: Bytes,
) -> Result<(StatusCode, &'static str), AppError> {
    let raw_id = query.session_id.ok_or(AppError::MissingSessionId)?;
    let session_id = Uuid::parse_str(&raw_id).map_err(|_| AppError::InvalidSessionId)?;
    let sender = state
        .sessions
        .sender(&session_id)
        .ok_or(AppError::SessionNotFound)?;

    let message: Value =
        serde_json::from_slice(&body).map_err(|err| AppError::InvalidMessage(err.to_string()))?;

    sender
        .send(message)
        .await
        .map_err(|_| AppError::SessionNotFound)?;

    tracing::debug!(
        event = "mcp_message_accepted",
        session_id = %session_id.simple(),
        "Message queued for session"
    );
    Ok((StatusCode::ACCEPTED, "Accepted"))
}
