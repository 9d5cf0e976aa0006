//! services/api/src/web/ws_handler.rs
//!
//! Live view of one session over a WebSocket: the present list on every
//! check-in and the countdown once per second. Each connection is also an
//! expiry observer, so the instructor screen itself can close the session.

use crate::web::{
    middleware::Identity,
    protocol::ServerMessage,
    state::AppState,
};
use attendance_core::AttendanceError;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    response::Response,
    Extension,
};
use futures::{
    stream::{SplitSink, StreamExt},
    SinkExt,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

const COUNTDOWN_PERIOD: Duration = Duration::from_secs(1);

/// The handler for upgrading HTTP requests to WebSocket connections.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(app_state): State<Arc<AppState>>,
    Extension(Identity(user_id)): Extension<Identity>,
    Path(session_id): Path<Uuid>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, app_state, user_id, session_id))
}

async fn handle_socket(
    socket: WebSocket,
    app_state: Arc<AppState>,
    user_id: String,
    session_id: Uuid,
) {
    info!(%session_id, user_id, "Live session view connected");
    let (mut sender, mut receiver) = socket.split();
    let engine = &app_state.engine;

    // --- 1. Initialization Phase ---
    let view = match engine.sessions.countdown(session_id).await {
        Ok(view) => view,
        Err(e) => {
            send_error(&mut sender, &e).await;
            return;
        }
    };
    if view.session.owner_id != user_id {
        warn!(%session_id, user_id, "Live view refused for non-owner");
        let refusal = AttendanceError::NotCourseOwner {
            course_id: view.session.course_id.clone(),
            user_id,
        };
        send_error(&mut sender, &refusal).await;
        return;
    }
    if !view.session.is_active() {
        let status = view.session.status.to_string();
        send(&mut sender, &ServerMessage::ended(session_id, status, view.session.outcome)).await;
        return;
    }

    let mut presence = match engine.presence.subscribe(session_id).await {
        Ok(stream) => stream,
        Err(e) => {
            send_error(&mut sender, &e).await;
            return;
        }
    };
    let mut ticker = tokio::time::interval(COUNTDOWN_PERIOD);

    // --- 2. Main Loop ---
    loop {
        tokio::select! {
            snapshot = presence.next() => match snapshot {
                Some(snapshot) => {
                    if !send(&mut sender, &ServerMessage::presence(snapshot)).await {
                        break;
                    }
                }
                None => {
                    warn!(%session_id, "Presence feed ended");
                    break;
                }
            },
            _ = ticker.tick() => match engine.sessions.countdown(session_id).await {
                Ok(view) if view.session.is_active() => {
                    let tick = ServerMessage::Countdown {
                        session_id,
                        remaining_secs: view.remaining_secs,
                    };
                    if !send(&mut sender, &tick).await {
                        break;
                    }
                }
                Ok(view) => {
                    let status = view.session.status.to_string();
                    send(&mut sender, &ServerMessage::ended(session_id, status, view.session.outcome)).await;
                    break;
                }
                Err(e) if e.is_retryable() => warn!(%session_id, error = %e, "Countdown skipped"),
                Err(e) => {
                    send_error(&mut sender, &e).await;
                    break;
                }
            },
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    warn!(%session_id, error = %e, "WebSocket receive failed");
                    break;
                }
                Some(Ok(_)) => {}
            },
        }
    }

    let _ = sender.close().await;
    info!(%session_id, "Live session view closed");
}

/// Sends one message. Returns false once the client is gone.
async fn send(sender: &mut SplitSink<WebSocket, Message>, message: &ServerMessage) -> bool {
    let json = match serde_json::to_string(message) {
        Ok(json) => json,
        Err(e) => {
            error!(error = %e, "Failed to serialize server message");
            return false;
        }
    };
    sender.send(Message::Text(json.into())).await.is_ok()
}

async fn send_error(sender: &mut SplitSink<WebSocket, Message>, error: &AttendanceError) {
    let message = ServerMessage::Error {
        code: error.code().to_string(),
        message: error.to_string(),
    };
    send(sender, &message).await;
}
