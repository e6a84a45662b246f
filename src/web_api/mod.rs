//! Web API - Control Plane
//!
//! ## Responsibilities
//!
//! - Health and status endpoints (per-camera alarm state, dispatcher queue
//!   health, polled coil value)
//! - Manual "start recording" commands over REST and WebSocket
//!
//! WebSocket connect/disconnect events are logged only; no state is kept per
//! client.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use crate::error::{Error, Result};
use crate::state::AppState;

/// Create API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health_check))
        .route("/api/status", get(service_status))
        .route("/api/cameras/:id/record", post(start_recording))
        .route("/api/ws", get(websocket_handler))
        .with_state(state)
}

async fn health_check() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// Full service status for dashboards.
async fn service_status(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let mut cameras = Vec::with_capacity(state.sessions.len());
    for session in state.sessions.values() {
        cameras.push(json!({
            "camera_id": session.camera_id,
            "status": session.status().await,
            "recording": session.capturing(),
            "fps": session.current_fps(),
        }));
    }
    cameras.sort_by(|a, b| {
        a["camera_id"]
            .as_str()
            .unwrap_or_default()
            .cmp(b["camera_id"].as_str().unwrap_or_default())
    });

    let dispatcher = state.dispatcher.stats().await;
    let coil_state = state.coil_monitor.as_ref().map(|m| m.value());

    Ok(Json(json!({
        "module_id": state.config.module_id,
        "cameras": cameras,
        "dispatcher": dispatcher,
        "coil_state": coil_state,
    })))
}

/// Manual record trigger: `POST /api/cameras/:id/record`
async fn start_recording(
    State(state): State<AppState>,
    Path(camera_id): Path<String>,
) -> Result<impl IntoResponse> {
    let session = state
        .sessions
        .get(&camera_id)
        .ok_or_else(|| Error::NotFound(format!("camera {camera_id}")))?;

    session.set_manual_recording(true);
    tracing::info!(camera_id = %camera_id, "Manual recording requested via REST");

    Ok(Json(json!({ "camera_id": camera_id, "recording": true })))
}

/// Start-recording command received over the WebSocket channel.
#[derive(Debug, Deserialize)]
struct RecordCommand {
    camera_id: String,
}

/// WebSocket upgrade handler
async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_websocket(socket, state))
}

/// Handle WebSocket connection
async fn handle_websocket(mut socket: WebSocket, state: AppState) {
    let conn_id = uuid::Uuid::new_v4();
    tracing::info!(connection_id = %conn_id, "Control client connected");

    while let Some(result) = socket.recv().await {
        match result {
            Ok(Message::Text(text)) => match serde_json::from_str::<RecordCommand>(&text) {
                Ok(command) => {
                    if let Some(session) = state.sessions.get(&command.camera_id) {
                        session.set_manual_recording(true);
                        tracing::info!(
                            connection_id = %conn_id,
                            camera_id = %command.camera_id,
                            "Manual recording requested via WebSocket"
                        );
                        let ack = json!({ "camera_id": command.camera_id, "recording": true });
                        if socket.send(Message::Text(ack.to_string())).await.is_err() {
                            break;
                        }
                    } else {
                        tracing::warn!(
                            connection_id = %conn_id,
                            camera_id = %command.camera_id,
                            "Record command for unknown camera"
                        );
                    }
                }
                Err(e) => {
                    tracing::warn!(connection_id = %conn_id, error = %e, "Unparseable control message");
                }
            },
            Ok(Message::Close(_)) => {
                break;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(connection_id = %conn_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    tracing::info!(connection_id = %conn_id, "Control client disconnected");
}
