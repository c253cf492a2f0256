//! The note-change websocket endpoint.
//!
//! Streams `file_created` / `file_changed` / `file_deleted` frames from
//! the data-directory watcher. Read-only: inbound frames other than
//! close are ignored.

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use log::{debug, info, warn};
use serde::Deserialize;
use tokio::sync::broadcast;

use donna_protocol::CLOSE_AUTH_REQUIRED;

use super::state::AppState;

#[derive(Debug, Deserialize)]
pub struct FilesQuery {
    pub token: Option<String>,
}

/// GET /ws/files
pub async fn files_ws_handler(
    State(state): State<AppState>,
    Query(query): Query<FilesQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| handle_files_socket(socket, state, query))
}

async fn handle_files_socket(mut socket: WebSocket, state: AppState, query: FilesQuery) {
    if !state.auth.allows(query.token.as_deref()) {
        let _ = socket
            .send(Message::Close(Some(CloseFrame {
                code: CLOSE_AUTH_REQUIRED,
                reason: "authentication required".into(),
            })))
            .await;
        return;
    }

    info!("file watch connection opened");
    let mut changes = state.note_changes.subscribe();
    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            change = changes.recv() => match change {
                Ok(change) => {
                    let json = match serde_json::to_string(&change) {
                        Ok(json) => json,
                        Err(err) => {
                            warn!("failed to serialize file change: {err}");
                            continue;
                        }
                    };
                    if sink.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!("file watch connection lagged, {skipped} changes dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            msg = stream.next() => match msg {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(_)) => break,
            },
        }
    }
    info!("file watch connection closed");
}
