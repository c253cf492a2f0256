//! The chat websocket endpoint.
//!
//! One live agent session per connection. Client frames are
//! [`ClientCommand`]s, server frames are [`ChatEvent`]s. A connection
//! that fails authentication is closed with code 4001 before any event
//! is sent, which tells well-behaved clients not to reconnect.

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::Response;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use log::{debug, info, warn};
use serde::Deserialize;
use tokio::sync::broadcast;

use donna_protocol::{CLOSE_AUTH_REQUIRED, ChatEvent, ClientCommand};

use crate::agent::{AgentEvent, SessionContext, greeting_prompt};

use super::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ChatQuery {
    pub timezone: Option<String>,
    pub token: Option<String>,
}

/// GET /ws/chat
pub async fn chat_ws_handler(
    State(state): State<AppState>,
    Query(query): Query<ChatQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| handle_chat_socket(socket, state, query))
}

async fn handle_chat_socket(mut socket: WebSocket, state: AppState, query: ChatQuery) {
    if !state.auth.allows(query.token.as_deref()) {
        info!("chat connection rejected: bad or missing token");
        let _ = socket
            .send(Message::Close(Some(CloseFrame {
                code: CLOSE_AUTH_REQUIRED,
                reason: "authentication required".into(),
            })))
            .await;
        return;
    }

    let ctx = SessionContext {
        timezone: query.timezone.clone(),
    };
    info!(
        "chat connection opened (timezone: {})",
        ctx.timezone.as_deref().unwrap_or("unset")
    );

    let session = match state.connector.open(ctx).await {
        Ok(session) => session,
        Err(err) => {
            warn!("failed to open agent session: {err:#}");
            let _ = send_event(
                &mut socket,
                &ChatEvent::Error {
                    message: format!("agent unavailable: {err}"),
                },
            )
            .await;
            return;
        }
    };
    let mut events = session.subscribe();

    // Donna speaks first.
    if send_event(&mut socket, &ChatEvent::GreetingStart).await.is_err() {
        session.shutdown().await;
        return;
    }
    let greeting = greeting_prompt(&state.settings.paths);
    if let Err(err) = session.prompt(&greeting).await {
        warn!("greeting prompt failed: {err:#}");
    }

    let (mut sink, mut stream) = socket.split();
    let mut dev_mode = true;
    // Id of the most recent unanswered permission request.
    let mut pending_permission: Option<String> = None;

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    if let AgentEvent::PermissionRequest { id, .. } = &event {
                        pending_permission = Some(id.clone());
                    }
                    let fatal = matches!(event, AgentEvent::Fatal { .. });
                    if let Some(out) = translate_event(event, dev_mode) {
                        let json = match serde_json::to_string(&out) {
                            Ok(json) => json,
                            Err(err) => {
                                warn!("failed to serialize event: {err}");
                                continue;
                            }
                        };
                        if sink.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                    if fatal {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("chat connection lagged, {skipped} events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            msg = stream.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<ClientCommand>(&text) {
                        Ok(ClientCommand::Message { content, dev_mode: requested }) => {
                            dev_mode = requested;
                            if let Err(err) = session.prompt(&content).await {
                                warn!("prompt failed: {err:#}");
                                let _ = send_error(&mut sink, format!("agent error: {err}")).await;
                            }
                        }
                        Ok(ClientCommand::PermissionResponse { allowed }) => {
                            match pending_permission.take() {
                                Some(id) => {
                                    if let Err(err) = session.resolve_permission(&id, allowed).await {
                                        warn!("permission response failed: {err:#}");
                                    }
                                }
                                None => debug!("permission response with nothing pending"),
                            }
                        }
                        Ok(ClientCommand::Disconnect) => break,
                        Err(err) => {
                            debug!("unparseable client frame: {err}");
                            let _ = send_error(
                                &mut sink,
                                format!("invalid command: {err}"),
                            )
                            .await;
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    debug!("chat socket error: {err}");
                    break;
                }
            },
        }
    }

    session.shutdown().await;
    info!("chat connection closed");
}

async fn send_event(socket: &mut WebSocket, event: &ChatEvent) -> Result<(), axum::Error> {
    let json = serde_json::to_string(event).map_err(axum::Error::new)?;
    socket.send(Message::Text(json.into())).await
}

async fn send_error(
    sink: &mut SplitSink<WebSocket, Message>,
    message: String,
) -> Result<(), axum::Error> {
    let event = ChatEvent::Error { message };
    let json = serde_json::to_string(&event).map_err(axum::Error::new)?;
    sink.send(Message::Text(json.into())).await
}

/// Translate a runtime event to a wire event. Thinking and tool traffic
/// is dropped when the client asked for `devMode: false`; text, errors,
/// permission requests, and turn boundaries always pass.
fn translate_event(event: AgentEvent, dev_mode: bool) -> Option<ChatEvent> {
    match event {
        AgentEvent::Text { content } => Some(ChatEvent::Text { content }),
        AgentEvent::Thinking { content } => {
            dev_mode.then_some(ChatEvent::Thinking { content })
        }
        AgentEvent::ToolUse {
            name,
            input,
            tool_id,
            parent_tool_id,
        } => dev_mode.then_some(ChatEvent::ToolUse {
            name,
            input,
            tool_id,
            parent_tool_use_id: parent_tool_id,
        }),
        AgentEvent::ToolResult {
            content,
            is_error,
            tool_id,
            parent_tool_id,
        } => dev_mode.then_some(ChatEvent::ToolResult {
            content,
            is_error,
            tool_use_id: tool_id,
            parent_tool_use_id: parent_tool_id,
        }),
        AgentEvent::PermissionRequest { tool, input, .. } => {
            Some(ChatEvent::PermissionRequest { tool, input })
        }
        AgentEvent::TurnComplete { stats } => Some(ChatEvent::SessionEnd { stats }),
        AgentEvent::Fatal { message } => Some(ChatEvent::Error { message }),
    }
}
