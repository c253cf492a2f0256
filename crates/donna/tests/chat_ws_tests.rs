//! End-to-end chat websocket tests: a real server on an ephemeral port,
//! the client transport dialing it, and the transcript reducer folding
//! the resulting stream.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::{Instant, timeout};
use tokio_tungstenite::tungstenite::Message as WsMessage;

mod common;
use common::{spawn_server, test_app, test_app_with};

use donna::client::{ChatTransport, Transcript, TransportConfig, TransportSignal};
use donna::config::Settings;
use donna_protocol::ChatEvent;

const WAIT: Duration = Duration::from_secs(5);

async fn next_signal(rx: &mut mpsc::UnboundedReceiver<TransportSignal>) -> TransportSignal {
    timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for signal")
        .expect("signal channel closed")
}

/// Drain signals until the next event, panicking on disconnect.
async fn next_event(rx: &mut mpsc::UnboundedReceiver<TransportSignal>) -> ChatEvent {
    loop {
        match next_signal(rx).await {
            TransportSignal::Event(event) => return event,
            TransportSignal::Connected => {}
            other => panic!("unexpected signal: {other:?}"),
        }
    }
}

async fn collect_turn(rx: &mut mpsc::UnboundedReceiver<TransportSignal>) -> Vec<ChatEvent> {
    let mut events = Vec::new();
    loop {
        let event = next_event(rx).await;
        let done = matches!(event, ChatEvent::SessionEnd { .. });
        events.push(event);
        if done {
            return events;
        }
    }
}

#[tokio::test]
async fn test_round_trip_conversation() {
    let (app, _changes, _dir) = test_app();
    let addr = spawn_server(app).await;

    let config = TransportConfig::new(format!("ws://{addr}/ws/chat"));
    let (transport, mut signals) = ChatTransport::new(config);
    transport.connect().await;

    assert_eq!(next_signal(&mut signals).await, TransportSignal::Connected);

    // The server greets unprompted.
    let mut transcript = Transcript::new();
    assert_eq!(next_event(&mut signals).await, ChatEvent::GreetingStart);
    let greeting = collect_turn(&mut signals).await;
    assert!(greeting.iter().any(|e| matches!(e, ChatEvent::Text { .. })));

    // User turn with dev mode off: no thinking on the wire.
    let cmd = transcript.push_user_message("hello donna", false);
    transport.send(cmd).await;
    let turn = collect_turn(&mut signals).await;
    assert!(!turn.iter().any(|e| matches!(e, ChatEvent::Thinking { .. })));
    let text = turn.iter().find_map(|e| match e {
        ChatEvent::Text { content } => Some(content.clone()),
        _ => None,
    });
    assert_eq!(text.as_deref(), Some("echo: hello donna"));

    for event in turn {
        transcript.apply(event);
    }
    assert!(!transcript.is_awaiting_reply());
    let reply = transcript.messages().last().expect("assistant reply");
    assert_eq!(reply.visible_blocks(false).count(), 1);

    transport.disconnect().await;
    assert_eq!(
        next_signal(&mut signals).await,
        TransportSignal::Disconnected { reconnecting: false }
    );
}

#[tokio::test]
async fn test_dev_mode_streams_thinking() {
    let (app, _changes, _dir) = test_app();
    let addr = spawn_server(app).await;

    let config = TransportConfig::new(format!("ws://{addr}/ws/chat"));
    let (transport, mut signals) = ChatTransport::new(config);
    transport.connect().await;

    assert_eq!(next_event(&mut signals).await, ChatEvent::GreetingStart);
    collect_turn(&mut signals).await;

    let mut transcript = Transcript::new();
    let cmd = transcript.push_user_message("hello", true);
    transport.send(cmd).await;
    let turn = collect_turn(&mut signals).await;
    assert!(turn.iter().any(|e| matches!(e, ChatEvent::Thinking { .. })));

    transport.disconnect().await;
}

#[tokio::test]
async fn test_permission_round_trip() {
    let (app, _changes, _dir) = test_app();
    let addr = spawn_server(app).await;

    let config = TransportConfig::new(format!("ws://{addr}/ws/chat"));
    let (transport, mut signals) = ChatTransport::new(config);
    transport.connect().await;

    assert_eq!(next_event(&mut signals).await, ChatEvent::GreetingStart);
    collect_turn(&mut signals).await;

    let mut transcript = Transcript::new();
    let cmd = transcript.push_user_message("this needs-permission", true);
    transport.send(cmd).await;

    let event = next_event(&mut signals).await;
    assert!(matches!(event, ChatEvent::PermissionRequest { .. }));
    transcript.apply(event);
    assert!(transcript.pending_permission().is_some());

    let cmd = transcript.resolve_permission(true).expect("pending request");
    transport.send(cmd).await;
    let turn = collect_turn(&mut signals).await;
    let text = turn.iter().find_map(|e| match e {
        ChatEvent::Text { content } => Some(content.as_str()),
        _ => None,
    });
    assert_eq!(text, Some("permission perm-1 true"));

    transport.disconnect().await;
}

#[tokio::test]
async fn test_auth_close_suppresses_reconnect() {
    let mut settings = Settings::default();
    settings.auth.enabled = true;
    settings.auth.token = Some("secret".to_string());
    let (app, _changes, _dir) = test_app_with(settings);
    let addr = spawn_server(app).await;

    let config = TransportConfig::new(format!("ws://{addr}/ws/chat"));
    let (transport, mut signals) = ChatTransport::new(config);
    transport.connect().await;

    assert_eq!(next_signal(&mut signals).await, TransportSignal::Connected);
    assert_eq!(next_signal(&mut signals).await, TransportSignal::AuthRequired);
}

#[tokio::test]
async fn test_valid_token_passes_ws_auth() {
    let mut settings = Settings::default();
    settings.auth.enabled = true;
    settings.auth.token = Some("secret".to_string());
    let (app, _changes, _dir) = test_app_with(settings);
    let addr = spawn_server(app).await;

    let mut config = TransportConfig::new(format!("ws://{addr}/ws/chat"));
    config.token = Some("secret".to_string());
    let (transport, mut signals) = ChatTransport::new(config);
    transport.connect().await;

    assert_eq!(next_event(&mut signals).await, ChatEvent::GreetingStart);
    transport.disconnect().await;
}

#[tokio::test]
async fn test_dropped_connection_redials_once_after_delay() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let attempts = Arc::new(AtomicUsize::new(0));
    let server_attempts = attempts.clone();
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            let attempt = server_attempts.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::spawn(async move {
                let Ok(mut socket) = tokio_tungstenite::accept_async(stream).await else {
                    return;
                };
                if attempt == 1 {
                    // Drop the first connection with a non-auth close.
                    let _ = socket.close(None).await;
                    while let Some(Ok(_)) = socket.next().await {}
                } else {
                    // Hold every later connection open.
                    while let Some(Ok(_)) = socket.next().await {}
                }
            });
        }
    });

    let mut config = TransportConfig::new(format!("ws://{addr}/ws/chat"));
    config.reconnect_delay = Duration::from_millis(150);
    let (transport, mut signals) = ChatTransport::new(config);
    transport.connect().await;

    assert_eq!(next_signal(&mut signals).await, TransportSignal::Connected);
    assert_eq!(
        next_signal(&mut signals).await,
        TransportSignal::Disconnected { reconnecting: true }
    );
    let dropped_at = Instant::now();
    assert_eq!(next_signal(&mut signals).await, TransportSignal::Connected);
    assert!(dropped_at.elapsed() >= Duration::from_millis(100));

    // One re-dial was scheduled; no further attempts follow while the
    // replacement connection stays up.
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
    assert!(signals.try_recv().is_err());

    transport.disconnect().await;
}

#[tokio::test]
async fn test_superseded_connection_produces_no_signals() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(async move {
                let Ok(mut socket) = tokio_tungstenite::accept_async(stream).await else {
                    return;
                };
                // Keep streaming event frames until the peer goes away.
                loop {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    let frame = serde_json::to_string(&ChatEvent::Text {
                        content: "late".to_string(),
                    })
                    .unwrap();
                    if socket.send(WsMessage::Text(frame.into())).await.is_err() {
                        break;
                    }
                }
            });
        }
    });

    let config = TransportConfig::new(format!("ws://{addr}/ws/chat"));
    let (transport, mut signals) = ChatTransport::new(config);
    transport.connect().await;
    assert_eq!(next_signal(&mut signals).await, TransportSignal::Connected);

    // Supersede the connection while the server still has frames in
    // flight for it.
    transport.disconnect().await;
    assert_eq!(
        next_signal(&mut signals).await,
        TransportSignal::Disconnected { reconnecting: false }
    );

    // The old socket task now holds a stale generation, so the frames
    // the server keeps sending must not surface as signals.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(signals.try_recv().is_err());
}

#[tokio::test]
async fn test_files_ws_streams_changes() {
    let (app, changes, _dir) = test_app();
    let addr = spawn_server(app).await;

    let (mut socket, _response) =
        tokio_tungstenite::connect_async(format!("ws://{addr}/ws/files"))
            .await
            .expect("connect files ws");

    // Give the handler a moment to subscribe before publishing.
    tokio::time::sleep(Duration::from_millis(50)).await;
    changes
        .send(donna::notes::NoteChange::FileChanged {
            path: "shopping-list.md".to_string(),
        })
        .expect("at least one subscriber");

    let frame = timeout(WAIT, socket.next())
        .await
        .expect("timed out waiting for frame")
        .expect("stream ended")
        .expect("frame error");
    let json: Value = serde_json::from_str(frame.to_text().expect("text frame")).unwrap();
    assert_eq!(json["type"], "file_changed");
    assert_eq!(json["path"], "shopping-list.md");

    let _ = socket.close(None).await;
}
