//! Shared test fixtures.

#![allow(dead_code)]

use std::fs;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use axum::Router;
use serde_json::json;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::broadcast;

use donna::agent::{AgentConnector, AgentEvent, AgentSession, SessionContext};
use donna::api::{AppState, create_router};
use donna::config::Settings;
use donna::notes::{NoteChange, NoteStore};
use donna_protocol::SessionStats;

/// Agent stand-in that answers every prompt with a fixed event sequence.
pub struct EchoConnector;

#[async_trait]
impl AgentConnector for EchoConnector {
    async fn open(&self, _ctx: SessionContext) -> Result<Box<dyn AgentSession>> {
        Ok(Box::new(EchoSession::new()))
    }
}

pub struct EchoSession {
    events: broadcast::Sender<AgentEvent>,
}

impl EchoSession {
    fn new() -> Self {
        let (events, _) = broadcast::channel(64);
        Self { events }
    }

    fn turn_complete(&self) {
        let _ = self.events.send(AgentEvent::TurnComplete {
            stats: SessionStats {
                turns: Some(1),
                duration_ms: Some(5),
                cost_usd: None,
            },
        });
    }
}

#[async_trait]
impl AgentSession for EchoSession {
    async fn prompt(&self, text: &str) -> Result<()> {
        if text.contains("needs-permission") {
            let _ = self.events.send(AgentEvent::PermissionRequest {
                id: "perm-1".to_string(),
                tool: "write_note".to_string(),
                input: json!({"path": "a.md"}),
            });
            return Ok(());
        }
        let _ = self.events.send(AgentEvent::Thinking {
            content: "considering".to_string(),
        });
        let _ = self.events.send(AgentEvent::Text {
            content: format!("echo: {}", text.lines().next().unwrap_or("")),
        });
        self.turn_complete();
        Ok(())
    }

    async fn resolve_permission(&self, id: &str, allowed: bool) -> Result<()> {
        let _ = self.events.send(AgentEvent::Text {
            content: format!("permission {id} {allowed}"),
        });
        self.turn_complete();
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<AgentEvent> {
        self.events.subscribe()
    }

    async fn shutdown(&self) {}
}

/// Build a router over a seeded temporary data directory.
pub fn test_app_with(mut settings: Settings) -> (Router, broadcast::Sender<NoteChange>, TempDir) {
    let dir = TempDir::new().expect("create temp dir");
    fs::create_dir(dir.path().join("projects")).expect("create subdir");
    fs::write(
        dir.path().join("projects/baby-prep.md"),
        "---\nstatus: active\n---\n# Baby Prep\n\nSee [[Shopping List]].\n",
    )
    .expect("seed note");
    fs::write(
        dir.path().join("shopping-list.md"),
        "- crib\n- monitor\n",
    )
    .expect("seed note");

    settings.paths.data_dir = dir.path().to_string_lossy().to_string();
    settings.paths.log_dir = dir.path().join("logs").to_string_lossy().to_string();

    let notes = NoteStore::new(dir.path().to_path_buf());
    let (note_changes, _) = broadcast::channel(64);
    let state = AppState::new(settings, Arc::new(EchoConnector), notes, note_changes.clone());
    (create_router(state), note_changes, dir)
}

pub fn test_app() -> (Router, broadcast::Sender<NoteChange>, TempDir) {
    test_app_with(Settings::default())
}

/// Serve the router on an ephemeral port, returning its base address.
pub async fn spawn_server(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    format!("127.0.0.1:{}", addr.port())
}
