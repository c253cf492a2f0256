//! The HTTP and websocket server surface.

mod chat;
mod error;
mod files;
mod notes;
mod routes;
mod state;

pub use error::{ApiError, ErrorResponse};
pub use routes::create_router;
pub use state::AppState;

use std::sync::Arc;

use anyhow::{Context, Result};
use log::{info, warn};
use tokio::net::TcpListener;
use tokio::sync::broadcast;

use crate::agent::ProcessConnector;
use crate::config::Settings;
use crate::notes::{NoteStore, NoteWatcher};

/// Run the server until the process is stopped.
pub async fn serve(settings: Settings) -> Result<()> {
    let data_dir = settings.paths.data_dir();
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("creating data directory {}", data_dir.display()))?;

    let notes = NoteStore::new(data_dir.clone());

    // The watcher must outlive the server, so its handle is kept here.
    let watcher = match NoteWatcher::new(&data_dir) {
        Ok(watcher) => Some(watcher),
        Err(err) => {
            warn!("file watching disabled: {err}");
            None
        }
    };
    let note_changes = watcher
        .as_ref()
        .map(NoteWatcher::sender)
        .unwrap_or_else(|| broadcast::channel(1).0);

    let connector = Arc::new(ProcessConnector::new(
        settings.agent.clone(),
        settings.paths.clone(),
    ));

    let listen = settings.server.listen.clone();
    let state = AppState::new(settings, connector, notes, note_changes);
    let router = create_router(state);

    let listener = TcpListener::bind(&listen)
        .await
        .with_context(|| format!("binding {listen}"))?;
    info!("listening on {listen}");
    axum::serve(listener, router).await.context("server error")?;
    Ok(())
}
