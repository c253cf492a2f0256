//! Application state shared across handlers.

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::agent::AgentConnector;
use crate::auth::AuthState;
use crate::config::Settings;
use crate::notes::{NoteChange, NoteStore};

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub connector: Arc<dyn AgentConnector>,
    pub notes: NoteStore,
    pub note_changes: broadcast::Sender<NoteChange>,
    pub auth: AuthState,
}

impl AppState {
    pub fn new(
        settings: Settings,
        connector: Arc<dyn AgentConnector>,
        notes: NoteStore,
        note_changes: broadcast::Sender<NoteChange>,
    ) -> Self {
        let auth = AuthState::new(&settings.auth);
        Self {
            settings: Arc::new(settings),
            connector,
            notes,
            note_changes,
            auth,
        }
    }
}
