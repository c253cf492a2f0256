//! Agent runtime integration.
//!
//! The agent is an opaque collaborator: a producer of [`AgentEvent`]s and
//! consumer of [`AgentCommand`]s. The [`AgentConnector`] trait is the
//! seam between the chat handler and whichever runtime backs it. The
//! production [`ProcessConnector`] spawns a subprocess speaking
//! line-delimited JSON; tests script their own.

mod logger;
mod process;
mod prompt;
mod types;

pub use logger::ConversationLogger;
pub use process::{ProcessConnector, ProcessSession};
pub use prompt::{build_system_prompt, generate_date_context, greeting_prompt, UserPreferences};
pub use types::{AgentCommand, AgentEvent};

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::broadcast;

/// Per-connection context handed to the connector.
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    /// Client-reported IANA timezone name, if any.
    pub timezone: Option<String>,
}

/// One live agent session, owned by one chat connection.
#[async_trait]
pub trait AgentSession: Send + Sync {
    /// Start a turn with the given prompt text.
    async fn prompt(&self, text: &str) -> Result<()>;

    /// Answer a pending permission request.
    async fn resolve_permission(&self, id: &str, allowed: bool) -> Result<()>;

    /// Subscribe to the session's event stream.
    fn subscribe(&self) -> broadcast::Receiver<AgentEvent>;

    /// Ask the runtime to exit. Further events may still drain.
    async fn shutdown(&self);
}

/// Factory for agent sessions.
#[async_trait]
pub trait AgentConnector: Send + Sync + 'static {
    async fn open(&self, ctx: SessionContext) -> Result<Box<dyn AgentSession>>;
}
