//! Agent runtime protocol types.
//!
//! The backend talks to the agent runtime over line-delimited JSON on
//! stdio: one `AgentCommand` per line in, one `AgentEvent` per line out.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use donna_protocol::SessionStats;

/// Commands written to the runtime's stdin.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentCommand {
    /// Sent once after spawn, before any prompt.
    Init {
        system_prompt: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        model: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        max_thinking_tokens: Option<u32>,
    },

    /// A user (or system-generated) prompt starting a turn.
    Prompt { text: String },

    /// Answer to a previously emitted `permission_request`.
    PermissionResponse {
        id: String,
        allowed: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },

    /// Ask the runtime to exit cleanly.
    Shutdown,
}

/// Events read from the runtime's stdout.
///
/// Shapes mirror the client wire protocol; the chat handler translates
/// them one-to-one, stripping runtime-internal fields such as the
/// permission request id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    Text {
        content: String,
    },
    Thinking {
        content: String,
    },
    ToolUse {
        name: String,
        input: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tool_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        parent_tool_id: Option<String>,
    },
    ToolResult {
        content: String,
        #[serde(default)]
        is_error: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tool_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        parent_tool_id: Option<String>,
    },
    /// The runtime is blocked until a `permission_response` with this id.
    PermissionRequest {
        id: String,
        tool: String,
        input: Value,
    },
    /// The current turn finished.
    TurnComplete {
        #[serde(default)]
        stats: SessionStats,
    },
    /// The runtime hit an unrecoverable error for this turn.
    Fatal {
        message: String,
    },
}

impl AgentEvent {
    /// Parse one stdout line. Blank lines yield `None`.
    pub fn parse_line(line: &str) -> Option<Result<Self, serde_json::Error>> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        Some(serde_json::from_str(line))
    }
}
