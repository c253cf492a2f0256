//! Events sent from backend to client over the chat WebSocket.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Events sent from backend to client.
///
/// Events for a single reply arrive in producer order. A `ToolResult` is
/// correlated to its `ToolUse` by `tool_use_id`, never by adjacency:
/// other events may interleave between them and several tool invocations
/// can be in flight at once (nested sub-agent delegation).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    /// Incremental chunk of visible reply text.
    Text { content: String },

    /// Incremental chunk of internal reasoning (dev mode only).
    Thinking { content: String },

    /// A tool call has begun.
    ToolUse {
        name: String,
        input: Value,
        /// Correlation id for the later `ToolResult`. Older runtimes may
        /// omit it, in which case clients fall back to positional tracking.
        #[serde(rename = "toolId", default, skip_serializing_if = "Option::is_none")]
        tool_id: Option<String>,
        /// Links sub-agent-delegated calls to their parent call.
        #[serde(
            rename = "parentToolUseId",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        parent_tool_use_id: Option<String>,
    },

    /// Result of a previously started tool call.
    ToolResult {
        content: String,
        #[serde(rename = "isError", default)]
        is_error: bool,
        #[serde(
            rename = "toolUseId",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        tool_use_id: Option<String>,
        #[serde(
            rename = "parentToolUseId",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        parent_tool_use_id: Option<String>,
    },

    /// The agent is blocked pending a yes/no decision from the user.
    PermissionRequest { tool: String, input: Value },

    /// The agent finished producing this reply.
    SessionEnd { stats: SessionStats },

    /// Sentinel: the agent is about to speak without user input.
    GreetingStart,

    /// Terminal failure for the current turn. The connection stays usable.
    Error { message: String },
}

/// Per-turn statistics reported with `session_end`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SessionStats {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub turns: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_usd: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_text_event_wire_shape() {
        let event = ChatEvent::Text {
            content: "Hi there".to_string(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value, json!({"type": "text", "content": "Hi there"}));
    }

    #[test]
    fn test_tool_use_field_names() {
        let event = ChatEvent::ToolUse {
            name: "Read".to_string(),
            input: json!({"file_path": "tasks/taxes.md"}),
            tool_id: Some("toolu_01".to_string()),
            parent_tool_use_id: None,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "tool_use");
        assert_eq!(value["toolId"], "toolu_01");
        assert!(value.get("parentToolUseId").is_none());
    }

    #[test]
    fn test_tool_result_correlates_by_id() {
        let frame = json!({
            "type": "tool_result",
            "content": "ok",
            "isError": false,
            "toolUseId": "toolu_01",
            "parentToolUseId": "toolu_00",
        });
        let event: ChatEvent = serde_json::from_value(frame).unwrap();
        match event {
            ChatEvent::ToolResult {
                tool_use_id,
                parent_tool_use_id,
                is_error,
                ..
            } => {
                assert_eq!(tool_use_id.as_deref(), Some("toolu_01"));
                assert_eq!(parent_tool_use_id.as_deref(), Some("toolu_00"));
                assert!(!is_error);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_tool_result_without_ids_still_parses() {
        // Older runtimes omit correlation ids entirely.
        let frame = json!({"type": "tool_result", "content": "done"});
        let event: ChatEvent = serde_json::from_value(frame).unwrap();
        assert!(matches!(
            event,
            ChatEvent::ToolResult {
                tool_use_id: None,
                is_error: false,
                ..
            }
        ));
    }

    #[test]
    fn test_session_end_stats() {
        let frame = json!({
            "type": "session_end",
            "stats": {"turns": 1, "duration_ms": 1234, "cost_usd": 0.0421},
        });
        let event: ChatEvent = serde_json::from_value(frame).unwrap();
        match event {
            ChatEvent::SessionEnd { stats } => {
                assert_eq!(stats.turns, Some(1));
                assert_eq!(stats.duration_ms, Some(1234));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_greeting_start_has_no_payload() {
        let event: ChatEvent = serde_json::from_value(json!({"type": "greeting_start"})).unwrap();
        assert_eq!(event, ChatEvent::GreetingStart);
    }
}
