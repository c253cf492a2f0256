//! Commands sent from client to backend over the chat WebSocket.

use serde::{Deserialize, Serialize};

/// Commands sent from client to backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientCommand {
    /// Send a user message to the agent.
    Message {
        content: String,
        /// When false, the backend suppresses thinking and tool events
        /// for the resulting reply.
        #[serde(rename = "devMode", default = "default_dev_mode")]
        dev_mode: bool,
    },

    /// Answer a pending permission request.
    PermissionResponse {
        #[serde(default)]
        allowed: bool,
    },

    /// End the session cleanly.
    Disconnect,
}

fn default_dev_mode() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_wire_shape() {
        let cmd = ClientCommand::Message {
            content: "Remind me about taxes".to_string(),
            dev_mode: false,
        };
        let value = serde_json::to_value(&cmd).unwrap();
        assert_eq!(
            value,
            json!({"type": "message", "content": "Remind me about taxes", "devMode": false})
        );
    }

    #[test]
    fn test_dev_mode_defaults_on() {
        let cmd: ClientCommand =
            serde_json::from_value(json!({"type": "message", "content": "hi"})).unwrap();
        assert_eq!(
            cmd,
            ClientCommand::Message {
                content: "hi".to_string(),
                dev_mode: true,
            }
        );
    }

    #[test]
    fn test_permission_response() {
        let cmd: ClientCommand =
            serde_json::from_value(json!({"type": "permission_response", "allowed": false}))
                .unwrap();
        assert_eq!(cmd, ClientCommand::PermissionResponse { allowed: false });
    }
}
