//! Transcript reducer.
//!
//! Pure state transitions from (transcript, incoming event or user action)
//! to a new transcript. No network I/O lives here: transport failures are
//! converted to state transitions by the owner, and transitions themselves
//! cannot fail.
//!
//! The reducer folds the ordered event stream into messages made of
//! ordered blocks. Consecutive `text` / `thinking` chunks merge into one
//! block, so the transcript model is independent of network chunking
//! granularity. Tool results are correlated to their tool blocks by
//! external id; a positional fallback exists only for runtimes that
//! supply none.

use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use donna_protocol::{ChatEvent, ClientCommand, SessionStats};

/// Who produced a transcript message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

/// A contiguous, homogeneous span of one message's content.
#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    /// Internal reasoning text.
    Thinking { text: String },

    /// A tool invocation with its later-arriving result.
    Tool {
        /// Reducer-assigned id, unique within the transcript.
        local_id: u64,
        name: String,
        input: Value,
        result: Option<String>,
        is_error: Option<bool>,
        /// Runtime-supplied correlation id, when the runtime provides one.
        external_id: Option<String>,
        parent_external_id: Option<String>,
    },

    /// Visible reply text.
    Text { text: String },
}

impl Block {
    /// Whether the block is shown when thinking/tool rendering is off.
    pub fn visible_in_plain_mode(&self) -> bool {
        matches!(self, Block::Text { .. })
    }
}

/// One unit of the rendered transcript. Immutable once finalized.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub blocks: Vec<Block>,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    fn new(role: Role) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            blocks: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    /// Blocks to render for the given display mode.
    ///
    /// This is a view-time filter only: toggling `dev_mode` retroactively
    /// reveals or hides history without touching stored state.
    pub fn visible_blocks(&self, dev_mode: bool) -> impl Iterator<Item = &Block> {
        self.blocks
            .iter()
            .filter(move |b| dev_mode || b.visible_in_plain_mode())
    }
}

/// A permission request awaiting a user decision.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingPermission {
    pub tool: String,
    pub input: Value,
}

/// Client-side transcript state for one chat session.
///
/// Owned by exactly one session; all mutation is serialized through the
/// session's event queue, so no locking is needed.
#[derive(Debug, Default)]
pub struct Transcript {
    messages: Vec<Message>,
    current: Option<Message>,
    /// Positional fallback for tool-result correlation. Set only when a
    /// `tool_use` event carried no external id.
    pending_tool: Option<u64>,
    next_local_id: u64,
    awaiting_reply: bool,
    pending_permission: Option<PendingPermission>,
    last_stats: Option<SessionStats>,
    last_error: Option<String>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Finalized messages, oldest first.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// The in-progress assistant reply, if one is open.
    pub fn current(&self) -> Option<&Message> {
        self.current.as_ref()
    }

    pub fn is_awaiting_reply(&self) -> bool {
        self.awaiting_reply
    }

    pub fn pending_permission(&self) -> Option<&PendingPermission> {
        self.pending_permission.as_ref()
    }

    pub fn last_stats(&self) -> Option<&SessionStats> {
        self.last_stats.as_ref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// User action: send a message.
    ///
    /// Appends a finalized user message, opens a fresh assistant reply,
    /// and returns the command to transmit.
    pub fn push_user_message(&mut self, text: &str, dev_mode: bool) -> ClientCommand {
        self.finalize_current();

        let mut msg = Message::new(Role::User);
        msg.blocks.push(Block::Text {
            text: text.to_string(),
        });
        self.messages.push(msg);

        self.current = Some(Message::new(Role::Assistant));
        self.awaiting_reply = true;
        self.last_error = None;

        ClientCommand::Message {
            content: text.to_string(),
            dev_mode,
        }
    }

    /// User action: answer the pending permission request.
    ///
    /// Returns the command to transmit, or `None` when nothing is pending.
    pub fn resolve_permission(&mut self, allowed: bool) -> Option<ClientCommand> {
        self.pending_permission
            .take()
            .map(|_| ClientCommand::PermissionResponse { allowed })
    }

    /// Fold one event from the transport into the transcript.
    pub fn apply(&mut self, event: ChatEvent) {
        match event {
            ChatEvent::Text { content } => self.append_text(content),
            ChatEvent::Thinking { content } => self.append_thinking(content),
            ChatEvent::ToolUse {
                name,
                input,
                tool_id,
                parent_tool_use_id,
            } => self.open_tool(name, input, tool_id, parent_tool_use_id),
            ChatEvent::ToolResult {
                content,
                is_error,
                tool_use_id,
                ..
            } => self.close_tool(content, is_error, tool_use_id),
            ChatEvent::PermissionRequest { tool, input } => {
                self.pending_permission = Some(PendingPermission { tool, input });
            }
            ChatEvent::SessionEnd { stats } => {
                self.last_stats = Some(stats);
                self.finalize_current();
                self.awaiting_reply = false;
            }
            ChatEvent::GreetingStart => {
                self.finalize_current();
                self.current = Some(Message::new(Role::Assistant));
                self.awaiting_reply = true;
            }
            ChatEvent::Error { message } => {
                self.last_error = Some(message);
                self.finalize_current();
                self.awaiting_reply = false;
            }
        }
    }

    /// The transport dropped while a reply was open.
    ///
    /// Finalizes the open message locally (it is kept only if it carries
    /// content) and clears loading/pending state so the session cannot get
    /// stuck waiting on a connection that no longer exists.
    pub fn finalize_on_disconnect(&mut self) {
        self.finalize_current();
        self.awaiting_reply = false;
        self.pending_permission = None;
    }

    fn open_reply_if_needed(&mut self) -> &mut Message {
        self.current
            .get_or_insert_with(|| Message::new(Role::Assistant))
    }

    fn append_text(&mut self, content: String) {
        let msg = self.open_reply_if_needed();
        match msg.blocks.last_mut() {
            Some(Block::Text { text }) => text.push_str(&content),
            _ => msg.blocks.push(Block::Text { text: content }),
        }
    }

    fn append_thinking(&mut self, content: String) {
        let msg = self.open_reply_if_needed();
        match msg.blocks.last_mut() {
            Some(Block::Thinking { text }) => text.push_str(&content),
            _ => msg.blocks.push(Block::Thinking { text: content }),
        }
    }

    fn open_tool(
        &mut self,
        name: String,
        input: Value,
        external_id: Option<String>,
        parent_external_id: Option<String>,
    ) {
        let local_id = self.next_local_id;
        self.next_local_id += 1;

        // Positional tracking is a fallback for runtimes that supply no
        // correlation id; id-based correlation always wins when available.
        if external_id.is_none() {
            self.pending_tool = Some(local_id);
        }

        let msg = self.open_reply_if_needed();
        msg.blocks.push(Block::Tool {
            local_id,
            name,
            input,
            result: None,
            is_error: None,
            external_id,
            parent_external_id,
        });
    }

    fn close_tool(&mut self, content: String, err: bool, tool_use_id: Option<String>) {
        let fallback = self.pending_tool;
        let Some(msg) = self.current.as_mut() else {
            return;
        };

        // The matching block may not be the most recently appended one:
        // nested sub-agent calls leave several tool blocks in flight.
        let target = msg.blocks.iter_mut().rev().find(|b| match b {
            Block::Tool {
                local_id,
                external_id,
                result,
                ..
            } => match (&tool_use_id, external_id) {
                (Some(wanted), Some(have)) => wanted == have,
                (Some(_), None) => false,
                (None, _) => result.is_none() && fallback == Some(*local_id),
            },
            _ => false,
        });

        if let Some(Block::Tool {
            local_id,
            result,
            is_error,
            ..
        }) = target
        {
            *result = Some(content);
            *is_error = Some(err);
            if fallback == Some(*local_id) {
                self.pending_tool = None;
            }
        } else {
            log::debug!("dropping tool_result with no matching tool block");
        }
    }

    fn finalize_current(&mut self) {
        if let Some(msg) = self.current.take() {
            // An empty reply produces no placeholder message.
            if !msg.blocks.is_empty() {
                self.messages.push(msg);
            }
        }
        self.pending_tool = None;
    }
}
