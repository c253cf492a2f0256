//! Wire protocol types for Donna chat communication.
//!
//! This crate defines the frame formats exchanged over the chat WebSocket:
//!
//! ```text
//! Client <--[WS: ChatEvent / ClientCommand]--> Backend <--[stdio stream]--> Agent runtime
//! ```
//!
//! Events flow backend -> client and describe incremental reply content,
//! tool activity, permission prompts, and turn completion. Commands flow
//! client -> backend. Both sides speak JSON, one object per text frame,
//! discriminated by a `type` field.
//!
//! The client does not know or care which agent runtime is attached; the
//! backend translates native runtime output into these frames.

pub mod commands;
pub mod events;

pub use commands::ClientCommand;
pub use events::{ChatEvent, SessionStats};

/// WebSocket close code signalling that authentication is required.
///
/// Clients must not auto-reconnect after receiving this code; doing so
/// would loop forever against a server that keeps rejecting them.
pub const CLOSE_AUTH_REQUIRED: u16 = 4001;
