//! Donna backend and client library.
//!
//! Provides the chat server (axum WebSocket endpoint fronting an agent
//! runtime), the markdown note store, and the client core: a reconnecting
//! event transport plus a pure transcript reducer.

pub mod agent;
pub mod api;
pub mod auth;
pub mod chat;
pub mod client;
pub mod config;
pub mod notes;
