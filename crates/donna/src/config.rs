//! Application configuration.
//!
//! Layered from an optional TOML file (`~/.config/donna/config.toml` by
//! default) and `DONNA_*` environment variables, with serde defaults for
//! everything so a bare install works out of the box.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

const APP_NAME: &str = "donna";

/// Top-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub agent: AgentSettings,
    pub auth: AuthSettings,
    pub client: ClientSettings,
    pub paths: PathSettings,
}

/// HTTP/WebSocket server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Bind address for `donna serve`.
    pub listen: String,
    /// Allowed CORS origins; empty means same-origin only.
    pub cors_origins: Vec<String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:8787".to_string(),
            cors_origins: Vec::new(),
        }
    }
}

/// Agent-runtime subprocess settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    /// Executable implementing the line-delimited JSON agent protocol.
    pub command: String,
    pub args: Vec<String>,
    /// Model name forwarded to the runtime on startup.
    pub model: Option<String>,
    /// Extended-thinking token budget; None disables thinking.
    pub max_thinking_tokens: Option<u32>,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            command: "donna-agent".to_string(),
            args: Vec::new(),
            model: Some("opus".to_string()),
            max_thinking_tokens: Some(10_000),
        }
    }
}

/// Shared-token authentication. Disabled unless a token is configured.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AuthSettings {
    pub enabled: bool,
    pub token: Option<String>,
}

impl AuthSettings {
    /// Whether the given presented token grants access.
    pub fn allows(&self, presented: Option<&str>) -> bool {
        if !self.enabled {
            return true;
        }
        match (&self.token, presented) {
            (Some(expected), Some(got)) => expected == got,
            _ => false,
        }
    }
}

/// Settings for the terminal client (`donna chat`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    /// Chat endpoint URL.
    pub server_url: String,
    /// Fixed backoff between reconnect attempts, in milliseconds.
    pub reconnect_delay_ms: u64,
    /// Render thinking and tool activity.
    pub dev_mode: bool,
    /// IANA timezone name to report; None lets the server pick.
    pub timezone: Option<String>,
}

impl ClientSettings {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            server_url: "ws://127.0.0.1:8787/ws/chat".to_string(),
            reconnect_delay_ms: 2_000,
            dev_mode: true,
            timezone: None,
        }
    }
}

/// Filesystem layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathSettings {
    /// Markdown note store root.
    pub data_dir: String,
    /// Conversation JSONL log directory.
    pub log_dir: String,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            data_dir: "~/donna-data".to_string(),
            log_dir: "~/.local/state/donna/logs".to_string(),
        }
    }
}

impl PathSettings {
    pub fn data_dir(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.data_dir).into_owned())
    }

    pub fn log_dir(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.log_dir).into_owned())
    }

    /// Rolling summary of what the user is currently focused on.
    pub fn current_context_file(&self) -> PathBuf {
        self.data_dir().join("current_context.md")
    }

    /// User identity and communication preferences (YAML frontmatter).
    pub fn user_preferences_file(&self) -> PathBuf {
        self.data_dir().join("user_info_and_preferences.md")
    }
}

/// Default config file location (`~/.config/donna/config.toml`).
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_NAME).join("config.toml"))
}

/// Load settings from the config file (explicit override or default
/// location) layered with `DONNA_*` environment variables.
pub fn load(config_override: Option<&Path>) -> Result<Settings> {
    let mut builder = Config::builder();

    let file = config_override
        .map(Path::to_path_buf)
        .or_else(default_config_path);
    if let Some(path) = file {
        builder = builder.add_source(
            File::from(path.as_path())
                .format(FileFormat::Toml)
                .required(config_override.is_some()),
        );
    }

    builder = builder.add_source(Environment::with_prefix("DONNA").separator("__"));

    builder
        .build()
        .context("building configuration")?
        .try_deserialize()
        .context("deserializing configuration")
}
