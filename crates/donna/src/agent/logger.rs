//! Conversation logging.
//!
//! Streams one JSONL entry per prompt/event to a timestamped file, so a
//! session can be reconstructed after the fact.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::Local;
use log::warn;
use serde_json::Value;

use super::types::AgentEvent;

pub struct ConversationLogger {
    path: PathBuf,
    file: Mutex<File>,
}

impl ConversationLogger {
    /// Create a new log file named after the session start time.
    pub fn new(log_dir: &Path) -> Result<Self> {
        fs::create_dir_all(log_dir)
            .with_context(|| format!("creating log dir {}", log_dir.display()))?;
        let path = log_dir.join(format!("{}.jsonl", Local::now().format("%Y%m%d_%H%M%S")));
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("opening log file {}", path.display()))?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one entry. Logging failures are reported, never fatal.
    pub fn log(&self, entry_type: &str, data: Value) {
        let mut entry = serde_json::json!({
            "timestamp": Local::now().to_rfc3339(),
            "type": entry_type,
        });
        if let (Some(obj), Some(extra)) = (entry.as_object_mut(), data.as_object()) {
            for (key, value) in extra {
                obj.insert(key.clone(), value.clone());
            }
        }
        let Ok(mut file) = self.file.lock() else {
            return;
        };
        if let Err(err) = writeln!(file, "{}", entry) {
            warn!("failed to write conversation log: {}", err);
        }
    }

    /// Append an agent event as it streams by.
    pub fn log_event(&self, event: &AgentEvent) {
        match serde_json::to_value(event) {
            Ok(value) => self.log("agent_event", serde_json::json!({ "event": value })),
            Err(err) => warn!("failed to serialize event for log: {}", err),
        }
    }
}
