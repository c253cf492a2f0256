//! Filesystem watcher for the data directory.
//!
//! Wraps a notify recursive watcher and fans markdown changes out over a
//! broadcast channel so every `/ws/files` client sees them.

use std::path::{Path, PathBuf};

use log::warn;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde::Serialize;
use tokio::sync::broadcast;

/// A change to a markdown note, path relative to the data directory.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NoteChange {
    FileCreated { path: String },
    FileChanged { path: String },
    FileDeleted { path: String },
}

pub struct NoteWatcher {
    // Held so the watch stays registered for the watcher's lifetime.
    _watcher: RecommendedWatcher,
    tx: broadcast::Sender<NoteChange>,
}

impl NoteWatcher {
    pub fn new(root: &Path) -> notify::Result<Self> {
        let (tx, _) = broadcast::channel(256);
        let root_owned = root.to_path_buf();
        let event_tx = tx.clone();
        let mut watcher =
            notify::recommended_watcher(move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    for change in translate_event(&root_owned, &event) {
                        let _ = event_tx.send(change);
                    }
                }
                Err(err) => warn!("file watcher error: {err}"),
            })?;
        watcher.watch(root, RecursiveMode::Recursive)?;
        Ok(Self { _watcher: watcher, tx })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NoteChange> {
        self.tx.subscribe()
    }

    pub fn sender(&self) -> broadcast::Sender<NoteChange> {
        self.tx.clone()
    }
}

/// Map a raw notify event to note changes. Non-markdown and hidden paths
/// produce nothing.
fn translate_event(root: &PathBuf, event: &Event) -> Vec<NoteChange> {
    let make = |path: String| match event.kind {
        EventKind::Create(_) => Some(NoteChange::FileCreated { path }),
        EventKind::Modify(_) => Some(NoteChange::FileChanged { path }),
        EventKind::Remove(_) => Some(NoteChange::FileDeleted { path }),
        _ => None,
    };
    event
        .paths
        .iter()
        .filter_map(|path| relative_markdown_path(root, path))
        .filter_map(make)
        .collect()
}

fn relative_markdown_path(root: &Path, path: &Path) -> Option<String> {
    if path.extension().is_none_or(|ext| ext != "md") {
        return None;
    }
    let rel = path.strip_prefix(root).ok()?;
    let hidden = rel
        .components()
        .any(|c| c.as_os_str().to_string_lossy().starts_with('.'));
    if hidden {
        return None;
    }
    Some(rel.to_string_lossy().replace('\\', "/"))
}
