//! Markdown note storage: parsing, the read-only store, and the
//! filesystem watcher behind `/ws/files`.

pub mod markdown;
pub mod store;
pub mod watch;

pub use store::{Note, NoteEntry, NoteStore, NoteStoreError, SearchHit};
pub use watch::{NoteChange, NoteWatcher};
