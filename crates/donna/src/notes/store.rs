//! Read-only access to the markdown data directory.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use walkdir::WalkDir;

use super::markdown;

#[derive(Debug, Error)]
pub enum NoteStoreError {
    #[error("note not found: {0}")]
    NotFound(String),
    #[error("path escapes the data directory: {0}")]
    PathTraversal(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// One entry in the note tree, directories first.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NoteEntry {
    Directory {
        name: String,
        path: String,
        children: Vec<NoteEntry>,
    },
    File {
        name: String,
        path: String,
        metadata: Value,
        modified: u64,
    },
}

/// A fully loaded note, ready to serialize for the API.
#[derive(Debug, Clone, Serialize)]
pub struct Note {
    pub path: String,
    pub frontmatter: Value,
    pub content: String,
    pub raw: String,
    pub html: String,
    pub wiki_links: Vec<String>,
    /// Wiki link text mapped to a resolved note path, unresolved links omitted.
    pub resolved_links: Map<String, Value>,
    pub modified: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub path: String,
    pub line_number: usize,
    pub line: String,
}

/// Serves notes from a single root directory. All paths handed out and
/// accepted are relative to that root, forward-slash separated.
#[derive(Debug, Clone)]
pub struct NoteStore {
    root: PathBuf,
}

impl NoteStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The directory tree of markdown notes. Hidden entries are skipped,
    /// directories sort before files, both alphabetically.
    pub fn tree(&self) -> Result<Vec<NoteEntry>, NoteStoreError> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }
        self.tree_dir(&self.root)
    }

    fn tree_dir(&self, dir: &Path) -> Result<Vec<NoteEntry>, NoteStoreError> {
        let mut dirs = Vec::new();
        let mut files = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with('.') {
                continue;
            }
            let path = entry.path();
            let rel = self.relative(&path);
            if path.is_dir() {
                dirs.push(NoteEntry::Directory {
                    name,
                    path: rel,
                    children: self.tree_dir(&path)?,
                });
            } else if path.extension().is_some_and(|ext| ext == "md") {
                let metadata = fs::read_to_string(&path)
                    .map(|content| markdown::parse_frontmatter(&content).0)
                    .unwrap_or(Value::Object(Map::new()));
                files.push(NoteEntry::File {
                    name,
                    path: rel,
                    metadata,
                    modified: modified_secs(&path),
                });
            }
        }
        dirs.sort_by(|a, b| entry_name(a).cmp(entry_name(b)));
        files.sort_by(|a, b| entry_name(a).cmp(entry_name(b)));
        dirs.extend(files);
        Ok(dirs)
    }

    /// Load a note by relative path. A missing `.md` extension is added.
    pub fn read(&self, rel_path: &str) -> Result<Note, NoteStoreError> {
        let full = self.safe_join(rel_path)?;
        let full = if full.extension().is_some_and(|ext| ext == "md") {
            full
        } else {
            full.with_extension("md")
        };
        if !full.is_file() {
            return Err(NoteStoreError::NotFound(rel_path.to_string()));
        }

        let raw = fs::read_to_string(&full)?;
        let parsed = markdown::parse_note(&raw);
        let mut resolved_links = Map::new();
        for link in &parsed.wiki_links {
            if let Some(target) = self.resolve_wiki_link(link) {
                resolved_links.insert(link.clone(), Value::String(target));
            }
        }

        Ok(Note {
            path: self.relative(&full),
            frontmatter: parsed.frontmatter,
            html: markdown::render_html(&parsed.content),
            content: parsed.content,
            raw: parsed.raw,
            wiki_links: parsed.wiki_links,
            resolved_links,
            modified: modified_secs(&full),
        })
    }

    /// Resolve a `[[wiki link]]` to a note path. Links with a slash are
    /// taken as literal relative paths; bare names match any file whose
    /// stem equals the link after lowercasing and space-to-hyphen
    /// normalization.
    pub fn resolve_wiki_link(&self, link: &str) -> Option<String> {
        let link = link.trim();
        if link.contains('/') {
            let full = self.safe_join(link).ok()?;
            let full = if full.extension().is_some_and(|ext| ext == "md") {
                full
            } else {
                full.with_extension("md")
            };
            return full.is_file().then(|| self.relative(&full));
        }

        let wanted = normalize_link(link);
        for entry in WalkDir::new(&self.root)
            .into_iter()
            .filter_entry(|e| !is_hidden(e.file_name().to_string_lossy().as_ref()))
            .filter_map(Result::ok)
        {
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            if path.extension().is_none_or(|ext| ext != "md") {
                continue;
            }
            let stem = path.file_stem()?.to_string_lossy();
            if normalize_link(&stem) == wanted {
                return Some(self.relative(path));
            }
        }
        None
    }

    /// Case-insensitive substring search across all note bodies.
    pub fn search(&self, query: &str) -> Vec<SearchHit> {
        let needle = query.to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }
        let mut hits = Vec::new();
        for entry in WalkDir::new(&self.root)
            .into_iter()
            .filter_entry(|e| !is_hidden(e.file_name().to_string_lossy().as_ref()))
            .filter_map(Result::ok)
        {
            let path = entry.path();
            if !entry.file_type().is_file() || path.extension().is_none_or(|ext| ext != "md") {
                continue;
            }
            let Ok(content) = fs::read_to_string(path) else {
                continue;
            };
            for (idx, line) in content.lines().enumerate() {
                if line.to_lowercase().contains(&needle) {
                    hits.push(SearchHit {
                        path: self.relative(path),
                        line_number: idx + 1,
                        line: line.to_string(),
                    });
                }
            }
        }
        hits
    }

    /// Join a client-supplied relative path under the root, rejecting
    /// anything that climbs out of it.
    fn safe_join(&self, rel_path: &str) -> Result<PathBuf, NoteStoreError> {
        let rel = Path::new(rel_path);
        if rel.is_absolute()
            || rel
                .components()
                .any(|c| matches!(c, std::path::Component::ParentDir))
        {
            return Err(NoteStoreError::PathTraversal(rel_path.to_string()));
        }
        Ok(self.root.join(rel))
    }

    fn relative(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/")
    }
}

fn entry_name(entry: &NoteEntry) -> &str {
    match entry {
        NoteEntry::Directory { name, .. } | NoteEntry::File { name, .. } => name,
    }
}

fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

fn normalize_link(link: &str) -> String {
    link.to_lowercase().replace(' ', "-")
}

fn modified_secs(path: &Path) -> u64 {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn store_with_notes() -> (TempDir, NoteStore) {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("projects")).unwrap();
        fs::write(
            dir.path().join("projects/baby-prep.md"),
            "---\nstatus: active\n---\nCrib research in [[Shopping List]].\n",
        )
        .unwrap();
        fs::write(dir.path().join("shopping-list.md"), "- crib\n- monitor\n").unwrap();
        fs::write(dir.path().join(".hidden.md"), "secret\n").unwrap();
        fs::write(dir.path().join("notes.txt"), "not markdown\n").unwrap();
        let store = NoteStore::new(dir.path().to_path_buf());
        (dir, store)
    }

    #[test]
    fn test_tree_skips_hidden_and_non_markdown() {
        let (_dir, store) = store_with_notes();
        let tree = store.tree().unwrap();
        assert_eq!(tree.len(), 2);
        assert!(matches!(&tree[1], NoteEntry::File { name, .. } if name == "shopping-list.md"));
        let NoteEntry::Directory { name, children, .. } = &tree[0] else {
            panic!("expected directory first");
        };
        assert_eq!(name, "projects");
        assert!(
            matches!(&children[0], NoteEntry::File { metadata, .. } if metadata["status"] == "active")
        );
    }

    #[test]
    fn test_read_adds_md_extension_and_resolves_links() {
        let (_dir, store) = store_with_notes();
        let note = store.read("projects/baby-prep").unwrap();
        assert_eq!(note.path, "projects/baby-prep.md");
        assert_eq!(note.frontmatter["status"], "active");
        assert_eq!(note.wiki_links, vec!["Shopping List"]);
        assert_eq!(
            note.resolved_links.get("Shopping List").and_then(|v| v.as_str()),
            Some("shopping-list.md")
        );
        assert!(note.html.contains("Crib research"));
    }

    #[test]
    fn test_read_missing_note() {
        let (_dir, store) = store_with_notes();
        assert!(matches!(
            store.read("no-such-note"),
            Err(NoteStoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_read_rejects_traversal() {
        let (_dir, store) = store_with_notes();
        assert!(matches!(
            store.read("../../etc/passwd"),
            Err(NoteStoreError::PathTraversal(_))
        ));
    }

    #[test]
    fn test_resolve_wiki_link_by_stem() {
        let (_dir, store) = store_with_notes();
        assert_eq!(
            store.resolve_wiki_link("Shopping List").as_deref(),
            Some("shopping-list.md")
        );
        assert_eq!(store.resolve_wiki_link("Nope"), None);
    }

    #[test]
    fn test_search_is_case_insensitive() {
        let (_dir, store) = store_with_notes();
        let hits = store.search("CRIB");
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().any(|h| h.path == "shopping-list.md" && h.line_number == 1));
    }
}
