//! Markdown parsing and rendering.
//!
//! Frontmatter and `[[wiki link]]` extraction for the note store, plus
//! comrak-to-HTML rendering with syntect highlighting. Rendered HTML is
//! cached by content hash to avoid re-rendering unchanged notes.

use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::{LazyLock, Mutex};

use comrak::plugins::syntect::SyntectAdapter;
use comrak::{Options, Plugins, markdown_to_html_with_plugins};
use regex::Regex;
use serde_json::{Map, Value};

static SYNTECT_ADAPTER: LazyLock<SyntectAdapter> =
    LazyLock::new(|| SyntectAdapter::new(Some("base16-ocean.dark")));

static WIKI_LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[\[([^\]]+)\]\]").unwrap_or_else(|err| panic!("wiki link regex: {err}"))
});

/// Cache up to this many rendered notes.
const RENDER_CACHE_MAX: usize = 500;

static RENDER_CACHE: LazyLock<Mutex<HashMap<u64, String>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

/// A markdown note split into its components.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedNote {
    pub frontmatter: Value,
    pub content: String,
    pub wiki_links: Vec<String>,
    pub raw: String,
}

/// Split YAML frontmatter (between `---` fences) from the body.
///
/// Returns an empty object when there is no frontmatter or it fails to
/// parse; a broken header never makes a note unreadable.
pub fn parse_frontmatter(content: &str) -> (Value, &str) {
    let empty = Value::Object(Map::new());
    if !content.starts_with("---") {
        return (empty, content);
    }
    let mut parts = content.splitn(3, "---");
    let _ = parts.next();
    let (Some(header), Some(body)) = (parts.next(), parts.next()) else {
        return (empty, content);
    };
    let frontmatter = serde_yaml::from_str::<Value>(header)
        .ok()
        .filter(Value::is_object)
        .unwrap_or(empty);
    (frontmatter, body.trim_start_matches('\n'))
}

/// Extract `[[wiki link]]` targets, first occurrence order, deduplicated.
pub fn extract_wiki_links(content: &str) -> Vec<String> {
    let mut seen = Vec::new();
    for capture in WIKI_LINK_RE.captures_iter(content) {
        if let Some(link) = capture.get(1) {
            let link = link.as_str().to_string();
            if !seen.contains(&link) {
                seen.push(link);
            }
        }
    }
    seen
}

/// Parse a note into frontmatter, body, and wiki links.
pub fn parse_note(content: &str) -> ParsedNote {
    let (frontmatter, body) = parse_frontmatter(content);
    ParsedNote {
        frontmatter,
        content: body.to_string(),
        wiki_links: extract_wiki_links(content),
        raw: content.to_string(),
    }
}

/// Render markdown to HTML with syntax-highlighted code blocks.
pub fn render_html(markdown: &str) -> String {
    let hash = {
        let mut hasher = DefaultHasher::new();
        markdown.hash(&mut hasher);
        hasher.finish()
    };

    if let Ok(cache) = RENDER_CACHE.lock() {
        if let Some(html) = cache.get(&hash) {
            return html.clone();
        }
    }

    let mut options = Options::default();
    options.extension.strikethrough = true;
    options.extension.table = true;
    options.extension.tasklist = true;

    let mut plugins = Plugins::default();
    plugins.render.codefence_syntax_highlighter = Some(&*SYNTECT_ADAPTER);

    let html = markdown_to_html_with_plugins(markdown, &options, &plugins);

    if let Ok(mut cache) = RENDER_CACHE.lock() {
        if cache.len() >= RENDER_CACHE_MAX {
            cache.clear();
        }
        cache.insert(hash, html.clone());
    }
    html
}
