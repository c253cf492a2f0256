//! HTTP handlers for the note store.

use axum::Json;
use axum::extract::{Path, Query, State};
use serde::{Deserialize, Serialize};

use crate::notes::{Note, NoteEntry, SearchHit};

use super::error::ApiError;
use super::state::AppState;

/// GET /api/notes
pub async fn note_tree(State(state): State<AppState>) -> Result<Json<Vec<NoteEntry>>, ApiError> {
    Ok(Json(state.notes.tree()?))
}

/// GET /api/notes/{*path}
pub async fn read_note(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> Result<Json<Note>, ApiError> {
    Ok(Json(state.notes.read(&path)?))
}

#[derive(Debug, Deserialize)]
pub struct ResolveQuery {
    pub link: String,
}

#[derive(Debug, Serialize)]
pub struct ResolveResponse {
    pub link: String,
    pub path: Option<String>,
}

/// GET /api/notes-resolve?link=
pub async fn resolve_link(
    State(state): State<AppState>,
    Query(query): Query<ResolveQuery>,
) -> Json<ResolveResponse> {
    let path = state.notes.resolve_wiki_link(&query.link);
    Json(ResolveResponse {
        link: query.link,
        path,
    })
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: String,
}

/// GET /api/notes-search?q=
pub async fn search_notes(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<SearchHit>>, ApiError> {
    if query.q.trim().is_empty() {
        return Err(ApiError::bad_request("empty search query"));
    }
    Ok(Json(state.notes.search(&query.q)))
}
