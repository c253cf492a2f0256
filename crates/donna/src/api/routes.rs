//! API route definitions.

use axum::http::{HeaderValue, Method, header};
use axum::{Json, Router, middleware, routing::get};
use log::warn;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::auth::auth_middleware;

use super::state::AppState;
use super::{chat, files, notes};

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let cors = build_cors_layer(&state);

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_request(DefaultOnRequest::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    let auth_state = state.auth.clone();

    // Token checks for the websocket routes happen inside the handlers,
    // so a rejected client sees close code 4001 instead of a failed
    // upgrade.
    let api_routes = Router::new()
        .route("/api/notes", get(notes::note_tree))
        .route("/api/notes/{*path}", get(notes::read_note))
        .route("/api/notes-resolve", get(notes::resolve_link))
        .route("/api/notes-search", get(notes::search_notes))
        .route_layer(middleware::from_fn_with_state(auth_state, auth_middleware));

    Router::new()
        .route("/health", get(health))
        .route("/ws/chat", get(chat::chat_ws_handler))
        .route("/ws/files", get(files::files_ws_handler))
        .merge(api_routes)
        .layer(cors)
        .layer(trace_layer)
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

fn build_cors_layer(state: &AppState) -> CorsLayer {
    let methods = [Method::GET, Method::OPTIONS];
    let headers = [header::AUTHORIZATION, header::CONTENT_TYPE];

    let origins = &state.settings.server.cors_origins;
    if origins.is_empty() {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(methods)
            .allow_headers(headers);
    }

    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("ignoring invalid CORS origin: {origin}");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(parsed))
        .allow_methods(methods)
        .allow_headers(headers)
}
